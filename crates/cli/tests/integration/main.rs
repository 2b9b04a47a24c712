mod build_tests;
mod common;
mod inspect_tests;
mod verify_tests;
