mod common;

mod capability_tests;
mod graph_tests;
mod run_tests;
