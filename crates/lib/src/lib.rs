//! rtforge-lib: cross-compilation build orchestration for portable runtimes.
//!
//! This crate builds a self-contained interpreter distribution for several
//! target variants (triple + libc family) at once:
//! - `target`: declared target variants
//! - `node`: dependency node definitions, shared across targets
//! - `graph`: per-target dependency resolution and ordering
//! - `compose`: the explicit search paths and compiler environment of a step
//! - `execute`: isolated execution of build procedures
//! - `verify`: capability checks against the interpreter's configuration record
//! - `run`: multi-target orchestration and artifact hand-off
//! - `config`: loading `rtforge.toml`

pub mod compose;
pub mod config;
pub mod consts;
pub mod execute;
pub mod graph;
pub mod node;
pub mod run;
pub mod target;
pub mod types;
pub mod util;
pub mod verify;
