//! # EVOO CLI
//!
//! Thin front-end: argument parsing, engine wiring, and progress
//! reporting around the learning loop.

pub mod args;
pub mod cli;

pub use args::EvooArgs;
pub use cli::{run, run_with_config};
