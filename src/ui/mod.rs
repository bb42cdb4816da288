//! Command-line user interface module

pub mod cli;

pub use cli::*;
