//! CLI module for taskpipe - command-line interface and demo scenarios.

pub mod commands;
pub mod demos;

pub use commands::Cli;
