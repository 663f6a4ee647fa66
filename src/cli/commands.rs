//! CLI command definitions using clap.
//!
//! Each subcommand runs one scheduling scenario against the configured
//! executors and prints what happened.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// taskpipe - priority-aware task scheduling demos
#[derive(Parser, Debug)]
#[command(name = "taskpipe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Demo scenarios and inspection commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Flood the io pipe and report peak concurrency
    Window {
        /// Number of tasks to submit
        #[arg(short, long, default_value_t = 32)]
        tasks: usize,
    },

    /// Queue Low, High and Normal work behind a busy slot and show run order
    Priority,

    /// Submit same-tag tasks to the io dedup lane
    Dedup {
        /// Number of submissions
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
    },

    /// Submit same-tag tasks to the serial lane
    Serial {
        /// Number of submissions
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
    },

    /// Run a closure-built task that reports progress
    Chain,

    /// Bind tasks to an owner, hide and show it, then destroy it
    Lifecycle {
        /// Number of bound tasks
        #[arg(short = 'n', long, default_value_t = 3)]
        count: usize,
    },

    /// Print the effective configuration as YAML
    Config,

    /// Print executor load
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
