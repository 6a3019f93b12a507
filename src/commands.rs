//! CLI command definitions
//!
//! Defines the clap commands for the MicroScript client.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run a program once and print its output
    Run {
        /// Source file (default: the saved editor buffer, or the sample)
        file: Option<PathBuf>,

        /// Print the round-trip time after the output
        #[arg(long)]
        timed: bool,

        /// Override the run timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Store a file as the saved editor buffer
    Save {
        /// Source file to store
        file: PathBuf,
    },

    /// Start an interactive REPL session
    Repl,

    /// Debug a program interactively
    Debug {
        /// Source file (default: the saved editor buffer, or the sample)
        file: Option<PathBuf>,

        /// Set initial breakpoint(s) by line number
        /// Can be specified multiple times: -b 3 -b 7
        #[arg(long = "break", short = 'b')]
        breakpoints: Vec<u32>,
    },

    /// Check that the engine is reachable
    Health,
}
