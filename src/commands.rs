//! CLI command definitions
//!
//! Defines the clap commands for the sigstore-e2e CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Acquire a tool with its configured strategy and print its path
    Setup {
        /// Tool name (e.g. cosign, rekor-cli, gitsign)
        tool: String,

        /// Probe the binary with version/help flags after setup
        #[arg(long)]
        verify: bool,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Acquire a tool, run it once and remove the acquisition workspace
    Run {
        /// Tool name
        tool: String,

        /// Arguments passed to the tool
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Set up and verify every configured tool
    Check {
        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// List configured tools and their strategies
    List {
        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Execute a test scenario defined in a YAML file
    Test {
        /// Path to the YAML test scenario file
        path: PathBuf,

        /// Verbose output
        #[arg(long, short)]
        verbose: bool,
    },
}
