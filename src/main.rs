//! sigstore-e2e CLI
//!
//! Sets up and runs the tools used by end-to-end tests from the command line.

use clap::Parser;
use commands::Commands;
use sigstore_e2e::common::config::Config;
use sigstore_e2e::common::logging;
use sigstore_e2e::{cli, commands};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "sigstore-e2e", about = "Provision and run tools for e2e tests")]
#[command(version, long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/sigstore-e2e/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_cli(cli.verbose);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    let result = match Config::load(cli.config.as_deref()) {
        Ok(config) => cli::dispatch(cli.command, config, cancel).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
