//! Logging and tracing configuration
//!
//! Subprocess output is routed through tracing events carrying an `app`
//! field, so the subscriber installed here decides where tool output ends up.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is not set
const DEFAULT_FILTER: &str = "sigstore_e2e=info,warn";

/// Initialize tracing for the CLI (stderr logging)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies. `verbose`
/// raises this crate to DEBUG, which includes image pull progress.
pub fn init_cli(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("sigstore_e2e=debug,warn")
        } else {
            EnvFilter::new(DEFAULT_FILTER)
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// Initialize tracing for tests, ignoring repeated initialization
pub fn init_test() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("sigstore_e2e=debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();
}
