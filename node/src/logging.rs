//! # Structured Logging
//!
//! Initializes the `tracing` subscriber with configurable format (JSON or
//! pretty-printed) and environment-based filtering via `RUST_LOG`.
//!
//! All log output is written to stderr so that stdout stays clean for the
//! `keygen` and `status` subcommands, whose output is meant to be piped.

use clap::ValueEnum;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable, colored output. Suitable for local development.
    Pretty,
    /// Machine-parseable JSON lines. Suitable for production log aggregation.
    Json,
}

/// Default filter when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "graymatter_node=info,graymatter_protocol=info,tower_http=info";

/// Initialize the global tracing subscriber.
///
/// Call this once, early in `main()`. A second call is ignored with a
/// warning on stderr rather than a panic, which keeps tests that start
/// several nodes in one process happy.
///
/// # Environment
///
/// The `RUST_LOG` environment variable overrides `default_filter` when set:
///
/// ```text
/// RUST_LOG=graymatter_node=debug,graymatter_protocol=debug,tower_http=debug
/// ```
pub fn init_logging(default_filter: &str, format: LogFormat) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(true);

    let result = match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr.with_file(true).with_line_number(true))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr.json())
            .try_init(),
    };

    match result {
        Ok(()) => tracing::info!(?format, "logging initialized"),
        Err(e) => eprintln!("logging already initialized: {e}"),
    }
}
