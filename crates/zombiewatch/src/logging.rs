//! Tracing setup for the server and the one-shot commands.
//!
//! zombiewatch events go to stderr at the level picked on the command line;
//! dependencies (axum, hyper, rusqlite) only report warnings. `RUST_LOG`
//! replaces the whole filter.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How much the binary logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Requests, published and discarded messages, shutdown.
    #[default]
    Normal,
    /// Adds store writes and every delivery.
    Verbose,
    /// Adds raw backend calls.
    Trace,
}

impl Verbosity {
    /// Pick a verbosity from `-q` and the number of `-v` flags. `-q` wins.
    #[must_use]
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        match (quiet, verbose) {
            (true, _) => Self::Quiet,
            (false, 0) => Self::Normal,
            (false, 1) => Self::Verbose,
            (false, _) => Self::Trace,
        }
    }

    /// Level of zombiewatch's own events.
    #[must_use]
    pub fn level(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// Filter used when `RUST_LOG` is unset.
    #[must_use]
    pub fn directive(&self) -> String {
        let dependencies = if *self == Self::Quiet {
            Level::ERROR
        } else {
            Level::WARN
        };
        format!("{dependencies},zombiewatch={}", self.level())
    }
}

/// Install the global subscriber. Later calls are no-ops.
///
/// ```no_run
/// use zombiewatch::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::from_flags(1, false));
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .try_init();
}

/// Capture warnings and errors in test output.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
