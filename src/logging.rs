//! Logging setup for the binaries.
//!
//! Library code only emits `tracing` events; installing a subscriber is left
//! to the process entry point.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `level`. Returns an error if a global
/// subscriber is already set.
pub fn init_logging(level: &str, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_target(false).with_thread_ids(true))
            .try_init()?;
    }

    Ok(())
}
