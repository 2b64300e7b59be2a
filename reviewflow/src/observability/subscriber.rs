//! Global `tracing` subscriber installation.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::errors::{Result, ReviewflowError};

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over `config.level` when set. Calling this twice returns
/// an error rather than panicking, so binaries and tests can both call it.
///
/// # Errors
///
/// Returns [`ReviewflowError::Config`] if the level directive is invalid or a
/// global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            ReviewflowError::Config(format!("invalid log level {:?}: {e}", config.level))
        })?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };

    installed.map_err(|e| ReviewflowError::Config(format!("tracing already initialised: {e}")))
}
