//! Tracing initialization

use tracing_subscriber::EnvFilter;

use crate::{
    config::Config,
    error::{Error, Result},
};

/// Install a JSON tracing subscriber filtered by the configured log level
///
/// `RUST_LOG`-style directives are accepted in `service.log_level`; an
/// unparsable value falls back to `info`. Fails when a global subscriber is
/// already installed.
pub fn init_tracing(config: &Config) -> Result<()> {
    let log_level = config.service.log_level.clone();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| Error::Internal(format!("tracing already initialized: {}", e)))?;

    tracing::info!(
        environment = %config.service.environment,
        activate_logging = config.logging.activate_logging,
        "Tracing initialized for service: {}",
        config.service.name
    );

    Ok(())
}
