//! # Structured Logging
//!
//! `tracing-subscriber` setup. `RUST_LOG` wins over the configured level when set.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter from `RUST_LOG`, falling back to the configured directive.
pub fn env_filter(config: &ObservabilityConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.log_level)
            .map_err(|e| Error::config(format!("Invalid log level '{}': {}", config.log_level, e))),
    }
}

/// Install the global subscriber: pretty output, or one JSON object per line.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = env_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_logging {
        registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(false))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| Error::internal(format!("Failed to install tracing subscriber: {e}")))
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        service_name = %config.observability.service_name,
        database_pool_max = config.database.max_connections,
        auto_migrate = config.database.auto_migrate,
        email_delivery = config.email.delivery_enabled(),
        cleanup_interval_secs = config.cleanup.interval_seconds,
        retention_days = config.cleanup.retention_days,
        metrics_enabled = config.observability.enable_metrics,
        "credence configuration"
    );
}
