//! # Configuration Management
//!
//! Settings are layered: compiled defaults, then an optional file, then
//! `CREDENCE__SECTION__KEY` environment variables (a `.env` file is honoured).

pub mod settings;

pub use settings::{
    AppConfig, AuthConfig, CleanupConfig, DatabaseConfig, EmailConfig, ObservabilityConfig,
};

use crate::errors::Result;
use std::path::Path;

/// Environment variable prefix for every setting.
pub const ENV_PREFIX: &str = "CREDENCE";

impl AppConfig {
    /// Load configuration from an optional file plus the environment, then validate it.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        // A missing .env is normal outside local development.
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        tracing::debug!(?config, "configuration loaded");
        Ok(config)
    }
}
