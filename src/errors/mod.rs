//! # Error Handling
//!
//! Two layers of errors live here:
//!
//! - [`RepoError`]: the small sentinel set every repository reports
//!   (`NotFound`, `Conflict`, `Internal`).
//! - [`DomainError`]: the closed taxonomy the workflows hand back to callers,
//!   built exactly once by [`ErrorHandler`] where a low-level failure is first
//!   observed.
//!
//! [`Error`] covers process bootstrap (configuration, pool, migrations) and never
//! crosses the workflow boundary.

mod handler;
mod repository;
mod types;

pub use handler::ErrorHandler;
pub use repository::{RepoError, RepoResult};
pub use types::{DomainError, DomainResult, ErrorKind};

/// Result type for bootstrap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Bootstrap error type for configuration, storage setup and the sweeper binary
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or migration errors
    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// Migration errors
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }
}

impl From<config::ConfigError> for Error {
    fn from(error: config::ConfigError) -> Self {
        Self::Config(error.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Config(errors.to_string())
    }
}
