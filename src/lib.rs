//! # Credence
//!
//! Credential and session-lifecycle core: registration, email verification,
//! password login and reset, rotating refresh tokens with reuse detection,
//! and provisioning accounts for project invitees.
//!
//! ## Architecture
//!
//! ```text
//! AuthWorkflow ──> TokenService / PasswordService / NotificationRepository
//!      │
//!      └──> TransactionManager ──> Repositories (users, refresh tokens, email tokens)
//!                                       │
//!                                 Postgres (sqlx) or in-memory store
//! ```
//!
//! Every workflow returns a [`errors::DomainError`] from a closed set of kinds.
//! Multi-write steps run inside one unit of work handed to a closure, so either
//! all of their writes land or none do.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use credence::auth::{Argon2PasswordService, AuthWorkflow, JwtTokenService, WorkflowSettings};
//! use credence::auth::validation::LoginRequest;
//! use credence::config::AppConfig;
//! use credence::notifications::SmtpNotificationRepository;
//! use credence::storage::{create_pool, PgTransactionManager};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = AppConfig::load(None)?;
//! let pool = create_pool(&config.database).await?;
//! let workflow = AuthWorkflow::new(
//!     Arc::new(PgTransactionManager::new(pool)),
//!     Arc::new(JwtTokenService::from_config(&config.auth)),
//!     Arc::new(Argon2PasswordService::new()),
//!     Arc::new(SmtpNotificationRepository::new(&config.email)?),
//!     WorkflowSettings::from(&config.auth),
//! );
//! let session = workflow.login(LoginRequest::new("ada@example.com", "correct horse")).await?;
//! # let _ = session;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod notifications;
pub mod observability;
pub mod storage;

// Re-export commonly used types and traits
pub use auth::{AuthWorkflow, WorkflowSettings};
pub use config::AppConfig;
pub use errors::{DomainError, DomainResult, Error, ErrorKind, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
