//! Credential and session workflows.
//!
//! [`AuthWorkflow`] is the single entry point callers use. Every operation
//! reads what it needs through the default-scope repositories, runs any
//! multi-write step inside one unit of work, and reports its failure through
//! [`ErrorHandler::report`] before returning it.

mod password;
mod registration;
mod session;

use chrono::Duration;
use std::sync::Arc;

use crate::auth::email_token;
use crate::auth::hashing::PasswordService;
use crate::auth::token_service::TokenService;
use crate::config::AuthConfig;
use crate::errors::{DomainResult, ErrorHandler};
use crate::notifications::NotificationRepository;
use crate::observability::MetricsRecorder;
use crate::storage::TransactionManager;

pub use session::issue_session;

/// Tunables that are not part of any collaborator.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowSettings {
    /// Lifetime of verification and password reset tokens
    pub email_token_ttl: Duration,
    /// Lifetime of the set-password token mailed to auto-registered invitees
    pub invitation_token_ttl: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            email_token_ttl: email_token::default_ttl(),
            invitation_token_ttl: email_token::default_invitation_ttl(),
        }
    }
}

impl From<&AuthConfig> for WorkflowSettings {
    fn from(config: &AuthConfig) -> Self {
        Self {
            email_token_ttl: config.email_token_ttl(),
            invitation_token_ttl: config.invitation_token_ttl(),
        }
    }
}

/// Orchestrates login, refresh, logout, registration, verification and
/// password management over the injected capabilities.
#[derive(Clone)]
pub struct AuthWorkflow {
    tx: Arc<dyn TransactionManager>,
    tokens: Arc<dyn TokenService>,
    passwords: Arc<dyn PasswordService>,
    notifier: Arc<dyn NotificationRepository>,
    settings: WorkflowSettings,
    metrics: MetricsRecorder,
}

impl AuthWorkflow {
    pub fn new(
        tx: Arc<dyn TransactionManager>,
        tokens: Arc<dyn TokenService>,
        passwords: Arc<dyn PasswordService>,
        notifier: Arc<dyn NotificationRepository>,
        settings: WorkflowSettings,
    ) -> Self {
        Self { tx, tokens, passwords, notifier, settings, metrics: MetricsRecorder::new() }
    }

    /// Log and count a failed operation, then hand the result back unchanged.
    fn report<T>(&self, operation: &'static str, result: DomainResult<T>) -> DomainResult<T> {
        if let Err(err) = &result {
            ErrorHandler::report(err);
            if !err.is_soft_success() {
                self.metrics.record_workflow_failure(operation, err.kind().as_str());
            }
        }
        result
    }
}
