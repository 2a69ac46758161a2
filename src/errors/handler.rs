//! Classification and reporting of low-level failures.

use tracing::{debug, error, warn};

use super::{DomainError, ErrorKind, RepoError};
use crate::auth::hashing::PasswordError;
use crate::auth::token_service::TokenError;
use crate::notifications::NotificationError;

/// Turns repository and service failures into [`DomainError`]s.
///
/// Each method is the default classification for its failure family; workflows
/// match on the sentinel first when the business context gives it a more
/// specific meaning, and only fall back here for the rest.
pub struct ErrorHandler;

impl ErrorHandler {
    /// Default mapping for a repository sentinel: `NotFound` and `Conflict` keep
    /// their kind, `Internal` keeps its cause for logs.
    #[track_caller]
    pub fn repository(operation: &'static str, err: RepoError) -> DomainError {
        let sentinel = err.sentinel();
        let classified = match err {
            RepoError::NotFound => DomainError::not_found(format!("{operation}: not found")),
            RepoError::Conflict => DomainError::conflict(format!("{operation}: conflict")),
            RepoError::Internal { .. } => {
                DomainError::internal(format!("{operation} failed")).with_source(err)
            }
        };
        classified.with_meta("operation", operation).with_meta("sentinel", sentinel)
    }

    /// Any signature, encoding or claim problem is reported as `Unauthorized`
    /// without saying which check failed.
    #[track_caller]
    pub fn token(operation: &'static str, err: TokenError) -> DomainError {
        if err.is_encoding_failure() {
            return DomainError::internal(format!("{operation} failed"))
                .with_meta("operation", operation)
                .with_source(err);
        }
        DomainError::unauthorized("invalid token").with_meta("operation", operation).with_source(err)
    }

    #[track_caller]
    pub fn password(operation: &'static str, err: PasswordError) -> DomainError {
        DomainError::internal(format!("{operation} failed"))
            .with_meta("operation", operation)
            .with_source(err)
    }

    /// A notification error means "not confirmed sent".
    #[track_caller]
    pub fn notification(operation: &'static str, err: NotificationError) -> DomainError {
        DomainError::internal(format!("{operation} failed"))
            .with_meta("operation", operation)
            .with_source(err)
    }

    /// Log a failure on its way out of the workflow layer.
    pub fn report(err: &DomainError) {
        let location = err.location();
        let metadata = serde_json::to_string(err.metadata()).unwrap_or_default();
        match err.kind() {
            ErrorKind::Internal => {
                let cause = std::error::Error::source(err).map(|s| s.to_string());
                error!(
                    kind = %err.kind(),
                    detail = err.message(),
                    cause = ?cause,
                    metadata = metadata.as_str(),
                    at = %location,
                    "workflow failed"
                );
            }
            ErrorKind::Unauthorized | ErrorKind::InvalidCredentials => {
                warn!(
                    kind = %err.kind(),
                    detail = err.message(),
                    metadata = metadata.as_str(),
                    at = %location,
                    "authentication rejected"
                );
            }
            _ => {
                debug!(
                    kind = %err.kind(),
                    detail = err.message(),
                    metadata = metadata.as_str(),
                    at = %location,
                    "workflow returned early"
                );
            }
        }
    }
}
