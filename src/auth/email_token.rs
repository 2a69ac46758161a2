//! Email token lifecycle: issue, redeem, consume.
//!
//! The token id is the bearer value mailed to the user. A token is valid
//! exactly once: the caller redeems it, applies its effect, then consumes it
//! in the same transaction.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::auth::models::{EmailToken, EmailTokenPurpose, NewEmailToken};
use crate::domain::{EmailTokenId, UserId};
use crate::errors::{DomainError, DomainResult, ErrorHandler, RepoError};
use crate::storage::EmailTokenRepository;

pub const DEFAULT_EMAIL_TOKEN_TTL_MINUTES: i64 = 10;

pub const DEFAULT_INVITATION_TOKEN_TTL_HOURS: i64 = 72;

pub fn default_ttl() -> Duration {
    Duration::minutes(DEFAULT_EMAIL_TOKEN_TTL_MINUTES)
}

/// Invitees may not read their mail for a while, so their set-password link
/// outlives an ordinary reset link.
pub fn default_invitation_ttl() -> Duration {
    Duration::hours(DEFAULT_INVITATION_TOKEN_TTL_HOURS)
}

/// Persist a fresh token for `user_id` and return its id.
pub async fn issue(
    repo: &dyn EmailTokenRepository,
    user_id: &UserId,
    purpose: EmailTokenPurpose,
    ttl: Duration,
) -> DomainResult<EmailTokenId> {
    let now = Utc::now();
    let token = NewEmailToken {
        id: EmailTokenId::new(),
        user_id: user_id.clone(),
        purpose,
        created_at: now,
        expired_at: now + ttl,
    };
    let id = token.id.clone();

    repo.create(token).await.map_err(|err| match err {
        RepoError::Conflict => DomainError::internal("email token id collision")
            .with_meta("operation", "create_email_token")
            .with_meta("purpose", purpose.as_str()),
        RepoError::NotFound => DomainError::not_found("user not found")
            .with_meta("operation", "create_email_token")
            .with_meta("user_id", user_id.as_str()),
        other => ErrorHandler::repository("create_email_token", other),
    })?;

    debug!(user_id = %user_id, purpose = %purpose, "email token issued");
    Ok(id)
}

/// Load a token that is still usable for `purpose`.
///
/// Checks run in order: not found, already used, expired. A token issued for
/// another purpose is reported as not found.
pub async fn redeem(
    repo: &dyn EmailTokenRepository,
    id: &EmailTokenId,
    purpose: EmailTokenPurpose,
    now: DateTime<Utc>,
) -> DomainResult<EmailToken> {
    let token = match repo.get_by_id(id).await {
        Ok(token) if token.purpose == purpose => token,
        Ok(_) | Err(RepoError::NotFound) => {
            return Err(DomainError::validation("email token not found")
                .with_meta("purpose", purpose.as_str()));
        }
        Err(other) => return Err(ErrorHandler::repository("get_email_token", other)),
    };

    if token.is_used() {
        return Err(DomainError::validation("email token is already used")
            .with_meta("purpose", purpose.as_str()));
    }
    if token.is_expired_at(now) {
        return Err(DomainError::validation("email token is expired")
            .with_meta("purpose", purpose.as_str())
            .with_meta("expired_at", token.expired_at.to_rfc3339()));
    }
    Ok(token)
}

/// Mark a redeemed token used. Losing a race to another consumer is reported
/// the same way as presenting a used token.
pub async fn consume(repo: &dyn EmailTokenRepository, id: &EmailTokenId) -> DomainResult<()> {
    repo.use_token(id).await.map_err(|err| match err {
        RepoError::NotFound => DomainError::validation("email token is already used"),
        other => ErrorHandler::repository("use_email_token", other),
    })
}
