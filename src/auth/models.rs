//! Credential and session entities.
//!
//! Users, refresh-token records and email tokens as the repositories store them,
//! plus the result DTOs the workflows hand back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

use crate::domain::{EmailTokenId, RefreshTokenId, UserId};

/// Stored representation of a user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_verified(&self) -> bool {
        self.verified_at.is_some()
    }

    /// Normalize email to lowercase for consistent storage and comparison.
    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }
}

/// New user creation payload.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub verified_at: Option<DateTime<Utc>>,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    pub password_hash: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl UpdateUser {
    pub fn password(password_hash: String) -> Self {
        Self { password_hash: Some(password_hash), verified_at: None }
    }

    pub fn verified(at: DateTime<Utc>) -> Self {
        Self { password_hash: None, verified_at: Some(at) }
    }
}

/// One row of a bulk email -> id lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdByEmail {
    pub email: String,
    pub id: UserId,
}

/// Persisted refresh token record, keyed by the token's `jti`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub id: RefreshTokenId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshToken {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expired_at
    }

    /// Live iff not revoked and not yet expired.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && !self.is_expired_at(now)
    }
}

#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub id: RefreshTokenId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
}

/// What an email token authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailTokenPurpose {
    /// Email ownership confirmation
    Verify,
    /// Password reset authorization
    Reset,
}

impl EmailTokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailTokenPurpose::Verify => "verify",
            EmailTokenPurpose::Reset => "reset",
        }
    }
}

impl Display for EmailTokenPurpose {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EmailTokenPurpose {
    type Err = EmailTokenPurposeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "verify" => Ok(EmailTokenPurpose::Verify),
            "reset" => Ok(EmailTokenPurpose::Reset),
            other => Err(EmailTokenPurposeParseError(other.to_string())),
        }
    }
}

/// Error returned when email token purpose parsing fails.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid email token purpose: {0}")]
pub struct EmailTokenPurposeParseError(pub String);

/// Single-use, purpose-scoped bearer token delivered by email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailToken {
    pub id: EmailTokenId,
    pub user_id: UserId,
    pub purpose: EmailTokenPurpose,
    pub created_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl EmailToken {
    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expired_at
    }
}

#[derive(Debug, Clone)]
pub struct NewEmailToken {
    pub id: EmailTokenId,
    pub user_id: UserId,
    pub purpose: EmailTokenPurpose,
    pub created_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
}

/// Signed bearer credential; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Signed refresh credential as minted, before its record is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub id: RefreshTokenId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Access/refresh pair returned by login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub user_id: UserId,
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredUser {
    pub user_id: UserId,
}

/// Result of provisioning a batch of project invitees.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationOutcome {
    /// Invitees that already had an account
    pub existing: Vec<UserIdByEmailDto>,
    /// Invitees provisioned through auto-registration
    pub auto_registered: Vec<UserIdByEmailDto>,
}

impl InvitationOutcome {
    pub fn user_ids(&self) -> Vec<UserId> {
        self.existing.iter().chain(self.auto_registered.iter()).map(|u| u.user_id.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdByEmailDto {
    pub email: String,
    pub user_id: UserId,
}

impl From<UserIdByEmail> for UserIdByEmailDto {
    fn from(row: UserIdByEmail) -> Self {
        Self { email: row.email, user_id: row.id }
    }
}
