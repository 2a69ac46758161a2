//! Request DTOs for the credential workflows and their validation rules.

use serde::{Deserialize, Serialize};
use std::fmt;
use validator::{Validate, ValidationError};

use crate::domain::UserId;

pub const MIN_PASSWORD_LENGTH: u64 = 8;
pub const MAX_PASSWORD_LENGTH: u64 = 128;

/// Transient email/password pair presented at login. Never persisted.
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct Credentials {
    #[validate(length(min = 1, max = 320, message = "email is required"))]
    pub email: String,
    #[validate(length(min = 1, max = 128, message = "password is required"))]
    pub password: String,
}

pub type LoginRequest = Credentials;

impl Credentials {
    pub fn new<E: Into<String>, P: Into<String>>(email: E, password: P) -> Self {
        Self { email: email.into(), password: password.into() }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").field("email", &self.email).field("password", &"***").finish()
    }
}

#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "email is not valid"))]
    pub email: String,
    #[validate(custom(function = "validate_password"))]
    pub password: String,
}

impl RegisterRequest {
    pub fn new<E: Into<String>, P: Into<String>>(email: E, password: P) -> Self {
        Self { email: email.into(), password: password.into() }
    }
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest").field("email", &self.email).finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EmailRequest {
    #[validate(email(message = "email is not valid"))]
    pub email: String,
}

impl EmailRequest {
    pub fn new<E: Into<String>>(email: E) -> Self {
        Self { email: email.into() }
    }
}

#[derive(Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "token is required"))]
    pub token: String,
    #[validate(custom(function = "validate_password"))]
    pub new_password: String,
}

impl fmt::Debug for ResetPasswordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResetPasswordRequest").finish_non_exhaustive()
    }
}

#[derive(Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub user_id: UserId,
    #[validate(length(min = 1, message = "current password is required"))]
    pub old_password: String,
    #[validate(custom(function = "validate_password"))]
    pub new_password: String,
}

impl fmt::Debug for ChangePasswordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangePasswordRequest")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count() as u64;
    if len < MIN_PASSWORD_LENGTH {
        let mut err = ValidationError::new("password_too_short");
        err.message = Some(format!("password must be at least {MIN_PASSWORD_LENGTH} characters").into());
        return Err(err);
    }
    if len > MAX_PASSWORD_LENGTH {
        let mut err = ValidationError::new("password_too_long");
        err.message = Some(format!("password must be at most {MAX_PASSWORD_LENGTH} characters").into());
        return Err(err);
    }
    if password.trim().is_empty() {
        let mut err = ValidationError::new("password_blank");
        err.message = Some("password must not be blank".into());
        return Err(err);
    }
    Ok(())
}
