//! Outbound account notifications.
//!
//! A successful return means the message was handed to the transport; an
//! error means delivery is not confirmed. Nothing here can recall a message
//! that was already sent.

pub mod memory;
pub mod smtp;

use async_trait::async_trait;

use crate::domain::EmailTokenId;

pub use memory::{Notification, RecordingNotifier};
pub use smtp::SmtpNotificationRepository;

#[derive(thiserror::Error, Debug)]
pub enum NotificationError {
    #[error("invalid email address `{address}`: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("failed to deliver message: {0}")]
    Transport(String),
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Link that confirms ownership of `email`.
    async fn send_verification_email(
        &self,
        email: &str,
        token: &EmailTokenId,
    ) -> Result<(), NotificationError>;

    async fn send_reset_password_email(
        &self,
        email: &str,
        token: &EmailTokenId,
    ) -> Result<(), NotificationError>;

    /// Account created on the recipient's behalf; `token` lets them set a password.
    async fn send_auto_register_email(
        &self,
        email: &str,
        project: &str,
        token: &EmailTokenId,
    ) -> Result<(), NotificationError>;

    async fn send_invitation_in_project(
        &self,
        email: &str,
        project: &str,
    ) -> Result<(), NotificationError>;
}
