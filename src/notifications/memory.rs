//! Recording notifier for tests and local development.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use super::{NotificationError, NotificationRepository};
use crate::domain::EmailTokenId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Verification { email: String, token: EmailTokenId },
    ResetPassword { email: String, token: EmailTokenId },
    AutoRegister { email: String, project: String, token: EmailTokenId },
    Invitation { email: String, project: String },
}

impl Notification {
    pub fn email(&self) -> &str {
        match self {
            Notification::Verification { email, .. }
            | Notification::ResetPassword { email, .. }
            | Notification::AutoRegister { email, .. }
            | Notification::Invitation { email, .. } => email,
        }
    }

    pub fn token(&self) -> Option<&EmailTokenId> {
        match self {
            Notification::Verification { token, .. }
            | Notification::ResetPassword { token, .. }
            | Notification::AutoRegister { token, .. } => Some(token),
            Notification::Invitation { .. } => None,
        }
    }
}

/// Keeps every message instead of delivering it. Can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following send fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Token carried by the most recent message to `email`.
    pub fn last_token_for(&self, email: &str) -> Option<EmailTokenId> {
        self.sent().into_iter().rev().find(|n| n.email() == email).and_then(|n| n.token().cloned())
    }

    fn record(&self, notification: Notification) -> Result<(), NotificationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::Transport(format!(
                "delivery to {} refused",
                notification.email()
            )));
        }
        tracing::debug!(?notification, "notification recorded");
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).push(notification);
        Ok(())
    }
}

#[async_trait]
impl NotificationRepository for RecordingNotifier {
    async fn send_verification_email(
        &self,
        email: &str,
        token: &EmailTokenId,
    ) -> Result<(), NotificationError> {
        self.record(Notification::Verification { email: email.to_string(), token: token.clone() })
    }

    async fn send_reset_password_email(
        &self,
        email: &str,
        token: &EmailTokenId,
    ) -> Result<(), NotificationError> {
        self.record(Notification::ResetPassword { email: email.to_string(), token: token.clone() })
    }

    async fn send_auto_register_email(
        &self,
        email: &str,
        project: &str,
        token: &EmailTokenId,
    ) -> Result<(), NotificationError> {
        self.record(Notification::AutoRegister {
            email: email.to_string(),
            project: project.to_string(),
            token: token.clone(),
        })
    }

    async fn send_invitation_in_project(
        &self,
        email: &str,
        project: &str,
    ) -> Result<(), NotificationError> {
        self.record(Notification::Invitation {
            email: email.to_string(),
            project: project.to_string(),
        })
    }
}
