//! SMTP delivery through `lettre`.

use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{NotificationError, NotificationRepository};
use crate::config::EmailConfig;
use crate::domain::EmailTokenId;
use crate::errors::{Error, Result};

/// SMTP transport, or a logging no-op when no host is configured.
#[derive(Clone)]
pub struct SmtpNotificationRepository {
    transport: Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>,
    from: Mailbox,
    verify_url: String,
    reset_password_url: String,
    project_url: String,
}

impl SmtpNotificationRepository {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let from = config
            .from_address
            .parse::<Mailbox>()
            .map_err(|e| Error::config(format!("Invalid from address: {e}")))?;

        let transport = if !config.delivery_enabled() {
            warn!("SMTP host not configured; notifications will only be logged");
            None
        } else {
            let builder = if config.use_tls {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            }
            .map_err(|e| Error::config(format!("Failed to configure SMTP transport: {e}")))?
            .port(config.smtp_port);

            let builder = match (&config.smtp_username, &config.smtp_password) {
                (Some(username), Some(password)) => {
                    builder.credentials(Credentials::new(username.clone(), password.clone()))
                }
                _ => builder,
            };

            Some(Arc::new(builder.build()))
        };

        Ok(Self {
            transport,
            from,
            verify_url: config.verify_url.clone(),
            reset_password_url: config.reset_password_url.clone(),
            project_url: config.project_url.clone(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    fn token_link(base: &str, token: &EmailTokenId) -> String {
        let separator = if base.contains('?') { '&' } else { '?' };
        format!("{base}{separator}token={token}")
    }

    fn project_link(&self, project: &str) -> String {
        format!("{}/{}", self.project_url.trim_end_matches('/'), project)
    }

    async fn send_mail(
        &self,
        recipient: &str,
        subject: &str,
        body: String,
    ) -> std::result::Result<(), NotificationError> {
        let to = recipient.parse::<Mailbox>().map_err(|e| NotificationError::InvalidAddress {
            address: recipient.to_string(),
            reason: e.to_string(),
        })?;

        let Some(transport) = &self.transport else {
            info!(subject, recipient, "email delivery disabled; skipping send");
            return Ok(());
        };

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| NotificationError::Build(e.to_string()))?;

        transport.send(message).await.map_err(|e| NotificationError::Transport(e.to_string()))?;
        info!(subject, "email sent");
        Ok(())
    }
}

#[async_trait]
impl NotificationRepository for SmtpNotificationRepository {
    #[instrument(skip(self, token))]
    async fn send_verification_email(
        &self,
        email: &str,
        token: &EmailTokenId,
    ) -> std::result::Result<(), NotificationError> {
        let body = format!(
            "Please confirm your email address by opening the link below:\n{}\n\n\
             If you did not create an account, ignore this email.",
            Self::token_link(&self.verify_url, token)
        );
        self.send_mail(email, "Confirm your email address", body).await
    }

    #[instrument(skip(self, token))]
    async fn send_reset_password_email(
        &self,
        email: &str,
        token: &EmailTokenId,
    ) -> std::result::Result<(), NotificationError> {
        let body = format!(
            "We received a request to reset your password. Open the link below to choose a new one:\n{}\n\n\
             If you did not request this, ignore this email.",
            Self::token_link(&self.reset_password_url, token)
        );
        self.send_mail(email, "Reset your password", body).await
    }

    #[instrument(skip(self, token))]
    async fn send_auto_register_email(
        &self,
        email: &str,
        project: &str,
        token: &EmailTokenId,
    ) -> std::result::Result<(), NotificationError> {
        let body = format!(
            "You were invited to the project \"{project}\" and an account was created for you.\n\
             Set your password here:\n{}\n\nThen open the project:\n{}",
            Self::token_link(&self.reset_password_url, token),
            self.project_link(project)
        );
        self.send_mail(email, "You have been invited", body).await
    }

    #[instrument(skip(self))]
    async fn send_invitation_in_project(
        &self,
        email: &str,
        project: &str,
    ) -> std::result::Result<(), NotificationError> {
        let body = format!(
            "You were added to the project \"{project}\".\nOpen it here:\n{}",
            self.project_link(project)
        );
        self.send_mail(email, "You have been added to a project", body).await
    }
}
