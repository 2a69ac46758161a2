//! Password reset by email and password change by the signed-in owner.

use chrono::Utc;
use tracing::{info, instrument};
use validator::Validate;

use super::registration::parse_email_token;
use super::AuthWorkflow;
use crate::auth::email_token;
use crate::auth::models::{EmailTokenPurpose, UpdateUser, User};
use crate::auth::validation::{ChangePasswordRequest, EmailRequest, ResetPasswordRequest};
use crate::errors::{DomainError, DomainResult, ErrorHandler, RepoError};

impl AuthWorkflow {
    /// Mail a password reset link. Unknown addresses get a success-shaped
    /// `Ok` error and no mail.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn send_password_reset_email(&self, request: EmailRequest) -> DomainResult<()> {
        let result = self.send_password_reset_email_inner(request).await;
        self.report("send_password_reset_email", result)
    }

    async fn send_password_reset_email_inner(&self, request: EmailRequest) -> DomainResult<()> {
        request.validate()?;
        let email = User::normalize_email(&request.email);

        let user = match self.tx.repositories().users.get_by_email(&email).await {
            Ok(user) => user,
            Err(RepoError::NotFound) => {
                return Err(DomainError::ok("reset email sent if the account exists"));
            }
            Err(other) => return Err(ErrorHandler::repository("get_user_by_email", other)),
        };

        let notifier = self.notifier.clone();
        let ttl = self.settings.email_token_ttl;
        let user_id = user.id.clone();
        self.tx
            .do_with_tx(move |repos| async move {
                let token = email_token::issue(
                    repos.email_tokens.as_ref(),
                    &user.id,
                    EmailTokenPurpose::Reset,
                    ttl,
                )
                .await?;
                notifier
                    .send_reset_password_email(&user.email, &token)
                    .await
                    .map_err(|err| ErrorHandler::notification("send_reset_password_email", err))
            })
            .await?;

        info!(user_id = %user_id, "password reset email sent");
        Ok(())
    }

    /// Redeem a reset token, replace the password and end every session of
    /// the account.
    #[instrument(skip(self, request))]
    pub async fn reset_password(&self, request: ResetPasswordRequest) -> DomainResult<()> {
        let result = self.reset_password_inner(request).await;
        self.report("reset_password", result)
    }

    async fn reset_password_inner(&self, request: ResetPasswordRequest) -> DomainResult<()> {
        request.validate()?;
        let token_id = parse_email_token(&request.token)?;
        let password_hash = self
            .passwords
            .hash_password(&request.new_password)
            .map_err(|err| ErrorHandler::password("hash_password", err))?;

        let (user_id, revoked) = self
            .tx
            .do_with_tx(move |repos| async move {
                let token = email_token::redeem(
                    repos.email_tokens.as_ref(),
                    &token_id,
                    EmailTokenPurpose::Reset,
                    Utc::now(),
                )
                .await?;

                repos
                    .users
                    .update(&token.user_id, UpdateUser::password(password_hash))
                    .await
                    .map_err(|err| match err {
                        RepoError::NotFound => DomainError::not_found("user not found")
                            .with_meta("user_id", token.user_id.as_str()),
                        other => ErrorHandler::repository("update_user", other),
                    })?;
                email_token::consume(repos.email_tokens.as_ref(), &token_id).await?;

                let revoked = repos
                    .refresh_tokens
                    .revoke_all_users_tokens(&token.user_id)
                    .await
                    .map_err(|err| ErrorHandler::repository("revoke_all_users_tokens", err))?;
                Ok((token.user_id, revoked))
            })
            .await?;

        info!(user_id = %user_id, revoked_sessions = revoked, "password reset");
        Ok(())
    }

    /// Replace the password after checking the current one. Sessions stay
    /// alive.
    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn change_password(&self, request: ChangePasswordRequest) -> DomainResult<()> {
        let result = self.change_password_inner(request).await;
        self.report("change_password", result)
    }

    async fn change_password_inner(&self, request: ChangePasswordRequest) -> DomainResult<()> {
        request.validate()?;
        let repos = self.tx.repositories();

        let user = repos.users.get_by_id(&request.user_id).await.map_err(|err| match err {
            RepoError::NotFound => DomainError::not_found("user not found")
                .with_meta("user_id", request.user_id.as_str()),
            other => ErrorHandler::repository("get_user_by_id", other),
        })?;

        let matches = self
            .passwords
            .compare_password(&user.password_hash, &request.old_password)
            .map_err(|err| ErrorHandler::password("compare_password", err))?;
        if !matches {
            return Err(DomainError::invalid_credentials("old password is incorrect")
                .with_meta("user_id", user.id.as_str()));
        }

        let password_hash = self
            .passwords
            .hash_password(&request.new_password)
            .map_err(|err| ErrorHandler::password("hash_password", err))?;
        repos
            .users
            .update(&user.id, UpdateUser::password(password_hash))
            .await
            .map_err(|err| ErrorHandler::repository("update_user", err))?;

        info!(user_id = %user.id, "password changed");
        Ok(())
    }
}
