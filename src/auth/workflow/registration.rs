//! Account creation and email ownership: register, verify, resend, and
//! provisioning accounts for project invitees.

use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, info, instrument};
use validator::Validate;

use super::AuthWorkflow;
use crate::auth::email_token;
use crate::auth::hashing::unusable_password_hash;
use crate::auth::models::{
    EmailTokenPurpose, InvitationOutcome, NewUser, RegisteredUser, UpdateUser, User,
    UserIdByEmailDto,
};
use crate::auth::validation::{EmailRequest, RegisterRequest};
use crate::domain::{EmailTokenId, UserId};
use crate::errors::{DomainError, DomainResult, ErrorHandler, ErrorKind, RepoError};

fn user_create_error(err: RepoError, email: &str) -> DomainError {
    match err {
        RepoError::Conflict => DomainError::conflict("user with this email already exists")
            .with_meta("email", email.to_string()),
        other => ErrorHandler::repository("create_user", other),
    }
}

/// Email token ids are UUIDs; anything else cannot name a stored token.
pub(super) fn parse_email_token(raw: &str) -> DomainResult<EmailTokenId> {
    EmailTokenId::parse(raw.trim()).map_err(|_| DomainError::validation("email token not found"))
}

fn require_project(project: &str) -> DomainResult<&str> {
    let project = project.trim();
    if project.is_empty() {
        return Err(DomainError::validation("project is required"));
    }
    Ok(project)
}

impl AuthWorkflow {
    /// Create an unverified account and mail its verification link.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: RegisterRequest) -> DomainResult<RegisteredUser> {
        let result = self.register_inner(request).await;
        self.report("register", result)
    }

    async fn register_inner(&self, request: RegisterRequest) -> DomainResult<RegisteredUser> {
        request.validate()?;
        let email = User::normalize_email(&request.email);
        let password_hash = self
            .passwords
            .hash_password(&request.password)
            .map_err(|err| ErrorHandler::password("hash_password", err))?;

        let notifier = self.notifier.clone();
        let ttl = self.settings.email_token_ttl;
        let user_id = self
            .tx
            .do_with_tx(move |repos| async move {
                let user = NewUser {
                    id: UserId::new(),
                    email: email.clone(),
                    password_hash,
                    verified_at: None,
                };
                let user_id =
                    repos.users.create(user).await.map_err(|err| user_create_error(err, &email))?;

                let token = email_token::issue(
                    repos.email_tokens.as_ref(),
                    &user_id,
                    EmailTokenPurpose::Verify,
                    ttl,
                )
                .await?;
                notifier
                    .send_verification_email(&email, &token)
                    .await
                    .map_err(|err| ErrorHandler::notification("send_verification_email", err))?;
                Ok(user_id)
            })
            .await?;

        info!(user_id = %user_id, "user registered");
        Ok(RegisteredUser { user_id })
    }

    /// Redeem a verification token and mark its owner verified.
    #[instrument(skip(self, token))]
    pub async fn verify(&self, token: &str) -> DomainResult<()> {
        let result = self.verify_inner(token).await;
        self.report("verify", result)
    }

    async fn verify_inner(&self, token: &str) -> DomainResult<()> {
        let token_id = parse_email_token(token)?;

        let user_id = self
            .tx
            .do_with_tx(move |repos| async move {
                let now = Utc::now();
                let token = email_token::redeem(
                    repos.email_tokens.as_ref(),
                    &token_id,
                    EmailTokenPurpose::Verify,
                    now,
                )
                .await?;

                repos.users.update(&token.user_id, UpdateUser::verified(now)).await.map_err(
                    |err| match err {
                        RepoError::NotFound => DomainError::not_found("user not found")
                            .with_meta("user_id", token.user_id.as_str()),
                        other => ErrorHandler::repository("update_user", other),
                    },
                )?;
                email_token::consume(repos.email_tokens.as_ref(), &token_id).await?;
                Ok(token.user_id)
            })
            .await?;

        info!(user_id = %user_id, "email verified");
        Ok(())
    }

    /// Mail a fresh verification link. Unknown and already verified addresses
    /// get a success-shaped `Ok` error and no mail.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn resend_verification_email(&self, request: EmailRequest) -> DomainResult<()> {
        let result = self.resend_verification_email_inner(request).await;
        self.report("resend_verification_email", result)
    }

    async fn resend_verification_email_inner(&self, request: EmailRequest) -> DomainResult<()> {
        request.validate()?;
        let email = User::normalize_email(&request.email);

        let user = match self.tx.repositories().users.get_by_email(&email).await {
            Ok(user) => user,
            Err(RepoError::NotFound) => {
                return Err(DomainError::ok("verification email sent if the account exists"));
            }
            Err(other) => return Err(ErrorHandler::repository("get_user_by_email", other)),
        };
        if user.is_verified() {
            return Err(DomainError::ok("user is already verified")
                .with_meta("user_id", user.id.as_str()));
        }

        let notifier = self.notifier.clone();
        let ttl = self.settings.email_token_ttl;
        let user_id = user.id.clone();
        self.tx
            .do_with_tx(move |repos| async move {
                let token = email_token::issue(
                    repos.email_tokens.as_ref(),
                    &user.id,
                    EmailTokenPurpose::Verify,
                    ttl,
                )
                .await?;
                notifier
                    .send_verification_email(&user.email, &token)
                    .await
                    .map_err(|err| ErrorHandler::notification("send_verification_email", err))
            })
            .await?;

        debug!(user_id = %user_id, "verification email resent");
        Ok(())
    }

    /// Provision a verified account without a usable password for someone
    /// invited to `project`, and mail them a link to set one.
    ///
    /// The link is a reset token valid for `invitation_token_ttl`. Once it
    /// lapses the invitee sets a password through the regular reset flow.
    #[instrument(skip(self, email, project), fields(email = %email, project = %project))]
    pub async fn auto_register(&self, email: &str, project: &str) -> DomainResult<UserId> {
        let result = self.auto_register_checked(email, project).await;
        self.report("auto_register", result)
    }

    async fn auto_register_checked(&self, email: &str, project: &str) -> DomainResult<UserId> {
        let project = require_project(project)?;
        let request = EmailRequest::new(User::normalize_email(email));
        request.validate()?;
        self.auto_register_inner(request.email, project.to_string()).await
    }

    async fn auto_register_inner(&self, email: String, project: String) -> DomainResult<UserId> {
        let notifier = self.notifier.clone();
        let ttl = self.settings.invitation_token_ttl;
        let user_id = self
            .tx
            .do_with_tx(move |repos| async move {
                let user = NewUser {
                    id: UserId::new(),
                    email: email.clone(),
                    password_hash: unusable_password_hash(),
                    verified_at: Some(Utc::now()),
                };
                let user_id =
                    repos.users.create(user).await.map_err(|err| user_create_error(err, &email))?;

                let token = email_token::issue(
                    repos.email_tokens.as_ref(),
                    &user_id,
                    EmailTokenPurpose::Reset,
                    ttl,
                )
                .await?;
                notifier
                    .send_auto_register_email(&email, &project, &token)
                    .await
                    .map_err(|err| ErrorHandler::notification("send_auto_register_email", err))?;
                Ok(user_id)
            })
            .await?;

        info!(user_id = %user_id, "user auto-registered");
        Ok(user_id)
    }

    /// Make sure every address in `emails` has an account and tell each one
    /// about `project`.
    ///
    /// Existing accounts get an invitation; unknown addresses are
    /// auto-registered. Each invitee is handled on its own, so a failure
    /// leaves earlier invitees provisioned.
    #[instrument(skip(self, project, emails), fields(project = %project, invitees = emails.len()))]
    pub async fn invite_to_project(
        &self,
        project: &str,
        emails: &[String],
    ) -> DomainResult<InvitationOutcome> {
        let result = self.invite_to_project_inner(project, emails).await;
        self.report("invite_to_project", result)
    }

    async fn invite_to_project_inner(
        &self,
        project: &str,
        emails: &[String],
    ) -> DomainResult<InvitationOutcome> {
        let project = require_project(project)?;

        let mut seen = HashSet::new();
        let mut invitees = Vec::with_capacity(emails.len());
        for email in emails {
            let email = User::normalize_email(email);
            if seen.insert(email.clone()) {
                EmailRequest::new(email.clone()).validate()?;
                invitees.push(email);
            }
        }

        let mut outcome = InvitationOutcome::default();
        if invitees.is_empty() {
            return Ok(outcome);
        }

        let repos = self.tx.repositories();
        let existing = repos
            .users
            .get_ids_by_emails(&invitees)
            .await
            .map_err(|err| ErrorHandler::repository("get_user_ids_by_emails", err))?;
        let known: HashSet<String> = existing.iter().map(|row| row.email.clone()).collect();

        for row in existing {
            self.notifier
                .send_invitation_in_project(&row.email, project)
                .await
                .map_err(|err| ErrorHandler::notification("send_invitation_in_project", err))?;
            outcome.existing.push(UserIdByEmailDto::from(row));
        }

        for email in invitees.into_iter().filter(|email| !known.contains(email)) {
            match self.auto_register_inner(email.clone(), project.to_string()).await {
                Ok(user_id) => outcome.auto_registered.push(UserIdByEmailDto { email, user_id }),
                Err(err) if err.kind() == ErrorKind::Conflict => {
                    // Registered between the lookup and the insert.
                    let user = repos
                        .users
                        .get_by_email(&email)
                        .await
                        .map_err(|err| ErrorHandler::repository("get_user_by_email", err))?;
                    self.notifier.send_invitation_in_project(&email, project).await.map_err(
                        |err| ErrorHandler::notification("send_invitation_in_project", err),
                    )?;
                    outcome.existing.push(UserIdByEmailDto { email, user_id: user.id });
                }
                Err(err) => return Err(err),
            }
        }

        info!(
            existing = outcome.existing.len(),
            auto_registered = outcome.auto_registered.len(),
            "project invitations sent"
        );
        Ok(outcome)
    }
}
