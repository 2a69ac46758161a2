//! Login, refresh, logout and access-token authentication.

use chrono::Utc;
use tracing::{info, instrument, warn};
use validator::Validate;

use super::AuthWorkflow;
use crate::auth::hashing::equalize_timing;
use crate::auth::models::{NewRefreshToken, SessionTokens, User};
use crate::auth::token_service::TokenService;
use crate::auth::validation::LoginRequest;
use crate::domain::{RefreshTokenId, UserId};
use crate::errors::{DomainError, DomainResult, ErrorHandler, RepoError};
use crate::storage::Repositories;

const INVALID_CREDENTIALS: &str = "invalid email or password";

/// Mint an access/refresh pair for `user_id` and persist the refresh record.
pub async fn issue_session(
    tokens: &dyn TokenService,
    repos: &Repositories,
    user_id: &UserId,
) -> DomainResult<SessionTokens> {
    let access = tokens
        .gen_access_token(user_id)
        .map_err(|err| ErrorHandler::token("gen_access_token", err))?;
    let refresh = tokens
        .gen_refresh_token(user_id)
        .map_err(|err| ErrorHandler::token("gen_refresh_token", err))?;

    let record = NewRefreshToken {
        id: refresh.id.clone(),
        user_id: user_id.clone(),
        created_at: refresh.issued_at,
        expired_at: refresh.expires_at,
    };
    repos.refresh_tokens.create(record).await.map_err(|err| match err {
        RepoError::Conflict => DomainError::internal("refresh token id collision")
            .with_meta("operation", "create_refresh_token"),
        RepoError::NotFound => DomainError::unauthorized("user no longer exists")
            .with_meta("user_id", user_id.as_str()),
        other => ErrorHandler::repository("create_refresh_token", other),
    })?;

    Ok(SessionTokens {
        user_id: user_id.clone(),
        access_token: access.token,
        access_expires_at: access.expires_at,
        refresh_token: refresh.token,
        refresh_expires_at: refresh.expires_at,
    })
}

impl AuthWorkflow {
    /// Exchange verified credentials for a new session.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn login(&self, request: LoginRequest) -> DomainResult<SessionTokens> {
        let result = self.login_inner(request).await;
        self.metrics.record_login(result.is_ok());
        self.report("login", result)
    }

    async fn login_inner(&self, request: LoginRequest) -> DomainResult<SessionTokens> {
        request.validate()?;
        let email = User::normalize_email(&request.email);
        let repos = self.tx.repositories();

        let user = match repos.users.get_by_email(&email).await {
            Ok(user) => user,
            Err(RepoError::NotFound) => {
                equalize_timing(self.passwords.as_ref(), &request.password);
                return Err(DomainError::invalid_credentials(INVALID_CREDENTIALS));
            }
            Err(other) => return Err(ErrorHandler::repository("get_user_by_email", other)),
        };

        let matches = self
            .passwords
            .compare_password(&user.password_hash, &request.password)
            .map_err(|err| ErrorHandler::password("compare_password", err))?;
        if !matches {
            return Err(DomainError::invalid_credentials(INVALID_CREDENTIALS)
                .with_meta("user_id", user.id.as_str()));
        }

        if !user.is_verified() {
            return Err(DomainError::invalid_credentials("user is unverified")
                .with_meta("user_id", user.id.as_str()));
        }

        let session = issue_session(self.tokens.as_ref(), &repos, &user.id).await?;
        info!(user_id = %user.id, "user logged in");
        Ok(session)
    }

    /// Rotate a refresh token: the presented token is revoked and a new pair
    /// is returned. Presenting an already revoked token revokes every live
    /// session of its owner.
    #[instrument(skip(self, raw))]
    pub async fn refresh(&self, raw: &str) -> DomainResult<SessionTokens> {
        let result = self.refresh_inner(raw).await;
        self.metrics.record_refresh(result.is_ok());
        self.report("refresh", result)
    }

    async fn refresh_inner(&self, raw: &str) -> DomainResult<SessionTokens> {
        let (user_id, token_id) = self.live_refresh_token(raw).await?;

        let tokens = self.tokens.clone();
        let session = self
            .tx
            .do_with_tx(move |repos| async move {
                let session = issue_session(tokens.as_ref(), &repos, &user_id).await?;
                repos.refresh_tokens.revoke(&token_id).await.map_err(|err| match err {
                    RepoError::NotFound => {
                        DomainError::unauthorized("refresh token was already used")
                            .with_meta("token_id", token_id.as_str())
                    }
                    other => ErrorHandler::repository("revoke_refresh_token", other),
                })?;
                Ok(session)
            })
            .await?;

        info!(user_id = %session.user_id, "refresh token rotated");
        Ok(session)
    }

    /// Revoke the presented refresh token.
    #[instrument(skip(self, raw))]
    pub async fn logout(&self, raw: &str) -> DomainResult<()> {
        let result = self.logout_inner(raw).await;
        self.report("logout", result)
    }

    async fn logout_inner(&self, raw: &str) -> DomainResult<()> {
        let (user_id, token_id) = self.live_refresh_token(raw).await?;

        self.tx.repositories().refresh_tokens.revoke(&token_id).await.map_err(|err| match err {
            RepoError::NotFound => DomainError::unauthorized("refresh token was already used")
                .with_meta("token_id", token_id.as_str()),
            other => ErrorHandler::repository("revoke_refresh_token", other),
        })?;

        info!(user_id = %user_id, "user logged out");
        Ok(())
    }

    /// Identify the bearer of an access token. Touches no storage.
    #[instrument(skip(self, raw))]
    pub async fn authenticate(&self, raw: &str) -> DomainResult<UserId> {
        let result = self
            .tokens
            .verify_access_token(raw)
            .map_err(|err| ErrorHandler::token("verify_access_token", err));
        self.report("authenticate", result)
    }

    /// Verify a raw refresh token and check its stored record.
    ///
    /// Expired and unknown tokens are rejected. A revoked token triggers
    /// reuse handling: every live token of the user is revoked before the
    /// rejection is returned.
    async fn live_refresh_token(&self, raw: &str) -> DomainResult<(UserId, RefreshTokenId)> {
        let (user_id, token_id) = self
            .tokens
            .verify_refresh_token(raw)
            .map_err(|err| ErrorHandler::token("verify_refresh_token", err))?;

        let repos = self.tx.repositories();
        let record = repos.refresh_tokens.get_by_id(&token_id, &user_id).await.map_err(|err| {
            match err {
                RepoError::NotFound => DomainError::unauthorized("refresh token not found")
                    .with_meta("token_id", token_id.as_str()),
                other => ErrorHandler::repository("get_refresh_token", other),
            }
        })?;

        if record.is_expired_at(Utc::now()) {
            return Err(DomainError::unauthorized("refresh token is expired")
                .with_meta("token_id", token_id.as_str()));
        }

        if record.is_revoked() {
            self.metrics.record_reuse_detected();
            let revoked = repos
                .refresh_tokens
                .revoke_all_users_tokens(&user_id)
                .await
                .map_err(|err| ErrorHandler::repository("revoke_all_users_tokens", err))?;
            warn!(
                user_id = %user_id,
                token_id = %token_id,
                revoked,
                "revoked refresh token presented again; all user sessions revoked"
            );
            return Err(DomainError::unauthorized(
                "refresh token was revoked, all user tokens was revoked",
            )
            .with_meta("revoked_count", revoked)
            .with_meta("user_id", user_id.as_str())
            .with_meta("token_id", token_id.as_str()));
        }

        Ok((user_id, token_id))
    }
}
