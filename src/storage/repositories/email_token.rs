//! Email token records
//!
//! Reads inside a transaction lock the row so concurrent redemptions of the
//! same token serialize; `use_token` only flips an unused token.

use crate::auth::models::{EmailToken, EmailTokenPurpose, NewEmailToken};
use crate::domain::{EmailTokenId, UserId};
use crate::errors::{RepoError, RepoResult};
use crate::storage::postgres::PgHandle;
use crate::storage::repositories::refresh_token::retention_cutoff;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::instrument;

#[derive(Debug, Clone, FromRow)]
struct EmailTokenRow {
    pub id: String,
    pub user_id: String,
    pub purpose: String,
    pub created_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl TryFrom<EmailTokenRow> for EmailToken {
    type Error = RepoError;

    fn try_from(row: EmailTokenRow) -> RepoResult<Self> {
        let purpose = EmailTokenPurpose::from_str(&row.purpose).map_err(|err| {
            RepoError::Internal { context: "Unknown email token purpose".to_string(), source: Some(Box::new(err)) }
        })?;

        Ok(Self {
            id: EmailTokenId::from_string(row.id),
            user_id: UserId::from_string(row.user_id),
            purpose,
            created_at: row.created_at,
            expired_at: row.expired_at,
            used_at: row.used_at,
        })
    }
}

#[async_trait]
pub trait EmailTokenRepository: Send + Sync {
    /// `Conflict` on a duplicate id, `NotFound` when the user does not exist.
    async fn create(&self, token: NewEmailToken) -> RepoResult<()>;

    /// Fetch a token; locks it for the rest of the enclosing transaction.
    async fn get_by_id(&self, id: &EmailTokenId) -> RepoResult<EmailToken>;

    /// Set `used_at` if still unset. `NotFound` if absent or already used.
    async fn use_token(&self, id: &EmailTokenId) -> RepoResult<()>;

    /// Delete tokens used or expired more than `older_than_days` ago.
    async fn delete_used_and_old_tokens(&self, older_than_days: i64) -> RepoResult<u64>;
}

#[derive(Clone)]
pub struct SqlxEmailTokenRepository {
    handle: PgHandle,
}

impl SqlxEmailTokenRepository {
    pub fn new(handle: PgHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl EmailTokenRepository for SqlxEmailTokenRepository {
    #[instrument(skip(self, token), fields(user_id = %token.user_id, purpose = %token.purpose), name = "db_create_email_token")]
    async fn create(&self, token: NewEmailToken) -> RepoResult<()> {
        let mut conn = self.handle.acquire().await?;
        sqlx::query(
            r#"
            INSERT INTO email_tokens (id, user_id, purpose, created_at, expired_at, used_at)
            VALUES ($1, $2, $3, $4, $5, NULL)
            "#,
        )
        .bind(token.id.as_str())
        .bind(token.user_id.as_str())
        .bind(token.purpose.as_str())
        .bind(token.created_at)
        .bind(token.expired_at)
        .execute(conn.executor()?)
        .await
        .map_err(|err| RepoError::from_sqlx(err, "Failed to create email token"))?;

        Ok(())
    }

    #[instrument(skip(self, id), name = "db_get_email_token")]
    async fn get_by_id(&self, id: &EmailTokenId) -> RepoResult<EmailToken> {
        let query = if self.handle.in_transaction() {
            "SELECT id, user_id, purpose, created_at, expired_at, used_at FROM email_tokens WHERE id = $1 FOR UPDATE"
        } else {
            "SELECT id, user_id, purpose, created_at, expired_at, used_at FROM email_tokens WHERE id = $1"
        };

        let mut conn = self.handle.acquire().await?;
        let row = sqlx::query_as::<_, EmailTokenRow>(query)
            .bind(id.as_str())
            .fetch_one(conn.executor()?)
            .await
            .map_err(|err| RepoError::from_sqlx(err, "Failed to fetch email token"))?;

        row.try_into()
    }

    #[instrument(skip(self, id), name = "db_use_email_token")]
    async fn use_token(&self, id: &EmailTokenId) -> RepoResult<()> {
        let mut conn = self.handle.acquire().await?;
        let result =
            sqlx::query("UPDATE email_tokens SET used_at = $1 WHERE id = $2 AND used_at IS NULL")
                .bind(Utc::now())
                .bind(id.as_str())
                .execute(conn.executor()?)
                .await
                .map_err(|err| RepoError::from_sqlx(err, "Failed to mark email token used"))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self), name = "db_delete_old_email_tokens")]
    async fn delete_used_and_old_tokens(&self, older_than_days: i64) -> RepoResult<u64> {
        let mut conn = self.handle.acquire().await?;
        let cutoff = retention_cutoff(Utc::now(), older_than_days);
        let result = sqlx::query("DELETE FROM email_tokens WHERE used_at < $1 OR expired_at < $1")
            .bind(cutoff)
            .execute(conn.executor()?)
            .await
            .map_err(|err| RepoError::from_sqlx(err, "Failed to delete old email tokens"))?;

        Ok(result.rows_affected())
    }
}
