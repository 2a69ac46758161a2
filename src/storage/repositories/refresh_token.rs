//! Refresh token records
//!
//! Revocation is a conditional update so two racing consumers of the same
//! token cannot both succeed.

use crate::auth::models::{NewRefreshToken, RefreshToken};
use crate::domain::{RefreshTokenId, UserId};
use crate::errors::{RepoError, RepoResult};
use crate::storage::postgres::PgHandle;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use tracing::instrument;

#[derive(Debug, Clone, FromRow)]
struct RefreshTokenRow {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl From<RefreshTokenRow> for RefreshToken {
    fn from(row: RefreshTokenRow) -> Self {
        Self {
            id: RefreshTokenId::from_string(row.id),
            user_id: UserId::from_string(row.user_id),
            created_at: row.created_at,
            expired_at: row.expired_at,
            revoked_at: row.revoked_at,
        }
    }
}

#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    /// `Conflict` on a duplicate id, `NotFound` when the user does not exist.
    async fn create(&self, token: NewRefreshToken) -> RepoResult<()>;

    /// Record for `id` owned by `user_id`.
    async fn get_by_id(&self, id: &RefreshTokenId, user_id: &UserId) -> RepoResult<RefreshToken>;

    /// Set `revoked_at` if still unset. `NotFound` if absent or already revoked.
    async fn revoke(&self, id: &RefreshTokenId) -> RepoResult<()>;

    /// Revoke every live token of the user, returning how many were revoked.
    async fn revoke_all_users_tokens(&self, user_id: &UserId) -> RepoResult<u64>;

    /// Delete tokens revoked or expired more than `older_than_days` ago.
    async fn delete_revoked_and_old_tokens(&self, older_than_days: i64) -> RepoResult<u64>;
}

/// Cutoff shared by the sweep queries of every backend.
pub fn retention_cutoff(now: DateTime<Utc>, older_than_days: i64) -> DateTime<Utc> {
    now - Duration::days(older_than_days.max(0))
}

#[derive(Clone)]
pub struct SqlxRefreshTokenRepository {
    handle: PgHandle,
}

impl SqlxRefreshTokenRepository {
    pub fn new(handle: PgHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl RefreshTokenRepository for SqlxRefreshTokenRepository {
    #[instrument(skip(self, token), fields(token_id = %token.id, user_id = %token.user_id), name = "db_create_refresh_token")]
    async fn create(&self, token: NewRefreshToken) -> RepoResult<()> {
        let mut conn = self.handle.acquire().await?;
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, created_at, expired_at, revoked_at)
            VALUES ($1, $2, $3, $4, NULL)
            "#,
        )
        .bind(token.id.as_str())
        .bind(token.user_id.as_str())
        .bind(token.created_at)
        .bind(token.expired_at)
        .execute(conn.executor()?)
        .await
        .map_err(|err| RepoError::from_sqlx(err, "Failed to create refresh token"))?;

        Ok(())
    }

    #[instrument(skip(self), fields(token_id = %id, user_id = %user_id), name = "db_get_refresh_token")]
    async fn get_by_id(&self, id: &RefreshTokenId, user_id: &UserId) -> RepoResult<RefreshToken> {
        let mut conn = self.handle.acquire().await?;
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT id, user_id, created_at, expired_at, revoked_at
            FROM refresh_tokens
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id.as_str())
        .bind(user_id.as_str())
        .fetch_one(conn.executor()?)
        .await
        .map_err(|err| RepoError::from_sqlx(err, "Failed to fetch refresh token"))?;

        Ok(row.into())
    }

    #[instrument(skip(self), fields(token_id = %id), name = "db_revoke_refresh_token")]
    async fn revoke(&self, id: &RefreshTokenId) -> RepoResult<()> {
        let mut conn = self.handle.acquire().await?;
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $1 WHERE id = $2 AND revoked_at IS NULL",
        )
        .bind(Utc::now())
        .bind(id.as_str())
        .execute(conn.executor()?)
        .await
        .map_err(|err| RepoError::from_sqlx(err, "Failed to revoke refresh token"))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user_id), name = "db_revoke_all_refresh_tokens")]
    async fn revoke_all_users_tokens(&self, user_id: &UserId) -> RepoResult<u64> {
        let mut conn = self.handle.acquire().await?;
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $1
            WHERE user_id = $2 AND revoked_at IS NULL AND expired_at > $1
            "#,
        )
        .bind(now)
        .bind(user_id.as_str())
        .execute(conn.executor()?)
        .await
        .map_err(|err| RepoError::from_sqlx(err, "Failed to revoke user refresh tokens"))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), name = "db_delete_old_refresh_tokens")]
    async fn delete_revoked_and_old_tokens(&self, older_than_days: i64) -> RepoResult<u64> {
        let mut conn = self.handle.acquire().await?;
        let cutoff = retention_cutoff(Utc::now(), older_than_days);
        let result = sqlx::query(
            "DELETE FROM refresh_tokens WHERE revoked_at < $1 OR expired_at < $1",
        )
        .bind(cutoff)
        .execute(conn.executor()?)
        .await
        .map_err(|err| RepoError::from_sqlx(err, "Failed to delete old refresh tokens"))?;

        Ok(result.rows_affected())
    }
}
