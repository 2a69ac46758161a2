//! User repository
//!
//! Accounts keyed by id with a unique, normalized email.

use crate::auth::models::{NewUser, UpdateUser, User, UserIdByEmail};
use crate::domain::UserId;
use crate::errors::{RepoError, RepoResult};
use crate::storage::postgres::PgHandle;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::instrument;

#[derive(Debug, Clone, FromRow)]
struct UserRow {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::from_string(row.id),
            email: row.email,
            password_hash: row.password_hash,
            verified_at: row.verified_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct UserIdByEmailRow {
    pub id: String,
    pub email: String,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user. `Conflict` when the email is taken.
    async fn create(&self, user: NewUser) -> RepoResult<UserId>;

    async fn get_by_email(&self, email: &str) -> RepoResult<User>;

    async fn get_by_id(&self, id: &UserId) -> RepoResult<User>;

    /// Apply the set fields of `update`. `NotFound` when no such user exists.
    async fn update(&self, id: &UserId, update: UpdateUser) -> RepoResult<()>;

    /// Ids of the emails that have accounts; unknown emails are omitted.
    async fn get_ids_by_emails(&self, emails: &[String]) -> RepoResult<Vec<UserIdByEmail>>;
}

#[derive(Clone)]
pub struct SqlxUserRepository {
    handle: PgHandle,
}

impl SqlxUserRepository {
    pub fn new(handle: PgHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    #[instrument(skip(self, user), fields(user_id = %user.id), name = "db_create_user")]
    async fn create(&self, user: NewUser) -> RepoResult<UserId> {
        let mut conn = self.handle.acquire().await?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, verified_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id.as_str())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.verified_at)
        .bind(now)
        .bind(now)
        .execute(conn.executor()?)
        .await
        .map_err(|err| RepoError::from_sqlx(err, "Failed to create user"))?;

        Ok(user.id)
    }

    #[instrument(skip(self), name = "db_get_user_by_email")]
    async fn get_by_email(&self, email: &str) -> RepoResult<User> {
        let mut conn = self.handle.acquire().await?;
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, verified_at, created_at, updated_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(conn.executor()?)
        .await
        .map_err(|err| RepoError::from_sqlx(err, "Failed to fetch user by email"))?;

        Ok(row.into())
    }

    #[instrument(skip(self), fields(user_id = %id), name = "db_get_user")]
    async fn get_by_id(&self, id: &UserId) -> RepoResult<User> {
        let mut conn = self.handle.acquire().await?;
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, verified_at, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_one(conn.executor()?)
        .await
        .map_err(|err| RepoError::from_sqlx(err, "Failed to fetch user"))?;

        Ok(row.into())
    }

    #[instrument(skip(self, update), fields(user_id = %id), name = "db_update_user")]
    async fn update(&self, id: &UserId, update: UpdateUser) -> RepoResult<()> {
        let mut conn = self.handle.acquire().await?;
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = COALESCE($1, password_hash),
                verified_at = COALESCE($2, verified_at),
                updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(update.password_hash)
        .bind(update.verified_at)
        .bind(Utc::now())
        .bind(id.as_str())
        .execute(conn.executor()?)
        .await
        .map_err(|err| RepoError::from_sqlx(err, "Failed to update user"))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self, emails), fields(count = emails.len()), name = "db_get_ids_by_emails")]
    async fn get_ids_by_emails(&self, emails: &[String]) -> RepoResult<Vec<UserIdByEmail>> {
        if emails.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.handle.acquire().await?;
        let rows = sqlx::query_as::<_, UserIdByEmailRow>(
            "SELECT id, email FROM users WHERE email = ANY($1) ORDER BY email",
        )
        .bind(emails)
        .fetch_all(conn.executor()?)
        .await
        .map_err(|err| RepoError::from_sqlx(err, "Failed to look up users by email"))?;

        Ok(rows
            .into_iter()
            .map(|row| UserIdByEmail { email: row.email, id: UserId::from_string(row.id) })
            .collect())
    }
}
