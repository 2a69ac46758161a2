//! PostgreSQL execution scopes.
//!
//! Every Postgres repository holds a [`PgHandle`]: either the shared pool or a
//! transaction shared by all repositories of one [`PgUnitOfWork`].

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, Postgres, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

use crate::errors::{RepoError, RepoResult};
use crate::storage::pool::DbPool;
use crate::storage::repositories::{
    SqlxEmailTokenRepository, SqlxRefreshTokenRepository, SqlxUserRepository,
};
use crate::storage::tx::{Repositories, TransactionManager, UnitOfWork};

type SharedTransaction = Arc<Mutex<Option<Transaction<'static, Postgres>>>>;

#[derive(Clone)]
pub enum PgHandle {
    Pool(DbPool),
    Tx(SharedTransaction),
}

/// A connection borrowed for one statement.
pub enum PgConn<'a> {
    Pooled(PoolConnection<Postgres>),
    Tx(MutexGuard<'a, Option<Transaction<'static, Postgres>>>),
}

impl PgHandle {
    pub async fn acquire(&self) -> RepoResult<PgConn<'_>> {
        match self {
            PgHandle::Pool(pool) => pool
                .acquire()
                .await
                .map(PgConn::Pooled)
                .map_err(|err| RepoError::from_sqlx(err, "Failed to acquire connection")),
            PgHandle::Tx(tx) => Ok(PgConn::Tx(tx.lock().await)),
        }
    }

    pub fn in_transaction(&self) -> bool {
        matches!(self, PgHandle::Tx(_))
    }
}

impl PgConn<'_> {
    pub fn executor(&mut self) -> RepoResult<&mut PgConnection> {
        match self {
            PgConn::Pooled(conn) => Ok(&mut **conn),
            PgConn::Tx(guard) => guard
                .as_deref_mut()
                .ok_or_else(|| RepoError::internal("Transaction already finished")),
        }
    }
}

impl Repositories {
    pub fn postgres(handle: PgHandle) -> Self {
        Self {
            users: Arc::new(SqlxUserRepository::new(handle.clone())),
            refresh_tokens: Arc::new(SqlxRefreshTokenRepository::new(handle.clone())),
            email_tokens: Arc::new(SqlxEmailTokenRepository::new(handle)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgTransactionManager {
    pool: DbPool,
    timeout: Option<Duration>,
}

impl PgTransactionManager {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, timeout: None }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl TransactionManager for PgTransactionManager {
    fn repositories(&self) -> Repositories {
        Repositories::postgres(PgHandle::Pool(self.pool.clone()))
    }

    async fn begin(&self) -> RepoResult<Box<dyn UnitOfWork>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|err| RepoError::from_sqlx(err, "Failed to begin transaction"))?;
        Ok(Box::new(PgUnitOfWork { tx: Arc::new(Mutex::new(Some(tx))) }))
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Open Postgres transaction. sqlx rolls it back if it is dropped unfinished.
pub struct PgUnitOfWork {
    tx: SharedTransaction,
}

impl PgUnitOfWork {
    async fn take(&self) -> RepoResult<Transaction<'static, Postgres>> {
        self.tx.lock().await.take().ok_or_else(|| RepoError::internal("Transaction already finished"))
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    fn repositories(&self) -> Repositories {
        Repositories::postgres(PgHandle::Tx(self.tx.clone()))
    }

    async fn commit(&mut self) -> RepoResult<()> {
        self.take()
            .await?
            .commit()
            .await
            .map_err(|err| RepoError::from_sqlx(err, "Failed to commit transaction"))
    }

    async fn rollback(&mut self) -> RepoResult<()> {
        self.take()
            .await?
            .rollback()
            .await
            .map_err(|err| RepoError::from_sqlx(err, "Failed to roll back transaction"))
    }
}
