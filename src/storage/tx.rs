//! Units of work.
//!
//! A [`TransactionManager`] hands out [`Repositories`] bound either to the
//! default connection or to one open transaction. Workflows never look the
//! active transaction up from ambient state; they receive the scoped façade as
//! a closure argument from [`do_with_tx`](trait.TransactionManager.html#method.do_with_tx).

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::errors::{DomainError, DomainResult, ErrorHandler, RepoResult};
use crate::storage::repositories::{EmailTokenRepository, RefreshTokenRepository, UserRepository};

/// Repositories sharing one execution scope.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub refresh_tokens: Arc<dyn RefreshTokenRepository>,
    pub email_tokens: Arc<dyn EmailTokenRepository>,
}

/// One open transaction. Dropping it without `commit` rolls it back.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Repositories whose calls run inside this transaction.
    fn repositories(&self) -> Repositories;

    async fn commit(&mut self) -> RepoResult<()>;

    async fn rollback(&mut self) -> RepoResult<()>;
}

#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// Repositories bound to the default connection.
    fn repositories(&self) -> Repositories;

    async fn begin(&self) -> RepoResult<Box<dyn UnitOfWork>>;

    /// Upper bound on how long one unit of work may run.
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

impl dyn TransactionManager {
    /// Run `f` against transaction-scoped repositories.
    ///
    /// Commits when `f` succeeds. On error or timeout the transaction is rolled
    /// back and the closure's error is returned as is.
    pub async fn do_with_tx<T, F, Fut>(&self, f: F) -> DomainResult<T>
    where
        F: FnOnce(Repositories) -> Fut + Send,
        Fut: Future<Output = DomainResult<T>> + Send,
        T: Send,
    {
        let mut uow =
            self.begin().await.map_err(|err| ErrorHandler::repository("begin_transaction", err))?;

        let work = f(uow.repositories());
        let outcome = match self.timeout() {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(outcome) => outcome,
                Err(_) => Err(DomainError::internal("transaction timed out")
                    .with_meta("timeout_ms", u64::try_from(limit.as_millis()).unwrap_or(u64::MAX))),
            },
            None => work.await,
        };

        match outcome {
            Ok(value) => {
                uow.commit()
                    .await
                    .map_err(|err| ErrorHandler::repository("commit_transaction", err))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = uow.rollback().await {
                    warn!(error = %rollback_err, kind = %err.kind(), "transaction rollback failed");
                }
                Err(err)
            }
        }
    }
}
