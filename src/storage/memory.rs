//! In-memory storage backend.
//!
//! Same contracts as the Postgres repositories: unique emails, foreign keys
//! and conditional revoke/use. A unit of work holds the store lock for its
//! whole lifetime, so transactions are serializable. Rolling back or dropping
//! an unfinished one restores the snapshot taken at `begin`.
//!
//! Calling the default-scope repositories from inside a transaction closure
//! waits for that transaction to finish. Use the repositories the closure is
//! given.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::auth::models::{
    EmailToken, NewEmailToken, NewRefreshToken, NewUser, RefreshToken, UpdateUser, User,
    UserIdByEmail,
};
use crate::domain::{EmailTokenId, RefreshTokenId, UserId};
use crate::errors::{RepoError, RepoResult};
use crate::storage::repositories::{
    retention_cutoff, EmailTokenRepository, RefreshTokenRepository, UserRepository,
};
use crate::storage::tx::{Repositories, TransactionManager, UnitOfWork};

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub users: HashMap<UserId, User>,
    pub refresh_tokens: HashMap<RefreshTokenId, RefreshToken>,
    pub email_tokens: HashMap<EmailTokenId, EmailToken>,
    /// Operations (`"users.create"`, `"refresh_tokens.revoke"`, ...) forced to fail
    pub failing: HashSet<String>,
}

impl MemoryState {
    fn check(&self, operation: &str) -> RepoResult<()> {
        if self.failing.contains(operation) {
            return Err(RepoError::internal(format!("injected failure in {operation}")));
        }
        Ok(())
    }

    pub fn live_refresh_tokens(&self, user_id: &UserId) -> Vec<&RefreshToken> {
        let now = Utc::now();
        self.refresh_tokens
            .values()
            .filter(|token| &token.user_id == user_id && token.is_live_at(now))
            .collect()
    }
}

/// Shared in-memory store. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect or seed the state outside of any unit of work.
    pub async fn with_state<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> R {
        let mut state = self.state.lock().await;
        f(&mut state)
    }

    pub fn transaction_manager(&self) -> MemoryTransactionManager {
        MemoryTransactionManager::new(self.clone())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    snapshot: Option<MemoryState>,
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

type TxSlot = Arc<Mutex<Option<MemoryTx>>>;

#[derive(Clone)]
enum MemoryHandle {
    Store(Arc<Mutex<MemoryState>>),
    Tx(TxSlot),
}

impl MemoryHandle {
    async fn with<R, F>(&self, f: F) -> RepoResult<R>
    where
        F: FnOnce(&mut MemoryState) -> RepoResult<R> + Send,
        R: Send,
    {
        match self {
            MemoryHandle::Store(state) => {
                let mut state = state.lock().await;
                f(&mut state)
            }
            MemoryHandle::Tx(slot) => {
                let mut slot = slot.lock().await;
                let tx = slot
                    .as_mut()
                    .ok_or_else(|| RepoError::internal("Transaction already finished"))?;
                f(&mut tx.guard)
            }
        }
    }

    fn repositories(self) -> Repositories {
        Repositories {
            users: Arc::new(MemoryUserRepository { handle: self.clone() }),
            refresh_tokens: Arc::new(MemoryRefreshTokenRepository { handle: self.clone() }),
            email_tokens: Arc::new(MemoryEmailTokenRepository { handle: self }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryTransactionManager {
    store: MemoryStore,
    timeout: Option<Duration>,
}

impl MemoryTransactionManager {
    pub fn new(store: MemoryStore) -> Self {
        Self { store, timeout: None }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl TransactionManager for MemoryTransactionManager {
    fn repositories(&self) -> Repositories {
        MemoryHandle::Store(self.store.state.clone()).repositories()
    }

    async fn begin(&self) -> RepoResult<Box<dyn UnitOfWork>> {
        let guard = self.store.state.clone().lock_owned().await;
        let snapshot = guard.clone();
        let tx = MemoryTx { guard, snapshot: Some(snapshot) };
        Ok(Box::new(MemoryUnitOfWork { slot: Arc::new(Mutex::new(Some(tx))) }))
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

pub struct MemoryUnitOfWork {
    slot: TxSlot,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    fn repositories(&self) -> Repositories {
        MemoryHandle::Tx(self.slot.clone()).repositories()
    }

    async fn commit(&mut self) -> RepoResult<()> {
        let mut tx = self
            .slot
            .lock()
            .await
            .take()
            .ok_or_else(|| RepoError::internal("Transaction already finished"))?;
        tx.guard.check("commit")?;
        tx.snapshot = None;
        Ok(())
    }

    async fn rollback(&mut self) -> RepoResult<()> {
        // Dropping the transaction restores the snapshot.
        self.slot
            .lock()
            .await
            .take()
            .map(drop)
            .ok_or_else(|| RepoError::internal("Transaction already finished"))
    }
}

struct MemoryUserRepository {
    handle: MemoryHandle,
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, user: NewUser) -> RepoResult<UserId> {
        self.handle
            .with(move |state| {
                state.check("users.create")?;
                if state.users.contains_key(&user.id)
                    || state.users.values().any(|existing| existing.email == user.email)
                {
                    return Err(RepoError::Conflict);
                }
                let now = Utc::now();
                let id = user.id.clone();
                state.users.insert(
                    user.id.clone(),
                    User {
                        id: user.id,
                        email: user.email,
                        password_hash: user.password_hash,
                        verified_at: user.verified_at,
                        created_at: now,
                        updated_at: now,
                    },
                );
                Ok(id)
            })
            .await
    }

    async fn get_by_email(&self, email: &str) -> RepoResult<User> {
        let email = email.to_string();
        self.handle
            .with(move |state| {
                state.check("users.get_by_email")?;
                state
                    .users
                    .values()
                    .find(|user| user.email == email)
                    .cloned()
                    .ok_or(RepoError::NotFound)
            })
            .await
    }

    async fn get_by_id(&self, id: &UserId) -> RepoResult<User> {
        let id = id.clone();
        self.handle
            .with(move |state| {
                state.check("users.get_by_id")?;
                state.users.get(&id).cloned().ok_or(RepoError::NotFound)
            })
            .await
    }

    async fn update(&self, id: &UserId, update: UpdateUser) -> RepoResult<()> {
        let id = id.clone();
        self.handle
            .with(move |state| {
                state.check("users.update")?;
                let user = state.users.get_mut(&id).ok_or(RepoError::NotFound)?;
                if let Some(hash) = update.password_hash {
                    user.password_hash = hash;
                }
                if let Some(at) = update.verified_at {
                    user.verified_at = Some(at);
                }
                user.updated_at = Utc::now();
                Ok(())
            })
            .await
    }

    async fn get_ids_by_emails(&self, emails: &[String]) -> RepoResult<Vec<UserIdByEmail>> {
        let emails: HashSet<String> = emails.iter().cloned().collect();
        self.handle
            .with(move |state| {
                state.check("users.get_ids_by_emails")?;
                let mut found: Vec<UserIdByEmail> = state
                    .users
                    .values()
                    .filter(|user| emails.contains(&user.email))
                    .map(|user| UserIdByEmail { email: user.email.clone(), id: user.id.clone() })
                    .collect();
                found.sort_by(|a, b| a.email.cmp(&b.email));
                Ok(found)
            })
            .await
    }
}

struct MemoryRefreshTokenRepository {
    handle: MemoryHandle,
}

#[async_trait]
impl RefreshTokenRepository for MemoryRefreshTokenRepository {
    async fn create(&self, token: NewRefreshToken) -> RepoResult<()> {
        self.handle
            .with(move |state| {
                state.check("refresh_tokens.create")?;
                if state.refresh_tokens.contains_key(&token.id) {
                    return Err(RepoError::Conflict);
                }
                if !state.users.contains_key(&token.user_id) {
                    return Err(RepoError::NotFound);
                }
                state.refresh_tokens.insert(
                    token.id.clone(),
                    RefreshToken {
                        id: token.id,
                        user_id: token.user_id,
                        created_at: token.created_at,
                        expired_at: token.expired_at,
                        revoked_at: None,
                    },
                );
                Ok(())
            })
            .await
    }

    async fn get_by_id(&self, id: &RefreshTokenId, user_id: &UserId) -> RepoResult<RefreshToken> {
        let (id, user_id) = (id.clone(), user_id.clone());
        self.handle
            .with(move |state| {
                state.check("refresh_tokens.get_by_id")?;
                state
                    .refresh_tokens
                    .get(&id)
                    .filter(|token| token.user_id == user_id)
                    .cloned()
                    .ok_or(RepoError::NotFound)
            })
            .await
    }

    async fn revoke(&self, id: &RefreshTokenId) -> RepoResult<()> {
        let id = id.clone();
        self.handle
            .with(move |state| {
                state.check("refresh_tokens.revoke")?;
                match state.refresh_tokens.get_mut(&id) {
                    Some(token) if token.revoked_at.is_none() => {
                        token.revoked_at = Some(Utc::now());
                        Ok(())
                    }
                    _ => Err(RepoError::NotFound),
                }
            })
            .await
    }

    async fn revoke_all_users_tokens(&self, user_id: &UserId) -> RepoResult<u64> {
        let user_id = user_id.clone();
        self.handle
            .with(move |state| {
                state.check("refresh_tokens.revoke_all_users_tokens")?;
                let now = Utc::now();
                let mut revoked = 0;
                for token in state.refresh_tokens.values_mut() {
                    if token.user_id == user_id && token.is_live_at(now) {
                        token.revoked_at = Some(now);
                        revoked += 1;
                    }
                }
                Ok(revoked)
            })
            .await
    }

    async fn delete_revoked_and_old_tokens(&self, older_than_days: i64) -> RepoResult<u64> {
        self.handle
            .with(move |state| {
                state.check("refresh_tokens.delete_revoked_and_old_tokens")?;
                let cutoff = retention_cutoff(Utc::now(), older_than_days);
                let before = state.refresh_tokens.len();
                state.refresh_tokens.retain(|_, token| {
                    !(token.revoked_at.is_some_and(|at| at < cutoff) || token.expired_at < cutoff)
                });
                Ok((before - state.refresh_tokens.len()) as u64)
            })
            .await
    }
}

struct MemoryEmailTokenRepository {
    handle: MemoryHandle,
}

#[async_trait]
impl EmailTokenRepository for MemoryEmailTokenRepository {
    async fn create(&self, token: NewEmailToken) -> RepoResult<()> {
        self.handle
            .with(move |state| {
                state.check("email_tokens.create")?;
                if state.email_tokens.contains_key(&token.id) {
                    return Err(RepoError::Conflict);
                }
                if !state.users.contains_key(&token.user_id) {
                    return Err(RepoError::NotFound);
                }
                state.email_tokens.insert(
                    token.id.clone(),
                    EmailToken {
                        id: token.id,
                        user_id: token.user_id,
                        purpose: token.purpose,
                        created_at: token.created_at,
                        expired_at: token.expired_at,
                        used_at: None,
                    },
                );
                Ok(())
            })
            .await
    }

    async fn get_by_id(&self, id: &EmailTokenId) -> RepoResult<EmailToken> {
        let id = id.clone();
        self.handle
            .with(move |state| {
                state.check("email_tokens.get_by_id")?;
                state.email_tokens.get(&id).cloned().ok_or(RepoError::NotFound)
            })
            .await
    }

    async fn use_token(&self, id: &EmailTokenId) -> RepoResult<()> {
        let id = id.clone();
        self.handle
            .with(move |state| {
                state.check("email_tokens.use_token")?;
                match state.email_tokens.get_mut(&id) {
                    Some(token) if token.used_at.is_none() => {
                        token.used_at = Some(Utc::now());
                        Ok(())
                    }
                    _ => Err(RepoError::NotFound),
                }
            })
            .await
    }

    async fn delete_used_and_old_tokens(&self, older_than_days: i64) -> RepoResult<u64> {
        self.handle
            .with(move |state| {
                state.check("email_tokens.delete_used_and_old_tokens")?;
                let cutoff = retention_cutoff(Utc::now(), older_than_days);
                let before = state.email_tokens.len();
                state.email_tokens.retain(|_, token| {
                    !(token.used_at.is_some_and(|at| at < cutoff) || token.expired_at < cutoff)
                });
                Ok((before - state.email_tokens.len()) as u64)
            })
            .await
    }
}
