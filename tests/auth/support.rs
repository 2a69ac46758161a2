#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use credence::auth::models::{NewUser, SessionTokens, User};
use credence::auth::validation::LoginRequest;
use credence::auth::{
    Argon2PasswordService, AuthWorkflow, JwtTokenService, PasswordService, WorkflowSettings,
};
use credence::domain::UserId;
use credence::notifications::{NotificationRepository, RecordingNotifier};
use credence::storage::{MemoryStore, MemoryTransactionManager, TransactionManager};

pub const PASSWORD: &str = "correct-horse-battery";
pub const ACCESS_SECRET: &[u8] = b"integration-access-secret-0123456789";
pub const REFRESH_SECRET: &[u8] = b"integration-refresh-secret-0123456789";

pub struct TestApp {
    pub store: MemoryStore,
    pub notifier: Arc<RecordingNotifier>,
    pub tokens: Arc<JwtTokenService>,
    pub workflow: AuthWorkflow,
}

impl TestApp {
    /// Insert a user whose password is [`PASSWORD`].
    pub async fn seed_user(&self, email: &str, verified: bool) -> UserId {
        let password_hash =
            Argon2PasswordService::new().hash_password(PASSWORD).expect("hash seed password");
        self.store
            .transaction_manager()
            .repositories()
            .users
            .create(NewUser {
                id: UserId::new(),
                email: email.to_string(),
                password_hash,
                verified_at: verified.then(Utc::now),
            })
            .await
            .expect("seed user")
    }

    pub async fn login(&self, email: &str) -> SessionTokens {
        self.workflow.login(LoginRequest::new(email, PASSWORD)).await.expect("login")
    }

    pub async fn user(&self, email: &str) -> Option<User> {
        self.store.transaction_manager().repositories().users.get_by_email(email).await.ok()
    }

    pub async fn live_sessions(&self, user_id: &UserId) -> usize {
        self.store.with_state(|state| state.live_refresh_tokens(user_id).len()).await
    }

    pub async fn refresh_token_count(&self) -> usize {
        self.store.with_state(|state| state.refresh_tokens.len()).await
    }

    pub async fn email_token_count(&self) -> usize {
        self.store.with_state(|state| state.email_tokens.len()).await
    }

    /// Make the named storage operation fail from now on.
    pub async fn fail(&self, operation: &str) {
        let operation = operation.to_string();
        self.store
            .with_state(move |state| {
                state.failing.insert(operation);
            })
            .await;
    }

    /// Move every stored email token's expiry into the past.
    pub async fn expire_email_tokens(&self) {
        let past = Utc::now() - Duration::minutes(1);
        self.store
            .with_state(move |state| {
                for token in state.email_tokens.values_mut() {
                    token.expired_at = past;
                }
            })
            .await;
    }

    /// Move every stored refresh token's expiry into the past.
    pub async fn expire_refresh_tokens(&self) {
        let past = Utc::now() - Duration::minutes(1);
        self.store
            .with_state(move |state| {
                for token in state.refresh_tokens.values_mut() {
                    token.expired_at = past;
                }
            })
            .await;
    }
}

pub fn token_service() -> JwtTokenService {
    JwtTokenService::new(ACCESS_SECRET, REFRESH_SECRET, Duration::minutes(15), Duration::days(30))
}

pub fn setup_test_app() -> TestApp {
    let store = MemoryStore::new();
    let manager = store.transaction_manager();
    let recorder = Arc::new(RecordingNotifier::new());
    build(store, manager, recorder.clone(), recorder)
}

/// Build the workflow over a custom transaction manager and notifier. The
/// app's `notifier` recorder then stays empty.
pub fn setup_with(
    store: MemoryStore,
    manager: MemoryTransactionManager,
    notifier: Arc<dyn NotificationRepository>,
) -> TestApp {
    build(store, manager, Arc::new(RecordingNotifier::new()), notifier)
}

fn build(
    store: MemoryStore,
    manager: MemoryTransactionManager,
    recorder: Arc<RecordingNotifier>,
    notifier: Arc<dyn NotificationRepository>,
) -> TestApp {
    let tokens = Arc::new(token_service());
    let workflow = AuthWorkflow::new(
        Arc::new(manager),
        tokens.clone(),
        Arc::new(Argon2PasswordService::new()),
        notifier,
        WorkflowSettings::default(),
    );
    TestApp { store, notifier: recorder, tokens, workflow }
}
