use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use credence::auth::validation::RegisterRequest;
use credence::domain::EmailTokenId;
use credence::notifications::{NotificationError, NotificationRepository};
use credence::storage::MemoryStore;
use credence::ErrorKind;

use crate::support::{setup_test_app, setup_with, PASSWORD};

/// Accepts every message, but only after a delay.
struct SlowNotifier(Duration);

#[async_trait]
impl NotificationRepository for SlowNotifier {
    async fn send_verification_email(
        &self,
        _email: &str,
        _token: &EmailTokenId,
    ) -> Result<(), NotificationError> {
        tokio::time::sleep(self.0).await;
        Ok(())
    }

    async fn send_reset_password_email(
        &self,
        _email: &str,
        _token: &EmailTokenId,
    ) -> Result<(), NotificationError> {
        tokio::time::sleep(self.0).await;
        Ok(())
    }

    async fn send_auto_register_email(
        &self,
        _email: &str,
        _project: &str,
        _token: &EmailTokenId,
    ) -> Result<(), NotificationError> {
        tokio::time::sleep(self.0).await;
        Ok(())
    }

    async fn send_invitation_in_project(
        &self,
        _email: &str,
        _project: &str,
    ) -> Result<(), NotificationError> {
        tokio::time::sleep(self.0).await;
        Ok(())
    }
}

#[tokio::test]
async fn failed_commit_discards_every_write() {
    let app = setup_test_app();
    app.fail("commit").await;

    let err = app
        .workflow
        .register(RegisterRequest::new("grace@example.com", PASSWORD))
        .await
        .expect_err("commit fails");

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(app.user("grace@example.com").await.is_none());
    assert_eq!(app.email_token_count().await, 0);
}

#[tokio::test]
async fn timed_out_unit_of_work_is_rolled_back() {
    let store = MemoryStore::new();
    let manager = store.transaction_manager().with_timeout(Some(Duration::from_millis(20)));
    let app = setup_with(store, manager, Arc::new(SlowNotifier(Duration::from_millis(500))));

    let err = app
        .workflow
        .register(RegisterRequest::new("grace@example.com", PASSWORD))
        .await
        .expect_err("times out");

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(err.message(), "transaction timed out");
    assert_eq!(err.meta("timeout_ms").and_then(|v| v.as_u64()), Some(20));
    assert!(app.user("grace@example.com").await.is_none());
}

#[tokio::test]
async fn slow_notifier_within_the_limit_commits() {
    let store = MemoryStore::new();
    let manager = store.transaction_manager().with_timeout(Some(Duration::from_secs(5)));
    let app = setup_with(store, manager, Arc::new(SlowNotifier(Duration::from_millis(10))));

    app.workflow
        .register(RegisterRequest::new("grace@example.com", PASSWORD))
        .await
        .expect("register");
    assert!(app.user("grace@example.com").await.is_some());
}
