use credence::auth::validation::LoginRequest;
use credence::ErrorKind;

use crate::support::{setup_test_app, PASSWORD};

#[tokio::test]
async fn login_issues_a_session_and_stores_its_refresh_token() {
    let app = setup_test_app();
    let user_id = app.seed_user("ada@example.com", true).await;

    let session = app.login("ada@example.com").await;

    assert_eq!(session.user_id, user_id);
    assert_ne!(session.access_token, session.refresh_token);
    assert!(session.refresh_expires_at > session.access_expires_at);
    assert_eq!(app.workflow.authenticate(&session.access_token).await.expect("auth"), user_id);
    assert_eq!(app.live_sessions(&user_id).await, 1);
}

#[tokio::test]
async fn login_matches_email_case_insensitively() {
    let app = setup_test_app();
    let user_id = app.seed_user("ada@example.com", true).await;

    let session = app
        .workflow
        .login(LoginRequest::new("  Ada@Example.COM ", PASSWORD))
        .await
        .expect("login with mixed case");
    assert_eq!(session.user_id, user_id);
}

#[tokio::test]
async fn unverified_user_cannot_log_in() {
    let app = setup_test_app();
    let user_id = app.seed_user("new@example.com", false).await;

    let err = app
        .workflow
        .login(LoginRequest::new("new@example.com", PASSWORD))
        .await
        .expect_err("unverified login must fail");

    assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
    assert_eq!(err.message(), "user is unverified");
    assert_eq!(app.live_sessions(&user_id).await, 0);
}

#[tokio::test]
async fn wrong_password_and_unknown_user_are_indistinguishable() {
    let app = setup_test_app();
    app.seed_user("ada@example.com", true).await;

    let wrong_password = app
        .workflow
        .login(LoginRequest::new("ada@example.com", "not-the-password"))
        .await
        .expect_err("wrong password");
    let unknown_user = app
        .workflow
        .login(LoginRequest::new("nobody@example.com", PASSWORD))
        .await
        .expect_err("unknown user");

    assert_eq!(wrong_password.kind(), ErrorKind::InvalidCredentials);
    assert_eq!(unknown_user.kind(), ErrorKind::InvalidCredentials);
    assert_eq!(wrong_password.public_message(), unknown_user.public_message());
    assert_eq!(app.refresh_token_count().await, 0);
}

#[tokio::test]
async fn wrong_password_is_checked_before_verification_state() {
    let app = setup_test_app();
    app.seed_user("new@example.com", false).await;

    let err = app
        .workflow
        .login(LoginRequest::new("new@example.com", "not-the-password"))
        .await
        .expect_err("wrong password");
    assert_eq!(err.message(), "invalid email or password");
}

#[tokio::test]
async fn blank_credentials_are_a_validation_error() {
    let app = setup_test_app();

    let err = app.workflow.login(LoginRequest::new("", "")).await.expect_err("blank credentials");
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn storage_failure_during_login_is_internal() {
    let app = setup_test_app();
    app.seed_user("ada@example.com", true).await;
    app.fail("refresh_tokens.create").await;

    let err = app
        .workflow
        .login(LoginRequest::new("ada@example.com", PASSWORD))
        .await
        .expect_err("storage failure");
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(err.public_message(), "internal server error");
}
