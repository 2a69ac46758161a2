use credence::auth::validation::{EmailRequest, LoginRequest, ResetPasswordRequest};
use credence::ErrorKind;

use crate::support::{setup_test_app, TestApp, PASSWORD};

const NEW_PASSWORD: &str = "a-brand-new-passphrase";

fn reset(token: &str, new_password: &str) -> ResetPasswordRequest {
    ResetPasswordRequest { token: token.to_string(), new_password: new_password.to_string() }
}

async fn request_reset(app: &TestApp, email: &str) -> String {
    app.workflow
        .send_password_reset_email(EmailRequest::new(email))
        .await
        .expect("send reset email");
    app.notifier.last_token_for(email).expect("reset token").into_string()
}

#[tokio::test]
async fn reset_replaces_the_password_and_ends_every_session() {
    let app = setup_test_app();
    let user_id = app.seed_user("ada@example.com", true).await;
    let session = app.login("ada@example.com").await;
    app.login("ada@example.com").await;

    let token = request_reset(&app, "ada@example.com").await;
    app.workflow.reset_password(reset(&token, NEW_PASSWORD)).await.expect("reset");

    assert_eq!(app.live_sessions(&user_id).await, 0);
    let err = app.workflow.refresh(&session.refresh_token).await.expect_err("old session");
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    let err = app
        .workflow
        .login(LoginRequest::new("ada@example.com", PASSWORD))
        .await
        .expect_err("old password");
    assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
    app.workflow
        .login(LoginRequest::new("ada@example.com", NEW_PASSWORD))
        .await
        .expect("new password");
}

#[tokio::test]
async fn reset_email_for_unknown_address_is_a_soft_success() {
    let app = setup_test_app();

    let err = app
        .workflow
        .send_password_reset_email(EmailRequest::new("nobody@example.com"))
        .await
        .expect_err("soft success");

    assert!(err.is_soft_success());
    assert!(app.notifier.sent().is_empty());
    assert_eq!(app.email_token_count().await, 0);
}

#[tokio::test]
async fn expired_reset_token_changes_nothing() {
    let app = setup_test_app();
    let user_id = app.seed_user("ada@example.com", true).await;
    app.login("ada@example.com").await;
    let token = request_reset(&app, "ada@example.com").await;
    app.expire_email_tokens().await;

    let err = app.workflow.reset_password(reset(&token, NEW_PASSWORD)).await.expect_err("expired");

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.message(), "email token is expired");
    assert_eq!(app.live_sessions(&user_id).await, 1);
    app.workflow
        .login(LoginRequest::new("ada@example.com", PASSWORD))
        .await
        .expect("old password still works");
}

#[tokio::test]
async fn reset_token_is_single_use() {
    let app = setup_test_app();
    app.seed_user("ada@example.com", true).await;
    let token = request_reset(&app, "ada@example.com").await;

    app.workflow.reset_password(reset(&token, NEW_PASSWORD)).await.expect("first reset");
    let err = app
        .workflow
        .reset_password(reset(&token, "yet-another-passphrase"))
        .await
        .expect_err("second reset");

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.message(), "email token is already used");
}

#[tokio::test]
async fn verification_token_cannot_reset_a_password() {
    let app = setup_test_app();
    app.workflow
        .register(credence::auth::validation::RegisterRequest::new("ada@example.com", PASSWORD))
        .await
        .expect("register");
    let verify_token = app.notifier.last_token_for("ada@example.com").expect("token");

    let err = app
        .workflow
        .reset_password(reset(verify_token.as_str(), NEW_PASSWORD))
        .await
        .expect_err("wrong purpose");
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.message(), "email token not found");
}

#[tokio::test]
async fn failed_session_revocation_rolls_back_the_reset() {
    let app = setup_test_app();
    app.seed_user("ada@example.com", true).await;
    let token = request_reset(&app, "ada@example.com").await;
    app.fail("refresh_tokens.revoke_all_users_tokens").await;

    let err = app.workflow.reset_password(reset(&token, NEW_PASSWORD)).await.expect_err("fails");
    assert_eq!(err.kind(), ErrorKind::Internal);

    app.workflow
        .login(LoginRequest::new("ada@example.com", PASSWORD))
        .await
        .expect("password unchanged");
    let unused = app
        .store
        .with_state(|state| state.email_tokens.values().all(|token| token.used_at.is_none()))
        .await;
    assert!(unused);
}

#[tokio::test]
async fn weak_new_password_is_rejected() {
    let app = setup_test_app();
    app.seed_user("ada@example.com", true).await;
    let token = request_reset(&app, "ada@example.com").await;

    let err = app.workflow.reset_password(reset(&token, "short")).await.expect_err("weak");
    assert_eq!(err.kind(), ErrorKind::Validation);
}
