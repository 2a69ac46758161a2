use credence::auth::validation::{ChangePasswordRequest, LoginRequest};
use credence::domain::UserId;
use credence::ErrorKind;

use crate::support::{setup_test_app, PASSWORD};

const NEW_PASSWORD: &str = "a-brand-new-passphrase";

fn change(user_id: &UserId, old: &str, new: &str) -> ChangePasswordRequest {
    ChangePasswordRequest {
        user_id: user_id.clone(),
        old_password: old.to_string(),
        new_password: new.to_string(),
    }
}

#[tokio::test]
async fn change_password_keeps_existing_sessions() {
    let app = setup_test_app();
    let user_id = app.seed_user("ada@example.com", true).await;
    let session = app.login("ada@example.com").await;

    app.workflow.change_password(change(&user_id, PASSWORD, NEW_PASSWORD)).await.expect("change");

    assert_eq!(app.live_sessions(&user_id).await, 1);
    app.workflow.refresh(&session.refresh_token).await.expect("session survives");
    app.workflow
        .login(LoginRequest::new("ada@example.com", NEW_PASSWORD))
        .await
        .expect("new password works");
}

#[tokio::test]
async fn wrong_current_password_is_rejected() {
    let app = setup_test_app();
    let user_id = app.seed_user("ada@example.com", true).await;

    let err = app
        .workflow
        .change_password(change(&user_id, "not-the-password", NEW_PASSWORD))
        .await
        .expect_err("wrong old password");

    assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
    app.workflow
        .login(LoginRequest::new("ada@example.com", PASSWORD))
        .await
        .expect("password unchanged");
}

#[tokio::test]
async fn unknown_user_is_not_found() {
    let app = setup_test_app();

    let err = app
        .workflow
        .change_password(change(&UserId::new(), PASSWORD, NEW_PASSWORD))
        .await
        .expect_err("unknown user");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn weak_new_password_is_a_validation_error() {
    let app = setup_test_app();
    let user_id = app.seed_user("ada@example.com", true).await;

    let err = app
        .workflow
        .change_password(change(&user_id, PASSWORD, "short"))
        .await
        .expect_err("weak password");
    assert_eq!(err.kind(), ErrorKind::Validation);
}
