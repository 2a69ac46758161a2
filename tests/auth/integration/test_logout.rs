use credence::ErrorKind;

use crate::support::setup_test_app;

#[tokio::test]
async fn logout_revokes_only_the_presented_session() {
    let app = setup_test_app();
    let user_id = app.seed_user("ada@example.com", true).await;
    let laptop = app.login("ada@example.com").await;
    let phone = app.login("ada@example.com").await;

    app.workflow.logout(&laptop.refresh_token).await.expect("logout");

    assert_eq!(app.live_sessions(&user_id).await, 1);
    app.workflow.refresh(&phone.refresh_token).await.expect("other session still refreshes");
}

#[tokio::test]
async fn refreshing_after_logout_is_treated_as_reuse() {
    let app = setup_test_app();
    let user_id = app.seed_user("ada@example.com", true).await;
    let laptop = app.login("ada@example.com").await;
    app.login("ada@example.com").await;
    app.workflow.logout(&laptop.refresh_token).await.expect("logout");

    let err = app.workflow.refresh(&laptop.refresh_token).await.expect_err("logged out token");

    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(err.meta("revoked_count").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(app.live_sessions(&user_id).await, 0);
}

#[tokio::test]
async fn logout_with_expired_session_is_unauthorized() {
    let app = setup_test_app();
    app.seed_user("ada@example.com", true).await;
    let session = app.login("ada@example.com").await;
    app.expire_refresh_tokens().await;

    let err = app.workflow.logout(&session.refresh_token).await.expect_err("expired");
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(err.message(), "refresh token is expired");
}

#[tokio::test]
async fn logout_with_garbage_is_unauthorized() {
    let app = setup_test_app();

    let err = app.workflow.logout("garbage").await.expect_err("garbage");
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn logout_with_revoked_token_revokes_every_session() {
    let app = setup_test_app();
    let user_id = app.seed_user("ada@example.com", true).await;
    let laptop = app.login("ada@example.com").await;
    let phone = app.login("ada@example.com").await;
    app.workflow.logout(&laptop.refresh_token).await.expect("logout");

    let err = app.workflow.logout(&laptop.refresh_token).await.expect_err("second logout");

    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(err.message(), "refresh token was revoked, all user tokens was revoked");
    assert_eq!(err.meta("revoked_count").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(app.live_sessions(&user_id).await, 0);
    app.workflow.refresh(&phone.refresh_token).await.expect_err("sibling session is gone");
}

#[tokio::test]
async fn logout_with_rotated_token_revokes_the_successor() {
    let app = setup_test_app();
    let user_id = app.seed_user("ada@example.com", true).await;
    let first = app.login("ada@example.com").await;
    app.workflow.refresh(&first.refresh_token).await.expect("refresh");

    let err = app.workflow.logout(&first.refresh_token).await.expect_err("rotated token");

    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(err.meta("revoked_count").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(app.live_sessions(&user_id).await, 0);
}
