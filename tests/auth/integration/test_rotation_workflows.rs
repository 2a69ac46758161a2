use credence::ErrorKind;

use crate::support::setup_test_app;

#[tokio::test]
async fn refresh_rotates_the_pair_and_revokes_the_old_token() {
    let app = setup_test_app();
    let user_id = app.seed_user("ada@example.com", true).await;
    let first = app.login("ada@example.com").await;

    let second = app.workflow.refresh(&first.refresh_token).await.expect("refresh");

    assert_eq!(second.user_id, user_id);
    assert_ne!(second.refresh_token, first.refresh_token);
    assert_eq!(app.live_sessions(&user_id).await, 1);
    assert_eq!(app.refresh_token_count().await, 2);

    let third = app.workflow.refresh(&second.refresh_token).await.expect("refresh again");
    assert_eq!(third.user_id, user_id);
    assert_eq!(app.live_sessions(&user_id).await, 1);
}

#[tokio::test]
async fn replaying_a_rotated_token_revokes_every_session() {
    let app = setup_test_app();
    let user_id = app.seed_user("ada@example.com", true).await;
    let laptop = app.login("ada@example.com").await;
    let phone = app.login("ada@example.com").await;
    let rotated = app.workflow.refresh(&laptop.refresh_token).await.expect("refresh");
    assert_eq!(app.live_sessions(&user_id).await, 2);

    let err = app.workflow.refresh(&laptop.refresh_token).await.expect_err("replay must fail");

    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(err.message(), "refresh token was revoked, all user tokens was revoked");
    assert_eq!(err.meta("revoked_count").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(app.live_sessions(&user_id).await, 0);

    for raw in [&rotated.refresh_token, &phone.refresh_token] {
        let err = app.workflow.refresh(raw).await.expect_err("sibling sessions are gone");
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }
}

#[tokio::test]
async fn expired_refresh_record_is_rejected_without_revocation() {
    let app = setup_test_app();
    let user_id = app.seed_user("ada@example.com", true).await;
    let session = app.login("ada@example.com").await;
    app.expire_refresh_tokens().await;

    let err = app.workflow.refresh(&session.refresh_token).await.expect_err("expired");

    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(err.message(), "refresh token is expired");
    assert_eq!(app.refresh_token_count().await, 1);
    assert_eq!(app.live_sessions(&user_id).await, 0);
}

#[tokio::test]
async fn malformed_and_foreign_tokens_are_unauthorized() {
    let app = setup_test_app();
    app.seed_user("ada@example.com", true).await;
    let session = app.login("ada@example.com").await;

    for raw in ["", "not-a-jwt", session.access_token.as_str()] {
        let err = app.workflow.refresh(raw).await.expect_err("bad token");
        assert_eq!(err.kind(), ErrorKind::Unauthorized, "token {raw:?}");
    }
}

#[tokio::test]
async fn refresh_token_with_no_stored_record_is_unauthorized() {
    let app = setup_test_app();
    let user_id = app.seed_user("ada@example.com", true).await;
    let session = app.login("ada@example.com").await;
    app.store.with_state(|state| state.refresh_tokens.clear()).await;

    let err = app.workflow.refresh(&session.refresh_token).await.expect_err("unknown record");
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(err.message(), "refresh token not found");
    assert_eq!(app.live_sessions(&user_id).await, 0);
}

#[tokio::test]
async fn failed_revocation_rolls_back_the_new_token() {
    let app = setup_test_app();
    let user_id = app.seed_user("ada@example.com", true).await;
    let session = app.login("ada@example.com").await;
    app.fail("refresh_tokens.revoke").await;

    let err = app.workflow.refresh(&session.refresh_token).await.expect_err("revoke fails");

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(app.refresh_token_count().await, 1);
    assert_eq!(app.live_sessions(&user_id).await, 1);
}

#[tokio::test]
async fn access_token_is_rejected_once_tampered() {
    let app = setup_test_app();
    app.seed_user("ada@example.com", true).await;
    let session = app.login("ada@example.com").await;

    let mut tampered = session.access_token.clone();
    tampered.push('x');
    let err = app.workflow.authenticate(&tampered).await.expect_err("tampered");
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    let err = app.workflow.authenticate(&session.refresh_token).await.expect_err("refresh as access");
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_refreshes_of_one_token_rotate_at_most_once() {
    let app = setup_test_app();
    app.seed_user("ada@example.com", true).await;
    let session = app.login("ada@example.com").await;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let workflow = app.workflow.clone();
            let raw = session.refresh_token.clone();
            tokio::spawn(async move { workflow.refresh(&raw).await })
        })
        .collect();

    let mut rotated = 0;
    for handle in handles {
        match handle.await.expect("refresh task") {
            Ok(_) => rotated += 1,
            Err(err) => assert_eq!(err.kind(), ErrorKind::Unauthorized),
        }
    }
    assert!(rotated <= 1, "{rotated} refreshes of one token succeeded");
}
