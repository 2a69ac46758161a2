use credence::auth::validation::{LoginRequest, ResetPasswordRequest};
use credence::notifications::Notification;
use chrono::{Duration, Utc};
use credence::auth::models::EmailTokenPurpose;
use credence::ErrorKind;

use crate::support::{setup_test_app, PASSWORD};

#[tokio::test]
async fn auto_registered_account_is_verified_but_passwordless() {
    let app = setup_test_app();

    let user_id = app.workflow.auto_register("Invitee@Example.com", "apollo").await.expect("auto");

    let user = app.user("invitee@example.com").await.expect("stored user");
    assert_eq!(user.id, user_id);
    assert!(user.is_verified());

    let token = match app.notifier.sent().as_slice() {
        [Notification::AutoRegister { email, project, token }] => {
            assert_eq!(email, "invitee@example.com");
            assert_eq!(project, "apollo");
            token.clone()
        }
        other => panic!("unexpected notifications {other:?}"),
    };

    for candidate in ["", PASSWORD, user.password_hash.as_str()] {
        let err = app
            .workflow
            .login(LoginRequest::new("invitee@example.com", candidate))
            .await
            .expect_err("no usable password yet");
        assert!(matches!(err.kind(), ErrorKind::InvalidCredentials | ErrorKind::Validation));
    }

    app.workflow
        .reset_password(ResetPasswordRequest {
            token: token.into_string(),
            new_password: PASSWORD.to_string(),
        })
        .await
        .expect("set password through the mailed link");
    app.workflow
        .login(LoginRequest::new("invitee@example.com", PASSWORD))
        .await
        .expect("login with chosen password");
}

#[tokio::test]
async fn auto_register_for_existing_email_is_a_conflict() {
    let app = setup_test_app();
    app.seed_user("ada@example.com", true).await;

    let err = app.workflow.auto_register("ada@example.com", "apollo").await.expect_err("exists");
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(app.notifier.sent().is_empty());
}

#[tokio::test]
async fn auto_register_rolls_back_when_the_email_fails() {
    let app = setup_test_app();
    app.notifier.set_failing(true);

    let err = app.workflow.auto_register("invitee@example.com", "apollo").await.expect_err("fail");

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(app.user("invitee@example.com").await.is_none());
    assert_eq!(app.email_token_count().await, 0);
}

#[tokio::test]
async fn invite_splits_existing_members_from_new_accounts() {
    let app = setup_test_app();
    let existing_id = app.seed_user("ada@example.com", true).await;
    let emails = vec![
        "ADA@example.com".to_string(),
        "grace@example.com".to_string(),
        " Grace@Example.com ".to_string(),
    ];

    let outcome = app.workflow.invite_to_project("apollo", &emails).await.expect("invite");

    assert_eq!(outcome.existing.len(), 1);
    assert_eq!(outcome.existing[0].email, "ada@example.com");
    assert_eq!(outcome.existing[0].user_id, existing_id);
    assert_eq!(outcome.auto_registered.len(), 1);
    assert_eq!(outcome.auto_registered[0].email, "grace@example.com");
    assert_eq!(outcome.user_ids().len(), 2);

    let sent = app.notifier.sent();
    assert!(sent.iter().any(|n| matches!(
        n,
        Notification::Invitation { email, project } if email == "ada@example.com" && project == "apollo"
    )));
    assert!(sent.iter().any(|n| matches!(
        n,
        Notification::AutoRegister { email, .. } if email == "grace@example.com"
    )));
    assert_eq!(sent.len(), 2);
}

#[tokio::test]
async fn invite_rejects_bad_input_before_sending_anything() {
    let app = setup_test_app();

    let err = app
        .workflow
        .invite_to_project("apollo", &["ok@example.com".to_string(), "nope".to_string()])
        .await
        .expect_err("invalid email");
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = app
        .workflow
        .invite_to_project("  ", &["ok@example.com".to_string()])
        .await
        .expect_err("blank project");
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert!(app.notifier.sent().is_empty());
    assert!(app.user("ok@example.com").await.is_none());
}

#[tokio::test]
async fn empty_invite_list_is_a_no_op() {
    let app = setup_test_app();

    let outcome = app.workflow.invite_to_project("apollo", &[]).await.expect("empty invite");
    assert!(outcome.user_ids().is_empty());
    assert!(app.notifier.sent().is_empty());
}

#[tokio::test]
async fn invitee_set_password_link_outlives_a_reset_link() {
    let app = setup_test_app();
    let user_id = app.workflow.auto_register("invitee@example.com", "apollo").await.expect("auto");

    let expiries = app
        .store
        .with_state(move |state| {
            state
                .email_tokens
                .values()
                .filter(|token| token.user_id == user_id)
                .map(|token| (token.purpose, token.expired_at))
                .collect::<Vec<_>>()
        })
        .await;

    match expiries.as_slice() {
        [(EmailTokenPurpose::Reset, expired_at)] => {
            assert!(*expired_at > Utc::now() + Duration::days(2));
        }
        other => panic!("unexpected tokens {other:?}"),
    }
}
