use credence::ErrorKind;
use proptest::prelude::*;

use crate::support::setup_test_app;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn rotation_keeps_exactly_one_live_token(rotations in 1usize..8) {
        let live = tokio_test::block_on(async {
            let app = setup_test_app();
            let user_id = app.seed_user("ada@example.com", true).await;
            let mut session = app.login("ada@example.com").await;
            for _ in 0..rotations {
                session = app.workflow.refresh(&session.refresh_token).await.expect("rotate");
            }
            app.live_sessions(&user_id).await
        });
        prop_assert_eq!(live, 1);
    }

    #[test]
    fn replaying_any_ancestor_kills_the_lineage(rotations in 1usize..6, pick in 0usize..6) {
        let (kind, live) = tokio_test::block_on(async {
            let app = setup_test_app();
            let user_id = app.seed_user("ada@example.com", true).await;
            let mut lineage = vec![app.login("ada@example.com").await.refresh_token];
            for _ in 0..rotations {
                let last = lineage.last().expect("lineage").clone();
                let next = app.workflow.refresh(&last).await.expect("rotate");
                lineage.push(next.refresh_token);
            }

            let ancestor = &lineage[pick % rotations];
            let err = app.workflow.refresh(ancestor).await.expect_err("replay");
            (err.kind(), app.live_sessions(&user_id).await)
        });
        prop_assert_eq!(kind, ErrorKind::Unauthorized);
        prop_assert_eq!(live, 0);
    }
}
