#[cfg(test)]
mod tests {
    use rocket::tokio;

    use crate::error::AppError;
    use crate::models::Identity;
    use crate::session::{ExamSession, Phase, ProctorEvent, SessionRegistry, Tick};
    use crate::store::{Loaded, keys, load_record, write_record};
    use crate::test::utils::test_utils::memory_store;

    fn jane() -> Identity {
        Identity {
            display_name: "Jane Doe".to_string(),
            roll: "CS002".to_string(),
        }
    }

    #[test]
    fn countdown_decreases_by_one_and_never_goes_negative() {
        let mut session = ExamSession::start(jane(), 5);
        assert_eq!(session.phase(), Phase::Active);

        for expected in (1..5).rev() {
            assert_eq!(
                session.tick(),
                Tick::Running {
                    seconds_remaining: expected
                }
            );
            assert_eq!(session.seconds_remaining(), expected);
        }

        // The tick that reaches zero moves the session to Submitting.
        assert_eq!(session.tick(), Tick::Expired);
        assert_eq!(session.seconds_remaining(), 0);
        assert_eq!(session.phase(), Phase::Submitting);

        // Late ticks are ignored; remaining time stays at exactly zero.
        assert_eq!(session.tick(), Tick::Ignored);
        assert_eq!(session.seconds_remaining(), 0);
    }

    #[test]
    fn submission_is_idempotent() {
        let mut session = ExamSession::start(jane(), 2);
        let mut rng = rand::rng();

        assert_eq!(session.tick(), Tick::Running { seconds_remaining: 1 });
        assert_eq!(session.tick(), Tick::Expired);

        let first = session.submit(&mut rng);
        assert!(first.is_some(), "Expired session must produce a result");
        assert_eq!(session.phase(), Phase::Terminal);

        // A second timeout tick or submit call must not create a second
        // result record.
        assert_eq!(session.tick(), Tick::Ignored);
        assert!(session.submit(&mut rng).is_none());
    }

    #[test]
    fn manual_submit_from_active_reaches_terminal() {
        let mut session = ExamSession::start(jane(), 3600);
        let mut rng = rand::rng();

        let record = session.submit(&mut rng).expect("active session submits");
        assert_eq!(record.roll, "CS002");
        assert_eq!(record.display_name, "Jane Doe");
        assert_eq!(session.phase(), Phase::Terminal);
    }

    #[test]
    fn synthetic_scores_stay_in_range() {
        let mut rng = rand::rng();

        for _ in 0..200 {
            let record = crate::session::synthesize_result(&jane(), &mut rng);
            assert!((55..100).contains(&record.score));
            assert!((50..100).contains(&record.speed));
            assert!((60..100).contains(&record.efficiency));
            assert!(record.rank() >= 1);
        }
    }

    #[test]
    fn proctor_events_count_warnings_but_never_fail_the_session() {
        let mut session = ExamSession::start(jane(), 60);

        let advisory = session.record_event(ProctorEvent::TabHidden);
        assert!(advisory.contains("Tab switching detected"));
        session.record_event(ProctorEvent::BlockedShortcut);
        assert_eq!(session.warnings(), 2);

        // A failed lockdown request is logged, not counted.
        session.record_event(ProctorEvent::FullscreenDenied);
        assert_eq!(session.warnings(), 2);
        assert!(!session.snapshot().locked_down);
        assert_eq!(session.phase(), Phase::Active);
    }

    #[tokio::test]
    async fn registry_rejects_zero_duration() {
        let registry = SessionRegistry::new();

        let result = registry.start_session(jane(), 0).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn full_hour_exam_auto_submits_and_persists() {
        let registry = SessionRegistry::new();
        let store = memory_store();

        registry
            .start_session(jane(), 3600)
            .await
            .expect("session starts");
        assert_eq!(registry.active_count().await, 1);

        for second in 0..3599 {
            let finished = registry.tick_all().await;
            assert!(
                finished.is_empty(),
                "Session finished early at second {second}"
            );
        }

        let finished = registry.tick_all().await;
        assert_eq!(finished.len(), 1, "Session must expire on the 3600th tick");

        let record = &finished[0];
        assert_eq!(record.roll, "CS002");

        write_record(store.as_ref(), keys::EXAM_RESULTS, record)
            .await
            .expect("result persists");

        let loaded = load_record::<crate::models::ResultRecord>(store.as_ref(), keys::EXAM_RESULTS)
            .await
            .expect("read back");
        match loaded {
            Loaded::Valid(stored) => assert_eq!(stored.roll, "CS002"),
            other => panic!("Expected stored result record, got {other:?}"),
        }

        let snapshot = registry.snapshot("CS002").await.expect("session snapshot");
        assert_eq!(snapshot.phase, Phase::Terminal);
        assert_eq!(snapshot.seconds_remaining, 0);

        // Further ticks must not produce another record.
        assert!(registry.tick_all().await.is_empty());

        assert_eq!(registry.reap_terminal().await, 1);
        assert!(registry.snapshot("CS002").await.is_none());
    }

    #[tokio::test]
    async fn starting_again_replaces_the_previous_attempt() {
        let registry = SessionRegistry::new();

        let first = registry.start_session(jane(), 10).await.expect("first");
        registry.tick_all().await;
        registry.start_session(jane(), 20).await.expect("second");

        let snapshot = registry.snapshot("CS002").await.expect("snapshot");
        assert_eq!(snapshot.seconds_remaining, 20);
        assert_eq!(snapshot.warnings, 0);
        assert_ne!(snapshot.attempt_id, first.attempt_id);
    }
}
