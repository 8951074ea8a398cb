#[cfg(test)]
mod tests {
    use rocket::http::{ContentType, Status};
    use serde_json::{Value, json};
    use serial_test::serial;

    use crate::api::{
        AnalysisResponse, ExamStartResponse, ExecuteResponse, LeaderboardResponse, LoginResponse,
        ProctorEventResponse, SubmitResponse,
    };
    use crate::auth::verify_admin_code;
    use crate::executor::FALLBACK_OUTPUT;
    use crate::models::ResultRecord;
    use crate::session::{Phase, SessionSnapshot};
    use crate::store::{keys, write_record};
    use crate::test::utils::test_utils::{
        login_test_admin, login_test_student, setup_test_client, sqlite_store,
    };

    #[rocket::async_test]
    async fn test_login_api() {
        let store = sqlite_store().await;
        let (client, _) = setup_test_client(store).await;

        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(json!({ "name": "Jane Doe", "roll": "CS002" }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.unwrap();
        let login_response: LoginResponse = serde_json::from_str(&body).unwrap();

        assert!(login_response.success);
        assert_eq!(login_response.identity.unwrap().roll, "CS002");
        assert_eq!(login_response.redirect_url.as_deref(), Some("/exam"));
    }

    #[rocket::async_test]
    async fn test_login_rejects_malformed_roll() {
        let store = sqlite_store().await;
        let (client, _) = setup_test_client(store).await;

        for roll in ["", "002", "CS", "CS-002", "C999999"] {
            let response = client
                .post("/api/login")
                .header(ContentType::JSON)
                .body(json!({ "name": "Jane Doe", "roll": roll }).to_string())
                .dispatch()
                .await;

            assert_eq!(
                response.status(),
                Status::UnprocessableEntity,
                "Roll {roll:?} should have failed validation"
            );
        }
    }

    #[rocket::async_test]
    async fn test_auth_required_apis() {
        let store = sqlite_store().await;
        let (client, _) = setup_test_client(store).await;

        let gets = vec!["/api/me", "/api/exam/state", "/api/exam/progress", "/api/analysis"];
        for endpoint in gets {
            let response = client.get(endpoint).dispatch().await;
            assert_eq!(
                response.status(),
                Status::Unauthorized,
                "Endpoint {} did not require authentication",
                endpoint
            );
        }

        let response = client.post("/api/exam/start").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);

        let response = client.get("/api/admin/results").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn test_unauthorized_catcher_points_at_login() {
        let store = sqlite_store().await;
        let (client, _) = setup_test_client(store).await;

        let response = client.get("/api/me").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);

        let body: Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(body["redirect_url"], "/login");
    }

    #[rocket::async_test]
    async fn test_exam_lifecycle() {
        let store = sqlite_store().await;
        let (client, _) = setup_test_client(store).await;
        login_test_student(&client, "Jane Doe", "CS002").await;

        // Start the attempt.
        let response = client.post("/api/exam/start").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let start: ExamStartResponse =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(start.phase, "active");
        assert_eq!(start.duration_secs, 3600);
        assert_eq!(start.questions.len(), 3);

        // The live state mirrors the start response.
        let response = client.get("/api/exam/state").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let state: SessionSnapshot =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(state.phase, Phase::Active);
        assert_eq!(state.seconds_remaining, 3600);
        assert_eq!(state.warnings, 0);

        // Autosave and read the work back.
        let progress = json!({
            "current_question": 2,
            "code": "def is_palindrome(s):\n    return s == s[::-1]\n",
            "language": "python",
            "seconds_remaining": 3180
        });
        let response = client
            .post("/api/exam/save")
            .header(ContentType::JSON)
            .body(progress.to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let response = client.get("/api/exam/progress").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let saved: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(saved["current_question"], 2);
        assert_eq!(saved["language"], "python");

        // A proctoring signal produces an advisory but never ends the exam.
        let response = client
            .post("/api/exam/event")
            .header(ContentType::JSON)
            .body(json!({ "event": "tab_hidden" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let event: ProctorEventResponse =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(event.warnings, 1);
        assert!(event.advisory.contains("Tab switching"));

        // Submit once.
        let response = client.post("/api/exam/submit").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let submit: SubmitResponse =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(!submit.already_submitted);
        assert_eq!(submit.redirect_url, "/analysis");
        assert_eq!(submit.result.roll, "CS002");

        // Submitting again surfaces the stored record instead of a new one.
        let response = client.post("/api/exam/submit").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let again: SubmitResponse =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(again.already_submitted);
        assert_eq!(again.result.score, submit.result.score);

        // Analysis reads the same record.
        let response = client.get("/api/analysis").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let analysis: AnalysisResponse =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(analysis.result.score, submit.result.score);
        assert_eq!(analysis.rank, submit.result.rank());
    }

    #[rocket::async_test]
    async fn test_timeout_race_resolves_to_stored_record() {
        let store = sqlite_store().await;
        let (client, registry) = setup_test_client(store.clone()).await;
        login_test_student(&client, "Jane Doe", "CS002").await;

        let response = client.post("/api/exam/start").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        // Run the countdown to expiry the way the background task would,
        // persisting each finished attempt.
        let mut persisted = 0;
        for _ in 0..3600 {
            for record in registry.tick_all().await {
                write_record(store.as_ref(), keys::EXAM_RESULTS, &record)
                    .await
                    .unwrap();
                persisted += 1;
            }
        }
        assert_eq!(persisted, 1);

        // A submit that arrives after the timeout gets the stored record.
        let response = client.post("/api/exam/submit").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let submit: SubmitResponse =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(submit.already_submitted);
        assert_eq!(submit.result.roll, "CS002");
    }

    #[rocket::async_test]
    async fn test_exam_state_without_session_is_not_found() {
        let store = sqlite_store().await;
        let (client, _) = setup_test_client(store).await;
        login_test_student(&client, "Jane Doe", "CS002").await;

        let response = client.get("/api/exam/state").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_execute_api_falls_back_to_demo_output() {
        let store = sqlite_store().await;
        let (client, _) = setup_test_client(store).await;

        let response = client
            .post("/api/execute")
            .header(ContentType::JSON)
            .body(
                json!({
                    "language": "python",
                    "source": { "name": "main.py", "content": "print(\"Hello World\")" },
                    "expected_output": "Hello World"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);
        let execute: ExecuteResponse =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(execute.fallback);
        assert_eq!(execute.output, FALLBACK_OUTPUT);
        assert_eq!(execute.expected_matched, Some(true));
    }

    #[rocket::async_test]
    async fn test_terminal_api() {
        let store = sqlite_store().await;
        let (client, _) = setup_test_client(store).await;

        let response = client
            .post("/api/terminal")
            .header(ContentType::JSON)
            .body(
                json!({
                    "input": "ls",
                    "files": ["main.py", "notes.txt"],
                    "active_file": "main.py"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);
        let reply: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(reply["output"], "main.py  notes.txt\n");
        assert_eq!(reply["cleared"], false);
    }

    #[rocket::async_test]
    async fn test_leaderboard_api() {
        let store = sqlite_store().await;
        let (client, _) = setup_test_client(store.clone()).await;
        login_test_student(&client, "Jane Doe", "CS002").await;

        let response = client.get("/api/leaderboard").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let board: LeaderboardResponse =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();

        assert_eq!(board.board.len(), 12);
        assert!(board.current_user.is_none());
        for window in board.board.windows(2) {
            assert!(window[0].score >= window[1].score);
        }
        for (index, entry) in board.board.iter().enumerate() {
            assert_eq!(entry.rank, index as u32 + 1);
        }

        // Once a result exists the student appears alongside the board.
        client.post("/api/exam/start").dispatch().await;
        let response = client.post("/api/exam/submit").dispatch().await;
        let submit: SubmitResponse =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();

        let response = client.get("/api/leaderboard").dispatch().await;
        let board: LeaderboardResponse =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        let current = board.current_user.expect("current user on the board");
        assert_eq!(current.roll, "CS002");
        assert_eq!(current.score, submit.result.score);
    }

    #[rocket::async_test]
    async fn test_logout_clears_the_session_cookie() {
        let store = sqlite_store().await;
        let (client, _) = setup_test_client(store).await;
        login_test_student(&client, "Jane Doe", "CS002").await;

        let response = client.get("/api/me").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let response = client.post("/api/logout").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let response = client.get("/api/me").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    #[serial]
    async fn test_admin_login_and_results() {
        let store = sqlite_store().await;
        let (client, registry) = setup_test_client(store.clone()).await;

        // Wrong code is rejected without a cookie being set.
        let response = client
            .post("/api/admin/login")
            .header(ContentType::JSON)
            .body(json!({ "roll": "NOTANADMIN1" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let login: LoginResponse =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(!login.success);

        let response = client.get("/api/admin/results").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);

        // The default demo code works when no hash is configured.
        login_test_admin(&client, "ADMIN123").await;

        // Seed one finished attempt for the listing.
        login_test_student(&client, "Jane Doe", "CS002").await;
        client.post("/api/exam/start").dispatch().await;
        client.post("/api/exam/submit").dispatch().await;
        assert_eq!(registry.active_count().await, 0);

        let response = client.get("/api/admin/results").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let results: Vec<ResultRecord> =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].roll, "CS002");

        // Clearing wipes results and any saved progress.
        let response = client.delete("/api/admin/records").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let response = client.get("/api/admin/results").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let results: Vec<ResultRecord> =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    #[serial]
    fn test_admin_code_verification_against_hash() {
        let hash = bcrypt::hash("SECRET42", 4).unwrap();

        temp_env::with_var("ADMIN_CODE_HASH", Some(hash.as_str()), || {
            assert!(verify_admin_code("SECRET42").unwrap());
            assert!(!verify_admin_code("ADMIN123").unwrap());
        });

        temp_env::with_var_unset("ADMIN_CODE_HASH", || {
            assert!(verify_admin_code("ADMIN123").unwrap());
            assert!(!verify_admin_code("SECRET42").unwrap());
        });
    }

    #[rocket::async_test]
    async fn test_questions_languages_and_health() {
        let store = sqlite_store().await;
        let (client, _) = setup_test_client(store).await;

        let response = client.get("/api/questions").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let questions: Vec<Value> =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0]["title"], "Array Sum Problem");

        let response = client.get("/api/languages").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let languages: Vec<Value> =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(languages.len(), 6);
        assert!(languages.iter().any(|l| l["value"] == "python"));

        let response = client.get("/api/health").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_string().await.unwrap(), "OK");
    }
}
