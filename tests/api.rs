use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use futures::future::BoxFuture;
use serde_json::{Value, json};
use tower::ServiceExt;

use sabre_logger_back::{
    config::AppConfig,
    dao::match_store::memory::MemoryMatchStore,
    routes,
    services::{
        completion::{CompletionClient, CompletionError, CompletionRequest},
        identity::{AuthenticatedUser, IdentityError, IdentityProvider, SessionTokens},
    },
    state::{AppState, SharedState},
};

const ALICE: &str = "token-alice";
const BOB: &str = "token-bob";

struct StubIdentity;

impl IdentityProvider for StubIdentity {
    fn authorize_url(&self, redirect_to: &str, code_challenge: &str) -> Result<String, IdentityError> {
        Ok(format!(
            "https://auth.test/authorize?redirect_to={redirect_to}&code_challenge={code_challenge}"
        ))
    }

    fn exchange_code(
        &self,
        _code: String,
        _code_verifier: String,
    ) -> BoxFuture<'static, Result<SessionTokens, IdentityError>> {
        Box::pin(async { Err(IdentityError::InvalidToken) })
    }

    fn resolve_user(
        &self,
        access_token: String,
    ) -> BoxFuture<'static, Result<AuthenticatedUser, IdentityError>> {
        Box::pin(async move {
            match access_token.as_str() {
                ALICE => Ok(AuthenticatedUser {
                    id: "alice".into(),
                    email: Some("alice@example.com".into()),
                }),
                BOB => Ok(AuthenticatedUser {
                    id: "bob".into(),
                    email: None,
                }),
                _ => Err(IdentityError::InvalidToken),
            }
        })
    }

    fn sign_out(&self, _access_token: String) -> BoxFuture<'static, Result<(), IdentityError>> {
        Box::pin(async { Ok(()) })
    }
}

#[derive(Default)]
struct StubCompletion {
    calls: AtomicUsize,
}

impl CompletionClient for StubCompletion {
    fn complete_json(
        &self,
        _request: CompletionRequest,
    ) -> BoxFuture<'static, Result<String, CompletionError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async {
            Ok(r#"{"summary":"Strong at 4m","detail":"Counter-attacks land","action_plan":"Drill parries"}"#.to_owned())
        })
    }
}

struct TestApp {
    router: Router,
    state: SharedState,
    completion: Arc<StubCompletion>,
}

async fn test_app() -> TestApp {
    let completion = Arc::new(StubCompletion::default());
    let state = AppState::new(
        AppConfig::default(),
        Some(Arc::new(StubIdentity)),
        Some(completion.clone()),
    );
    state
        .set_match_store(Arc::new(MemoryMatchStore::new()))
        .await;

    TestApp {
        router: routes::router(state.clone()),
        state,
        completion,
    }
}

impl TestApp {
    async fn call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn create_match(&self, token: &str) -> String {
        let (status, body) = self
            .call(
                "POST",
                "/matches",
                Some(token),
                Some(json!({ "opponent_name": "Dubois", "my_color": "red" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"]["id"].as_str().unwrap().to_owned()
    }

    async fn add_point(&self, match_id: &str, scorer: &str, before: (u32, u32)) -> StatusCode {
        let (status, _) = self
            .call(
                "POST",
                &format!("/matches/{match_id}/points"),
                Some(ALICE),
                Some(json!({
                    "scorer": scorer,
                    "situation": "four_metre",
                    "phrase": "counter_attack",
                    "score_me_at_time": before.0,
                    "score_opponent_at_time": before.1,
                })),
            )
            .await;
        status
    }

    async fn score(&self, match_id: &str) -> (u64, u64) {
        let (status, body) = self
            .call("GET", &format!("/matches/{match_id}"), Some(ALICE), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let score = &body["data"]["score"];
        (
            score["me"].as_u64().unwrap(),
            score["opponent"].as_u64().unwrap(),
        )
    }
}

#[tokio::test]
async fn healthcheck_reports_ok_with_store() {
    let app = test_app().await;
    let (status, body) = app.call("GET", "/healthcheck", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn requests_without_valid_token_are_rejected() {
    let app = test_app().await;

    let (status, body) = app.call("GET", "/matches", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = app.call("GET", "/matches", Some("forged"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn point_added_to_new_match_is_tallied() {
    let app = test_app().await;
    let match_id = app.create_match(ALICE).await;

    assert_eq!(app.add_point(&match_id, "me", (0, 0)).await, StatusCode::CREATED);
    assert_eq!(app.score(&match_id).await, (1, 0));
}

#[tokio::test]
async fn score_snapshots_never_go_down_within_a_match() {
    let app = test_app().await;
    let match_id = app.create_match(ALICE).await;
    assert_eq!(app.add_point(&match_id, "me", (0, 0)).await, StatusCode::CREATED);
    assert_eq!(app.add_point(&match_id, "me", (1, 0)).await, StatusCode::CREATED);

    assert_eq!(
        app.add_point(&match_id, "me", (0, 0)).await,
        StatusCode::BAD_REQUEST
    );

    let (_, body) = app
        .call("GET", &format!("/matches/{match_id}/points"), Some(ALICE), None)
        .await;
    let snapshots: Vec<u64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|point| point["score_me_at_time"].as_u64().unwrap())
        .collect();
    assert_eq!(snapshots, vec![0, 1]);
    assert_eq!(app.score(&match_id).await, (2, 0));
}

#[tokio::test]
async fn deleting_latest_point_reverts_the_tally() {
    let app = test_app().await;
    let match_id = app.create_match(ALICE).await;
    app.add_point(&match_id, "me", (0, 0)).await;
    app.add_point(&match_id, "opponent", (1, 0)).await;
    assert_eq!(app.score(&match_id).await, (1, 1));

    let (status, body) = app
        .call(
            "DELETE",
            &format!("/matches/{match_id}/points/latest"),
            Some(ALICE),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["scorer"], "opponent");
    assert_eq!(app.score(&match_id).await, (1, 0));
}

#[tokio::test]
async fn phrase_outside_situation_is_rejected_without_side_effects() {
    let app = test_app().await;
    let match_id = app.create_match(ALICE).await;

    let (status, body) = app
        .call(
            "POST",
            &format!("/matches/{match_id}/points"),
            Some(ALICE),
            Some(json!({
                "scorer": "me",
                "situation": "four_metre",
                "phrase": "stop_cut",
                "score_me_at_time": 0,
                "score_opponent_at_time": 0,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("stop_cut"));

    let (_, body) = app
        .call("GET", &format!("/matches/{match_id}/points"), Some(ALICE), None)
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn coaching_without_points_never_calls_completion() {
    let app = test_app().await;
    app.create_match(ALICE).await;

    let (status, body) = app.call("POST", "/coach/report", Some(ALICE), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "no data to analyze");
    assert_eq!(app.completion.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn coaching_report_is_generated_and_cached() {
    let app = test_app().await;
    let match_id = app.create_match(ALICE).await;
    app.add_point(&match_id, "me", (0, 0)).await;

    let (status, _) = app.call("GET", "/coach/report", Some(ALICE), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.call("POST", "/coach/report", Some(ALICE), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["summary"], "Strong at 4m");
    assert_eq!(body["data"]["point_count"], 1);
    assert_eq!(app.completion.calls.load(Ordering::SeqCst), 1);

    let (status, body) = app.call("GET", "/coach/report", Some(ALICE), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["action_plan"], "Drill parries");

    let (status, _) = app.call("GET", "/coach/report", Some(BOB), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn finalized_score_wins_over_later_points() {
    let app = test_app().await;
    let match_id = app.create_match(ALICE).await;

    let (status, body) = app
        .call(
            "PUT",
            &format!("/matches/{match_id}/score"),
            Some(ALICE),
            Some(json!({ "score_me": 5, "score_opponent": 3 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["finalized"], true);

    app.add_point(&match_id, "opponent", (0, 0)).await;
    assert_eq!(app.score(&match_id).await, (5, 3));

    let (_, body) = app.call("GET", "/matches", Some(ALICE), None).await;
    assert_eq!(body["data"][0]["score"]["me"], 5);
    assert_eq!(body["data"][0]["score"]["opponent"], 3);
}

#[tokio::test]
async fn other_users_matches_look_missing() {
    let app = test_app().await;
    let match_id = app.create_match(ALICE).await;

    let (status, _) = app
        .call("GET", &format!("/matches/{match_id}"), Some(BOB), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call("DELETE", &format!("/matches/{match_id}"), Some(BOB), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app.call("GET", "/matches", Some(BOB), None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn blank_opponent_is_a_validation_error() {
    let app = test_app().await;
    let (status, _) = app
        .call(
            "POST",
            "/matches",
            Some(ALICE),
            Some(json!({ "opponent_name": "   ", "my_color": "red" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn live_session_records_and_undoes_touches() {
    let app = test_app().await;
    let match_id = app.create_match(ALICE).await;
    let session = format!("/matches/{match_id}/session");

    let (status, body) = app.call("POST", &session, Some(ALICE), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["phase"], "idle");

    let (_, body) = app
        .call(
            "POST",
            &format!("{session}/tap"),
            Some(ALICE),
            Some(json!({ "color": "green" })),
        )
        .await;
    assert_eq!(body["data"]["phase"], "classifying");
    assert_eq!(body["data"]["capture"]["scorer"], "opponent");

    app.call(
        "POST",
        &format!("{session}/situation"),
        Some(ALICE),
        Some(json!({ "situation": "defence_after_four_metre" })),
    )
    .await;
    let (status, _) = app
        .call(
            "POST",
            &format!("{session}/phrase"),
            Some(ALICE),
            Some(json!({ "phrase": "point_in_line" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    app.call(
        "POST",
        &format!("{session}/phrase"),
        Some(ALICE),
        Some(json!({ "phrase": "stop_cut" })),
    )
    .await;

    let (status, body) = app
        .call("POST", &format!("{session}/save"), Some(ALICE), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["phase"], "idle");
    assert_eq!(body["data"]["score"]["opponent"], 1);
    assert_eq!(body["data"]["last_scored"], "opponent");
    assert_eq!(app.score(&match_id).await, (0, 1));

    let (status, _) = app
        .call("POST", &format!("{session}/confirm"), Some(ALICE), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    app.call(
        "POST",
        &format!("{session}/confirm-request"),
        Some(ALICE),
        Some(json!({ "action": "undo" })),
    )
    .await;
    let (status, body) = app
        .call("POST", &format!("{session}/confirm"), Some(ALICE), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["score"]["opponent"], 0);
    assert_eq!(app.score(&match_id).await, (0, 0));

    let (status, _) = app.call("DELETE", &session, Some(ALICE), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(app.state.sessions().is_empty());
}

#[tokio::test]
async fn ending_a_session_finalizes_the_match() {
    let app = test_app().await;
    let match_id = app.create_match(ALICE).await;
    let session = format!("/matches/{match_id}/session");
    app.add_point(&match_id, "me", (0, 0)).await;

    let (_, body) = app.call("POST", &session, Some(ALICE), None).await;
    assert_eq!(body["data"]["score"]["me"], 1);

    app.call(
        "POST",
        &format!("{session}/confirm-request"),
        Some(ALICE),
        Some(json!({ "action": "end" })),
    )
    .await;
    let (status, body) = app
        .call("POST", &format!("{session}/confirm"), Some(ALICE), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["phase"], "ended");

    let (_, body) = app
        .call("GET", &format!("/matches/{match_id}"), Some(ALICE), None)
        .await;
    assert_eq!(body["data"]["finalized"], true);

    let (status, _) = app.call("GET", &session, Some(ALICE), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn taxonomy_lists_phrases_per_situation() {
    let app = test_app().await;
    let (status, body) = app.call("GET", "/taxonomy", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let situations = body["data"]["situations"].as_array().unwrap();
    assert_eq!(situations.len(), 3);
    assert_eq!(situations[0]["id"], "four_metre");
    assert_eq!(situations[0]["phrases"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn login_redirects_to_provider_with_verifier_cookie() {
    let app = test_app().await;
    let request = Request::builder()
        .uri("/auth/login?next=/matches")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("https://auth.test/authorize"));
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("sabre_pkce="));
}
