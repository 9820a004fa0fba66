pub mod admin;
pub mod auth;
pub mod error;
pub mod sessions;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// - **public**: liveness and agent availability, no auth, no budget;
/// - **budgeted**: handshake and execute, behind the admission gate and a
///   client credential;
/// - **client**: status, close and transcript reads, credential only;
/// - **admin**: everything under `/admin`, gated by `AdminGuard`.
///
/// `state` is needed to wire up the admission middleware at build time.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/health", get(admin::health))
        .route("/available", get(admin::available));

    let handshake = Router::new()
        .route("/handshake", post(sessions::handshake))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::admit_handshake,
        ));

    let execute = Router::new()
        .route("/execute", post(sessions::execute))
        .route_layer(middleware::from_fn_with_state(state, auth::admit_execute));

    let client = Router::new()
        .route("/status/:session_id", get(sessions::status))
        .route("/close", post(sessions::close))
        .route("/sessions", get(sessions::list_sessions))
        .route("/sessions/:session_id/messages", get(sessions::messages));

    let admin = Router::new()
        .route("/admin/logs", get(admin::logs))
        .route("/admin/stats", get(admin::stats))
        .route("/admin/ratelimit/stats", get(admin::ratelimit_stats))
        .route("/admin/ratelimit/reset", post(admin::ratelimit_reset))
        .route("/admin/tokens/generate", post(admin::generate_token))
        .route("/admin/tokens/validate", post(admin::validate_token))
        .route("/admin/tokens/revoke", post(admin::revoke_token));

    public
        .merge(handshake)
        .merge(execute)
        .merge(client)
        .merge(admin)
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{header, Request, StatusCode};
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use cr_domain::config::Config;
    use cr_executor::{AgentRunner, Availability, ExecutionResult, ExitClass, RunOptions};
    use cr_sessions::SqliteTranscriptStore;

    use super::*;
    use crate::bootstrap::build_app_state_with;
    use crate::credentials::{Scope, TokenSigner};

    const ADMIN_TOKEN: &str = "static-admin-token";

    struct EchoRunner;

    #[async_trait]
    impl AgentRunner for EchoRunner {
        async fn run(
            &self,
            prompt: &str,
            _opts: &RunOptions,
            _cancel: &CancellationToken,
        ) -> ExecutionResult {
            ExecutionResult {
                output: format!("done: {prompt}"),
                exit: ExitClass::Success,
                error: None,
                exit_code: Some(0),
                duration: Duration::from_millis(5),
            }
        }

        fn probe(&self) -> Availability {
            Availability {
                available: true,
                binary: None,
                candidates: vec!["claude".into()],
            }
        }
    }

    fn test_state(max_requests: u32) -> AppState {
        let mut config = Config::default();
        config.admission.max_requests = max_requests;
        test_state_with(config)
    }

    fn test_state_with(config: Config) -> AppState {
        let tokens = Arc::new(TokenSigner::new("test-secret").unwrap());
        let mut state = build_app_state_with(
            Arc::new(config),
            "test.toml".into(),
            tokens,
            Arc::new(EchoRunner),
            Arc::new(SqliteTranscriptStore::open_in_memory().unwrap()),
        )
        .unwrap();
        state.admin_token_hash = Some(
            <sha2::Sha256 as sha2::Digest>::digest(ADMIN_TOKEN.as_bytes()).to_vec(),
        );
        state
    }

    fn client_token(state: &AppState, client: &str) -> String {
        state
            .tokens
            .issue(client, Scope::Client, chrono::Duration::hours(1))
            .unwrap()
            .0
    }

    fn request(
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> Request<Body> {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        let mut req = match body {
            Some(b) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 10], 40000))));
        req
    }

    async fn dispatch(
        state: &AppState,
        req: Request<Body>,
    ) -> (StatusCode, axum::http::HeaderMap, serde_json::Value) {
        let app = router(state.clone()).with_state(state.clone());
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, headers, json)
    }

    async fn send(
        state: &AppState,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, axum::http::HeaderMap, serde_json::Value) {
        dispatch(state, request(method, uri, token, body)).await
    }

    #[tokio::test]
    async fn health_needs_no_credential() {
        let state = test_state(5);
        let (status, _, body) = send(&state, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, _, body) = send(&state, "GET", "/available", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["available"], true);
    }

    #[tokio::test]
    async fn missing_credential_is_401_with_error_shape() {
        let state = test_state(5);
        let (status, _, body) = send(&state, "POST", "/handshake", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["type"], "authentication_error");
        assert!(body["error"]["message"].is_string());

        let (status, _, _) =
            send(&state, "GET", "/status/abc", Some("cr-garbage.sig"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let state = test_state(5);
        let token = client_token(&state, "alice");

        let (status, _, opened) = send(&state, "POST", "/handshake", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(opened["client_id"], "alice");
        let sid = opened["session_id"].as_str().unwrap().to_owned();

        let (status, _, ran) = send(
            &state,
            "POST",
            "/execute",
            Some(&token),
            Some(serde_json::json!({ "session_id": sid, "prompt": "fix the build" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ran["exit"], "success");
        assert_eq!(ran["message"]["content"], "done: fix the build");

        let (status, _, snap) =
            send(&state, "GET", &format!("/status/{sid}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snap["busy"], false);
        assert_eq!(snap["recent_messages"].as_array().unwrap().len(), 2);

        let (status, _, listed) = send(&state, "GET", "/sessions", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed["count"], 1);

        let (status, _, closed) = send(
            &state,
            "POST",
            "/close",
            Some(&token),
            Some(serde_json::json!({ "session_id": sid })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(closed["closed"], true);

        let (status, _, body) =
            send(&state, "GET", &format!("/status/{sid}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["type"], "not_found_error");

        // Closing again is fine.
        let (status, _, closed) = send(
            &state,
            "POST",
            "/close",
            Some(&token),
            Some(serde_json::json!({ "session_id": sid })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(closed["closed"], false);
    }

    #[tokio::test]
    async fn other_clients_cannot_see_a_session() {
        let state = test_state(5);
        let alice = client_token(&state, "alice");
        let bob = client_token(&state, "bob");

        let (_, _, opened) = send(&state, "POST", "/handshake", Some(&alice), None).await;
        let sid = opened["session_id"].as_str().unwrap();

        let (status, _, _) =
            send(&state, "GET", &format!("/status/{sid}"), Some(&bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn execute_rejects_bad_bodies() {
        let state = test_state(5);
        let token = client_token(&state, "alice");

        let (status, _, body) = send(
            &state,
            "POST",
            "/execute",
            Some(&token),
            Some(serde_json::json!({ "prompt": "no session" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "invalid_request_error");

        let (status, _, _) = send(
            &state,
            "POST",
            "/execute",
            Some(&token),
            Some(serde_json::json!({ "session_id": "nope", "prompt": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn handshake_budget_applies_before_credentials() {
        let state = test_state(2);
        let token = client_token(&state, "alice");

        for _ in 0..2 {
            let (status, _, _) = send(&state, "POST", "/handshake", Some(&token), None).await;
            assert_eq!(status, StatusCode::OK);
        }
        // Over budget: refused even without a credential.
        let (status, headers, body) = send(&state, "POST", "/handshake", None, None).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["type"], "rate_limit_error");
        assert!(headers.contains_key(header::RETRY_AFTER));

        // Status is never budgeted.
        let (status, _, _) = send(&state, "GET", "/sessions", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, logs) = send(
            &state,
            "GET",
            "/admin/logs?action=rate_limited",
            Some(ADMIN_TOKEN),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(logs["total"], 1);
    }

    #[tokio::test]
    async fn rotating_forwarded_for_does_not_reset_the_budget() {
        let state = test_state(2);
        let token = client_token(&state, "alice");

        let mut admitted = 0;
        for i in 0..10 {
            let mut req = request("POST", "/handshake", Some(&token), None);
            req.headers_mut().insert(
                "x-forwarded-for",
                format!("10.9.9.{i}").parse().unwrap(),
            );
            let (status, _, _) = dispatch(&state, req).await;
            if status == StatusCode::OK {
                admitted += 1;
            } else {
                assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
            }
        }
        assert_eq!(admitted, 2);
    }

    #[tokio::test]
    async fn forwarded_for_is_the_identity_behind_a_trusted_proxy() {
        let mut config = Config::default();
        config.admission.max_requests = 1;
        config.server.trust_proxy_headers = true;
        let state = test_state_with(config);
        let token = client_token(&state, "alice");

        for ip in ["10.9.9.1", "10.9.9.2"] {
            let mut req = request("POST", "/handshake", Some(&token), None);
            req.headers_mut()
                .insert("x-forwarded-for", ip.parse().unwrap());
            let (status, _, _) = dispatch(&state, req).await;
            assert_eq!(status, StatusCode::OK);
        }

        let mut req = request("POST", "/handshake", Some(&token), None);
        req.headers_mut()
            .insert("x-forwarded-for", "10.9.9.1".parse().unwrap());
        let (status, _, _) = dispatch(&state, req).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn admin_surface_requires_admin_scope() {
        let state = test_state(5);
        let token = client_token(&state, "alice");

        let (status, _, body) = send(&state, "GET", "/admin/stats", Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["type"], "permission_error");

        let (status, _, _) = send(&state, "GET", "/admin/stats", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _, _) = send(&state, "GET", "/admin/stats", Some(ADMIN_TOKEN), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn issued_credentials_can_be_revoked() {
        let state = test_state(5);

        let (status, _, issued) = send(
            &state,
            "POST",
            "/admin/tokens/generate",
            Some(ADMIN_TOKEN),
            Some(serde_json::json!({ "client_id": "ci-bot" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(issued["scope"], "client");
        let token = issued["token"].as_str().unwrap().to_owned();

        let (status, _, _) = send(&state, "GET", "/sessions", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, _) = send(
            &state,
            "POST",
            "/admin/tokens/revoke",
            Some(ADMIN_TOKEN),
            Some(serde_json::json!({ "token": token })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, _) = send(&state, "GET", "/sessions", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (_, _, checked) = send(
            &state,
            "POST",
            "/admin/tokens/validate",
            Some(ADMIN_TOKEN),
            Some(serde_json::json!({ "token": token })),
        )
        .await;
        assert_eq!(checked["valid"], false);
    }

    #[tokio::test]
    async fn token_ttl_past_the_calendar_is_a_bad_request() {
        let state = test_state(5);
        let (status, _, body) = send(
            &state,
            "POST",
            "/admin/tokens/generate",
            Some(ADMIN_TOKEN),
            Some(serde_json::json!({ "client_id": "x", "ttl_hours": u32::MAX })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "invalid_request_error");

        // The service keeps answering afterwards.
        let (status, _, _) = send(&state, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_admin_bodies_use_the_error_envelope() {
        let state = test_state(5);
        let cases = [
            ("/admin/tokens/generate", "{not json"),
            ("/admin/tokens/generate", r#"{"client_id": 5}"#),
            ("/admin/tokens/validate", "[]"),
            ("/admin/tokens/revoke", "{}"),
            ("/admin/ratelimit/reset", "{"),
        ];
        for (uri, raw) in cases {
            let mut req = Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(raw))
                .unwrap();
            req.extensions_mut()
                .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 10], 40000))));
            let (status, _, body) = dispatch(&state, req).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri} {raw}");
            assert_eq!(body["error"]["type"], "invalid_request_error", "{uri} {raw}");
            assert!(body["error"]["message"].is_string());
        }

        // Missing content type is rejected the same way.
        let mut req = Request::builder()
            .method("POST")
            .uri("/admin/tokens/generate")
            .header(header::AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
            .body(Body::from(r#"{"client_id":"x"}"#))
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 10], 40000))));
        let (status, _, body) = dispatch(&state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "invalid_request_error");
    }
}
