//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (panic catch-all, CORS, per-request trace-ID injection)
//! - Chat and image pages
//! - `/ws`, `/ws-async`, `/ws-test` socket routes
//! - JSON session API and its OpenAPI document
//! - Optional diagnostics (disable with `CHATRELAY_ENABLE_DIAGNOSTICS=false`)

pub mod diagnostics;
pub mod doc;
mod health;
mod images;
mod pages;
mod sessions;

use std::sync::Arc;

use axum::routing::get;
use axum::{Router, middleware};

use crate::middleware::{cors, panic, trace};
use crate::state::AppState;
use crate::ws;

// ── Router builder ────────────────────────────────────────────────────────────

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .merge(health::router())
        .merge(pages::router())
        .merge(images::router())
        .merge(ws::router())
        .merge(sessions::router())
        .route("/api-docs/openapi.json", get(doc::openapi_json));

    if state.config.enable_diagnostics {
        app = app.merge(diagnostics::router());
    }

    app
        // Outermost layers execute first on the way in.
        .layer(panic::catch_panic_layer())
        .layer(cors::cors_layer(&state.config))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use chatrelay_core::{Message, SessionId, StubUpstream};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::config::{Config, UpstreamKind};
    use crate::state::test_support::state_with;

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, String) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn form(uri: &str, body: String) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_static_regardless_of_store_size() {
        let state = state_with(StubUpstream::echo());
        let app = build(Arc::clone(&state));

        let (status, _, first) = send(&app, get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        for _ in 0..5 {
            let id = state.store.create().await;
            state.relay.complete_turn(&id, "grow the store").await.unwrap();
        }
        let (_, _, second) = send(&app, get_req("/health")).await;
        assert_eq!(first, second);

        let body: Value = serde_json::from_str(&first).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["message"], "Service is running");
    }

    #[tokio::test]
    async fn root_without_session_redirects_to_new_session() {
        let state = state_with(StubUpstream::echo());
        let app = build(Arc::clone(&state));

        let (status, headers, _) = send(&app, get_req("/")).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        let location = headers[header::LOCATION].to_str().unwrap();
        let id: SessionId = location.trim_start_matches("/?session_id=").parse().unwrap();
        assert!(state.store.contains(&id).await);
    }

    #[tokio::test]
    async fn chat_form_appends_turn_and_renders_reply() {
        let state = state_with(StubUpstream::fragments(["Bonjour", "!"]));
        let app = build(Arc::clone(&state));
        let id = state.store.create().await;

        let (status, _, html) = send(&app, form("/", format!("session_id={id}&user_input=salut"))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("Bonjour!"));
        assert_eq!(
            state.store.snapshot(&id).await.unwrap()[1..],
            [Message::user("salut"), Message::assistant("Bonjour!")]
        );
    }

    #[tokio::test]
    async fn chat_form_failure_shows_generic_banner() {
        let state = state_with(StubUpstream::echo().failing_after(0));
        let app = build(Arc::clone(&state));
        let id = state.store.create().await;

        let (status, _, html) = send(&app, form("/", format!("session_id={id}&user_input=hello"))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(html.contains("upstream_error"));
        assert!(!html.contains("stub upstream failure"));
        assert_eq!(state.store.len(&id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn two_sessions_keep_isolated_transcripts() {
        let state = state_with(StubUpstream::echo());
        let app = build(Arc::clone(&state));
        let a = state.store.create().await;
        let b = state.store.create().await;

        send(&app, form("/", format!("session_id={a}&user_input=alpha"))).await;
        send(&app, form("/", format!("session_id={b}&user_input=beta"))).await;

        let (_, _, body) = send(&app, get_req(&format!("/api/sessions/{a}/messages"))).await;
        let messages: Vec<Value> = serde_json::from_str(&body).unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"], "alpha");
        assert_eq!(state.store.len(&b).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn image_page_renders_generated_url() {
        let app = build(state_with(StubUpstream::echo()));
        let (status, _, html) = send(&app, get_req("/image")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!html.contains("<img"));

        let (status, _, html) = send(&app, form("/image", "user_input=a+red+fox".into())).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("<img"));
        assert!(html.contains("placehold.co"));
    }

    #[tokio::test]
    async fn blank_image_prompt_is_rejected_before_upstream() {
        let app = build(state_with(StubUpstream::echo()));
        let (status, _, html) = send(&app, form("/image", "user_input=+++".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(html.contains("invalid_request"));
        assert!(!html.contains("<img"));
    }

    #[tokio::test]
    async fn session_api_lists_messages_and_rejects_bad_ids() {
        let state = state_with(StubUpstream::echo());
        let app = build(Arc::clone(&state));

        let req = Request::post("/api/sessions").body(Body::empty()).unwrap();
        let (status, _, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = serde_json::from_str::<Value>(&body).unwrap()["id"].as_str().unwrap().to_owned();

        let (status, _, body) = send(&app, get_req(&format!("/api/sessions/{id}/messages"))).await;
        assert_eq!(status, StatusCode::OK);
        let messages: Vec<Value> = serde_json::from_str(&body).unwrap();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["index"], 0);

        let (status, _, _) = send(&app, get_req(&format!("/api/sessions/{}/messages", SessionId::new()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = send(&app, get_req("/api/sessions/nope/messages")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn openapi_document_lists_json_endpoints() {
        let app = build(state_with(StubUpstream::echo()));
        let (status, _, body) = send(&app, get_req("/api-docs/openapi.json")).await;
        assert_eq!(status, StatusCode::OK);
        let doc: Value = serde_json::from_str(&body).unwrap();
        assert!(doc["paths"]["/health"].is_object());
        assert!(doc["paths"]["/api/sessions/{id}/messages"].is_object());
    }

    #[tokio::test]
    async fn diagnostics_can_be_disabled() {
        let config = Config { upstream: UpstreamKind::Stub, enable_diagnostics: false, ..Config::default() };
        let stub = Arc::new(StubUpstream::echo());
        let state = Arc::new(AppState::with_upstream(config, stub.clone(), stub).unwrap());
        let app = build(state);

        for path in ["/debug", "/test-templates", "/test-openai"] {
            let (status, _, _) = send(&app, get_req(path)).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
        }
    }

    #[tokio::test]
    async fn trace_id_is_echoed_or_generated() {
        let app = build(state_with(StubUpstream::echo()));

        let (_, headers, _) = send(&app, get_req("/health")).await;
        assert!(headers.contains_key(trace::X_TRACE_ID));

        let id = "6c5e9d1e-2f7a-4a52-9d7e-0d3b0c8f2a11";
        let req = Request::get("/health").header(trace::X_TRACE_ID, id).body(Body::empty()).unwrap();
        let (_, headers, _) = send(&app, req).await;
        assert_eq!(headers[trace::X_TRACE_ID], id);
    }

    async fn boom() -> &'static str {
        panic!("secret detail at /srv/app")
    }

    #[tokio::test]
    async fn panics_become_generic_500() {
        let app: Router = Router::new().route("/boom", get(boom)).layer(panic::catch_panic_layer());

        let (status, _, body) = send(&app, get_req("/boom")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.contains("secret detail"));
        assert!(body.contains("internal server error"));
    }
}
