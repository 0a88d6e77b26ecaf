//! JSON session API.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chatrelay_core::SessionId;
use tracing::info;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::session::{MessageResponse, SessionResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(create_session, list_session_messages),
    components(schemas(SessionResponse, MessageResponse))
)]
pub struct SessionApi;

/// Register session routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}/messages", get(list_session_messages))
}

/// Start a new conversation seeded with the system prompt.
#[utoipa::path(
    post,
    path = "/api/sessions",
    tag = "sessions",
    responses(
        (status = 201, description = "Session created", body = SessionResponse),
    )
)]
pub async fn create_session(State(state): State<Arc<AppState>>) -> (StatusCode, Json<SessionResponse>) {
    let id = state.store.create().await;
    info!(session_id = %id, "session created via API");
    (StatusCode::CREATED, Json(id.into()))
}

/// Ordered transcript of one session, system prompt included.
#[utoipa::path(
    get,
    path = "/api/sessions/{id}/messages",
    tag = "sessions",
    params(("id" = String, Path, description = "Session id (UUID)")),
    responses(
        (status = 200, description = "Session messages retrieved", body = Vec<MessageResponse>),
        (status = 400, description = "Malformed session id"),
        (status = 404, description = "Unknown session"),
    )
)]
pub async fn list_session_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MessageResponse>>, ServerError> {
    let id: SessionId = id.parse()?;
    let messages = state
        .store
        .snapshot(&id)
        .await
        .map_err(|_| ServerError::NotFound(format!("session {id} not found")))?;
    Ok(Json(
        messages
            .into_iter()
            .enumerate()
            .map(|(index, m)| MessageResponse::from_indexed(index, m))
            .collect(),
    ))
}
