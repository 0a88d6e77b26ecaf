//! Server-rendered chat page.
//!
//! `GET /` without a `session_id` starts a new conversation and redirects to
//! it, so every rendered page is bound to exactly one transcript.

use std::sync::Arc;

use axum::extract::{Form, Query, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use chatrelay_core::{Message, RelayError, SessionId};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ServerError, relay_status};
use crate::state::AppState;
use crate::templates;

/// Client-safe error shown above a re-rendered form.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBanner {
    pub code: &'static str,
    pub message: String,
}

impl From<&RelayError> for ErrorBanner {
    fn from(e: &RelayError) -> Self {
        Self { code: e.code(), message: e.client_message() }
    }
}

#[derive(Serialize)]
struct ChatView<'a> {
    session_id: String,
    messages: &'a [Message],
    error: Option<ErrorBanner>,
    ws_path: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatForm {
    session_id: String,
    user_input: String,
}

/// Register the chat page routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(chat_page).post(submit_chat))
}

/// `GET /`
pub async fn chat_page(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChatQuery>,
) -> Result<Response, ServerError> {
    let Some(raw) = query.session_id else {
        let id = state.store.create().await;
        info!(session_id = %id, "session created for page visit");
        return Ok(Redirect::to(&format!("/?session_id={id}")).into_response());
    };
    let id: SessionId = raw.parse()?;
    state.store.open(&id).await;
    Ok(render_chat(&state, &id, None).await?.into_response())
}

/// `POST /`: one blocking completion, then re-render.
pub async fn submit_chat(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ChatForm>,
) -> Result<Response, ServerError> {
    let id: SessionId = form.session_id.parse()?;
    state.store.open(&id).await;

    match state.relay.complete_turn(&id, &form.user_input).await {
        Ok(_) => Ok(render_chat(&state, &id, None).await?.into_response()),
        Err(e) => {
            warn!(session_id = %id, code = e.code(), error = %e, "chat form turn failed");
            let page = render_chat(&state, &id, Some(ErrorBanner::from(&e))).await?;
            Ok((relay_status(&e), page).into_response())
        }
    }
}

async fn render_chat(
    state: &AppState,
    id: &SessionId,
    error: Option<ErrorBanner>,
) -> Result<Html<String>, ServerError> {
    let messages = state.store.snapshot(id).await?;
    let view = ChatView { session_id: id.to_string(), messages: &messages, error, ws_path: "/ws" };
    Ok(Html(state.templates.render(templates::CHAT, view)?))
}
