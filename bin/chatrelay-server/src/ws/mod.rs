//! Streaming chat over WebSocket.
//!
//! `/ws`, `/ws-async` and `/ws-test` share one session driver and differ
//! only in their [`RelayStrategy`].  Each connection is bound to the
//! transcript named by its `?session_id=` query parameter.

mod frames;
mod session;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use chatrelay_core::{Relay, SessionId};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{Instrument, debug, info, info_span};

use self::session::InboundFrame;
use crate::error::ServerError;
use crate::state::AppState;

/// How chunk frames are delivered on one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    None,
    /// Sleep after every chunk frame.
    Sleep(Duration),
    /// Yield to the scheduler after every chunk frame.
    Yield,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayStrategy {
    pub name: &'static str,
    pub pacing: Pacing,
    /// Attach the text generated so far to every chunk frame.
    pub include_partial: bool,
}

impl RelayStrategy {
    /// `/ws`: fixed delay between chunks.
    pub fn paced(interval: Duration) -> Self {
        let pacing = if interval.is_zero() { Pacing::None } else { Pacing::Sleep(interval) };
        Self { name: "ws", pacing, include_partial: false }
    }

    /// `/ws-async`: no delay, cooperative yield between chunks.
    pub fn cooperative() -> Self {
        Self { name: "ws-async", pacing: Pacing::Yield, include_partial: false }
    }

    /// `/ws-test`: no pacing, running text on every chunk.
    pub fn diagnostic() -> Self {
        Self { name: "ws-test", pacing: Pacing::None, include_partial: true }
    }

    pub async fn pace(&self) {
        match self.pacing {
            Pacing::None => {}
            Pacing::Sleep(d) => tokio::time::sleep(d).await,
            Pacing::Yield => tokio::task::yield_now().await,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SocketQuery {
    session_id: Option<String>,
}

/// Register the socket routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws", get(ws_paced))
        .route("/ws-async", get(ws_cooperative))
        .route("/ws-test", get(ws_diagnostic))
}

async fn ws_paced(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SocketQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ServerError> {
    let strategy = RelayStrategy::paced(state.config.ws_pacing);
    upgrade(state, query, ws, strategy).await
}

async fn ws_cooperative(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SocketQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ServerError> {
    upgrade(state, query, ws, RelayStrategy::cooperative()).await
}

async fn ws_diagnostic(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SocketQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ServerError> {
    upgrade(state, query, ws, RelayStrategy::diagnostic()).await
}

async fn upgrade(
    state: Arc<AppState>,
    query: SocketQuery,
    ws: WebSocketUpgrade,
    strategy: RelayStrategy,
) -> Result<Response, ServerError> {
    let session = open_session(&state, &query).await?;
    let relay = state.relay.clone();
    debug!(session_id = %session, route = strategy.name, state = "connecting", "socket state");
    Ok(ws.on_upgrade(move |socket| serve_socket(socket, relay, session, strategy)))
}

/// Resolve `?session_id=`, creating the transcript on first use.
async fn open_session(state: &AppState, query: &SocketQuery) -> Result<SessionId, ServerError> {
    let raw = query
        .session_id
        .as_deref()
        .ok_or_else(|| ServerError::BadRequest("session_id query parameter is required".into()))?;
    let session: SessionId = raw.parse()?;
    if state.store.open(&session).await {
        info!(session_id = %session, "session opened by socket");
    }
    Ok(session)
}

async fn serve_socket(socket: WebSocket, relay: Relay, session: SessionId, strategy: RelayStrategy) {
    let span = info_span!("ws_session", session_id = %session, route = strategy.name);
    let (sink, stream) = socket.split();
    let inbound = stream.map(inbound_frame);
    let outbound =
        sink.with(|text: String| futures::future::ready(Ok::<_, axum::Error>(Message::Text(text.into()))));

    async move {
        info!("socket connected");
        session::run(relay, session, strategy, inbound, outbound).await;
        info!("socket disconnected");
    }
    .instrument(span)
    .await
}

fn inbound_frame(message: Result<Message, axum::Error>) -> InboundFrame {
    match message {
        Ok(Message::Text(text)) => InboundFrame::Text(text.as_str().to_owned()),
        Ok(Message::Close(_)) => InboundFrame::Close,
        Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_)) => InboundFrame::Ignored,
        Err(e) => {
            debug!(error = %e, "socket receive failed");
            InboundFrame::Close
        }
    }
}
