//! Completion relay.
//!
//! [`Relay::stream`] turns a transcript snapshot into a lazily pulled stream
//! of [`RelayEvent`]s: zero or more [`RelayEvent::Chunk`]s followed by exactly
//! one terminal [`RelayEvent::End`] or [`RelayEvent::Error`].  The upstream
//! request is opened on first poll and dropped together with the stream.
//!
//! [`Relay::stream_turn`] wraps one user turn around that stream: the user
//! message is appended first, events are forwarded in arrival order, and the
//! concatenated reply is appended as a single assistant message once the
//! stream ends.  A failed or cancelled turn leaves the user message in place
//! with no assistant reply after it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::error::RelayError;
use crate::store::{SessionId, TranscriptStore};
use crate::transcript::Message;
use crate::upstream::{CompletionApi, FragmentStream};

/// Largest user message accepted for one turn.
pub const MAX_USER_TEXT_BYTES: usize = 32 * 1024;

/// One incremental piece of generated text.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub delta: String,
    /// 1-based position within the turn; strictly increasing, no gaps.
    pub seq: u64,
    /// Arrival time, for diagnostics.
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum RelayEvent {
    Chunk(Fragment),
    End { full_response: String, total_chunks: u64 },
    Error(RelayError),
}

impl RelayEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RelayEvent::Chunk(_))
    }
}

/// How a streamed turn finished.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    Completed { full_response: String, total_chunks: u64 },
    Failed(RelayError),
    /// The client went away; no assistant message was recorded.
    Cancelled { chunks_sent: u64 },
}

enum StreamState {
    Pending { api: Arc<dyn CompletionApi>, transcript: Vec<Message> },
    Open { upstream: FragmentStream, seq: u64, buffer: String },
    Finished,
}

/// Bridges the transcript store and the upstream completion API.
#[derive(Clone)]
pub struct Relay {
    store: Arc<TranscriptStore>,
    api: Arc<dyn CompletionApi>,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay").field("store", &self.store).finish_non_exhaustive()
    }
}

impl Relay {
    pub fn new(store: Arc<TranscriptStore>, api: Arc<dyn CompletionApi>) -> Self {
        Self { store, api }
    }

    pub fn api(&self) -> &Arc<dyn CompletionApi> {
        &self.api
    }

    /// Lazily stream a completion for `transcript`.
    ///
    /// The returned stream is finite and cannot be restarted.  Nothing is
    /// written to the store.
    pub fn stream(&self, transcript: Vec<Message>) -> impl Stream<Item = RelayEvent> + Send + 'static {
        let initial = StreamState::Pending { api: Arc::clone(&self.api), transcript };
        futures::stream::unfold(initial, |state| async move {
            let (mut upstream, mut seq, mut buffer) = match state {
                StreamState::Finished => return None,
                StreamState::Pending { api, transcript } => match api.stream(&transcript).await {
                    Ok(upstream) => (upstream, 0, String::new()),
                    Err(e) => return Some((RelayEvent::Error(e), StreamState::Finished)),
                },
                StreamState::Open { upstream, seq, buffer } => (upstream, seq, buffer),
            };

            match upstream.next().await {
                Some(Ok(delta)) => {
                    seq += 1;
                    buffer.push_str(&delta);
                    let fragment = Fragment { delta, seq, at: Utc::now() };
                    Some((RelayEvent::Chunk(fragment), StreamState::Open { upstream, seq, buffer }))
                }
                Some(Err(e)) => Some((RelayEvent::Error(e), StreamState::Finished)),
                None => Some((
                    RelayEvent::End { full_response: buffer, total_chunks: seq },
                    StreamState::Finished,
                )),
            }
        })
    }

    /// Run one streamed user turn for `session`.
    ///
    /// Every event, including the terminal one, is sent to `events` in
    /// order.  The turn is abandoned as soon as `cancel` becomes `true`, its
    /// sender is dropped, or `events` is closed; the upstream stream is
    /// dropped at that point.
    pub async fn stream_turn(
        &self,
        session: &SessionId,
        user_text: &str,
        mut cancel: watch::Receiver<bool>,
        events: &mpsc::Sender<RelayEvent>,
    ) -> TurnOutcome {
        if let Err(e) = self.begin_turn(session, user_text).await {
            let _ = events.send(RelayEvent::Error(e.clone())).await;
            return TurnOutcome::Failed(e);
        }
        let snapshot = match self.store.snapshot(session).await {
            Ok(s) => s,
            Err(e) => {
                let _ = events.send(RelayEvent::Error(e.clone())).await;
                return TurnOutcome::Failed(e);
            }
        };

        debug!(session_id = %session, context_len = snapshot.len(), "turn streaming");
        let mut stream = std::pin::pin!(self.stream(snapshot));
        let mut chunks_sent = 0u64;

        enum Step {
            Cancel,
            Recheck,
            Next(Option<RelayEvent>),
        }

        loop {
            if *cancel.borrow_and_update() {
                return cancelled(session, chunks_sent);
            }

            let step = tokio::select! {
                biased;
                changed = cancel.changed() => match changed {
                    Ok(()) => Step::Recheck,
                    Err(_) => Step::Cancel,
                },
                next = stream.next() => Step::Next(next),
            };

            let event = match step {
                Step::Cancel => return cancelled(session, chunks_sent),
                Step::Recheck => continue,
                // `stream` always yields a terminal event before ending.
                Step::Next(None) => return cancelled(session, chunks_sent),
                Step::Next(Some(event)) => event,
            };

            match event {
                RelayEvent::Chunk(fragment) => {
                    let Some(slot) = reserve_unless_cancelled(events, &mut cancel).await else {
                        return cancelled(session, chunks_sent);
                    };
                    slot.send(RelayEvent::Chunk(fragment));
                    chunks_sent += 1;
                }
                RelayEvent::End { full_response, total_chunks } => {
                    // Recorded before `end` goes out so a client that saw
                    // `end` always finds the reply in the transcript.
                    if let Err(e) = self
                        .store
                        .append(session, Message::assistant(full_response.clone()))
                        .await
                    {
                        error!(session_id = %session, error = %e, "failed to record assistant reply");
                    }
                    info!(session_id = %session, total_chunks, output_len = full_response.len(), "turn completed");
                    let _ = events
                        .send(RelayEvent::End { full_response: full_response.clone(), total_chunks })
                        .await;
                    return TurnOutcome::Completed { full_response, total_chunks };
                }
                RelayEvent::Error(e) => {
                    error!(session_id = %session, error = %e, chunks_sent, "upstream stream failed");
                    let _ = events.send(RelayEvent::Error(e.clone())).await;
                    return TurnOutcome::Failed(e);
                }
            }
        }
    }

    /// Run one non-streaming user turn and return the assistant reply.
    pub async fn complete_turn(&self, session: &SessionId, user_text: &str) -> Result<String, RelayError> {
        self.begin_turn(session, user_text).await?;
        let snapshot = self.store.snapshot(session).await?;
        let reply = self.api.complete(&snapshot).await.map_err(|e| {
            error!(session_id = %session, error = %e, "upstream completion failed");
            e
        })?;
        self.store.append(session, Message::assistant(reply.clone())).await?;
        info!(session_id = %session, output_len = reply.len(), "completion turn done");
        Ok(reply)
    }

    async fn begin_turn(&self, session: &SessionId, user_text: &str) -> Result<(), RelayError> {
        if user_text.trim().is_empty() {
            return Err(RelayError::Validation("message must not be empty".into()));
        }
        if user_text.len() > MAX_USER_TEXT_BYTES {
            return Err(RelayError::Validation(format!(
                "message too large ({} bytes); maximum is {MAX_USER_TEXT_BYTES} bytes",
                user_text.len()
            )));
        }
        self.store.append(session, Message::user(user_text)).await
    }
}

/// Wait for buffer space in `events`, giving up once the turn is cancelled
/// or the receiver is gone.
async fn reserve_unless_cancelled<'a>(
    events: &'a mpsc::Sender<RelayEvent>,
    cancel: &mut watch::Receiver<bool>,
) -> Option<mpsc::Permit<'a, RelayEvent>> {
    loop {
        if *cancel.borrow_and_update() {
            return None;
        }
        tokio::select! {
            biased;
            changed = cancel.changed() => {
                if changed.is_err() {
                    return None;
                }
            }
            slot = events.reserve() => return slot.ok(),
        }
    }
}

fn cancelled(session: &SessionId, chunks_sent: u64) -> TurnOutcome {
    info!(session_id = %session, chunks_sent, "turn cancelled; upstream read abandoned");
    TurnOutcome::Cancelled { chunks_sent }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
