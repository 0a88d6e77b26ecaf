//! One socket connection.
//!
//! Three tasks cooperate per connection:
//! - the reader drains inbound frames into a queue and flips the cancel
//!   signal when the client goes away,
//! - the turn loop takes queued messages one at a time and runs each through
//!   [`Relay::stream_turn`],
//! - the writer encodes relay events as JSON frames, applies the strategy's
//!   pacing, and flips the cancel signal when a write fails.

use std::fmt;
use std::sync::Arc;

use chatrelay_core::{Relay, RelayEvent, SessionId, TurnOutcome};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tracing::{Instrument, debug, error, info};

use super::RelayStrategy;
use super::frames::FrameEncoder;

/// Queued user messages awaiting their turn.
const INBOUND_QUEUE: usize = 32;
/// Relay events buffered ahead of the socket writer.
const EVENT_BUFFER: usize = 64;

/// Transport-independent view of an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Close,
    /// Binary, ping and pong frames.
    Ignored,
}

#[derive(Debug, Clone, Copy, strum::Display)]
#[strum(serialize_all = "snake_case")]
enum SocketState {
    Open,
    AwaitingInput,
    Streaming,
    Closed,
}

/// Drive one connection until the client disconnects.
pub async fn run<I, O>(relay: Relay, session: SessionId, strategy: RelayStrategy, inbound: I, outbound: O)
where
    I: Stream<Item = InboundFrame> + Send + Unpin + 'static,
    O: Sink<String> + Send + Unpin + 'static,
    O::Error: fmt::Display,
{
    debug!(state = %SocketState::Open, "socket state");

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let cancel_tx = Arc::new(cancel_tx);
    let (queue_tx, mut queue_rx) = mpsc::channel(INBOUND_QUEUE);
    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);

    let reader = tokio::spawn(read_inbound(inbound, queue_tx, Arc::clone(&cancel_tx)).in_current_span());
    let writer = tokio::spawn(write_outbound(outbound, event_rx, strategy, cancel_tx).in_current_span());

    loop {
        debug!(state = %SocketState::AwaitingInput, "socket state");
        let Some(text) = queue_rx.recv().await else { break };
        if *cancel_rx.borrow() {
            break;
        }

        debug!(state = %SocketState::Streaming, input_len = text.len(), "socket state");
        let outcome = relay.stream_turn(&session, &text, cancel_rx.clone(), &event_tx).await;
        if let TurnOutcome::Cancelled { chunks_sent } = outcome {
            info!(chunks_sent, "turn abandoned after disconnect");
            break;
        }
    }

    drop(event_tx);
    if let Err(e) = writer.await {
        error!(error = %e, "socket writer task failed");
    }
    reader.abort();
    debug!(state = %SocketState::Closed, "socket state");
}

async fn read_inbound<I>(mut inbound: I, queue: mpsc::Sender<String>, cancel: Arc<watch::Sender<bool>>)
where
    I: Stream<Item = InboundFrame> + Unpin,
{
    while let Some(frame) = inbound.next().await {
        match frame {
            InboundFrame::Text(text) => {
                if queue.send(text).await.is_err() {
                    break;
                }
            }
            InboundFrame::Close => {
                debug!("client sent close frame");
                break;
            }
            InboundFrame::Ignored => continue,
        }
    }
    // Aborts any in-flight upstream read.
    cancel.send_replace(true);
}

async fn write_outbound<O>(
    mut outbound: O,
    mut events: mpsc::Receiver<RelayEvent>,
    strategy: RelayStrategy,
    cancel: Arc<watch::Sender<bool>>,
) where
    O: Sink<String> + Unpin,
    O::Error: fmt::Display,
{
    let mut encoder = FrameEncoder::new(strategy.include_partial);
    while let Some(event) = events.recv().await {
        let frame = encoder.encode(event);
        let text = match serde_json::to_string(&frame) {
            Ok(t) => t,
            Err(e) => {
                error!(error = %e, "failed to serialise outbound frame");
                continue;
            }
        };
        if let Err(e) = outbound.send(text).await {
            debug!(error = %e, "socket write failed; treating as disconnect");
            cancel.send_replace(true);
            return;
        }
        if frame.is_chunk() {
            strategy.pace().await;
        }
    }
    let _ = outbound.close().await;
}

// ── Tests ──────────────────────────────────────────────────────────────────────
