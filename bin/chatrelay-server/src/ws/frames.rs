//! Outbound socket frames.

use chatrelay_core::RelayEvent;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// JSON frame written to the client, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Chunk {
        content: String,
        chunk_id: u64,
        timestamp: DateTime<Utc>,
        /// Text generated so far in this turn, only on `/ws-test`.
        #[serde(skip_serializing_if = "Option::is_none")]
        full_response: Option<String>,
    },
    End {
        full_response: String,
        total_chunks: u64,
    },
    Error {
        code: &'static str,
        message: String,
    },
}

impl OutboundFrame {
    pub fn is_chunk(&self) -> bool {
        matches!(self, OutboundFrame::Chunk { .. })
    }
}

/// Turns relay events into frames, tracking the running text of a turn.
#[derive(Debug)]
pub struct FrameEncoder {
    include_partial: bool,
    partial: String,
}

impl FrameEncoder {
    pub fn new(include_partial: bool) -> Self {
        Self { include_partial, partial: String::new() }
    }

    pub fn encode(&mut self, event: RelayEvent) -> OutboundFrame {
        match event {
            RelayEvent::Chunk(fragment) => {
                let full_response = self.include_partial.then(|| {
                    self.partial.push_str(&fragment.delta);
                    self.partial.clone()
                });
                OutboundFrame::Chunk {
                    content: fragment.delta,
                    chunk_id: fragment.seq,
                    timestamp: fragment.at,
                    full_response,
                }
            }
            RelayEvent::End { full_response, total_chunks } => {
                self.partial.clear();
                OutboundFrame::End { full_response, total_chunks }
            }
            RelayEvent::Error(e) => {
                self.partial.clear();
                OutboundFrame::Error { code: e.code(), message: e.client_message() }
            }
        }
    }
}
