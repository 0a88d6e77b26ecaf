//! chatrelay-core – conversation state and the streaming completion relay.
//!
//! The crate is split the same way the server uses it:
//!
//! - [`transcript`] / [`store`]: role-tagged messages and the per-session
//!   transcript registry.
//! - [`upstream`]: the seam to the remote text / image generation API, with
//!   an OpenAI-compatible HTTP client and a deterministic stub.
//! - [`relay`]: turns a transcript snapshot into a lazily pulled stream of
//!   fragments and records the assistant reply once the stream ends.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chatrelay_core::{Relay, StubUpstream, TranscriptStore};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = Arc::new(TranscriptStore::new("You are a helpful assistant."));
//! let relay = Relay::new(Arc::clone(&store), Arc::new(StubUpstream::echo()));
//! let session = store.create().await;
//! let reply = relay.complete_turn(&session, "hello").await.unwrap();
//! assert_eq!(reply, "hello");
//! # }
//! ```

pub mod error;
pub mod relay;
pub mod store;
pub mod transcript;
pub mod upstream;

pub use error::RelayError;
pub use relay::{Fragment, Relay, RelayEvent, TurnOutcome};
pub use store::{SessionId, TranscriptStore};
pub use transcript::{Message, Role, Transcript};
pub use upstream::openai::{OpenAiClient, OpenAiConfig};
pub use upstream::stub::StubUpstream;
pub use upstream::{CompletionApi, FragmentStream, ImageApi};
