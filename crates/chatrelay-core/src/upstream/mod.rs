//! Seam to the remote generation API.
//!
//! The relay only talks to [`CompletionApi`] and the image page only to
//! [`ImageApi`], so the OpenAI-compatible client and the offline stub are
//! interchangeable at startup.

pub mod openai;
pub mod stub;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::RelayError;
use crate::transcript::Message;

/// Incremental text deltas from a streaming completion, in arrival order.
///
/// The stream ends when the upstream signals completion.  Dropping it closes
/// the underlying connection.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, RelayError>> + Send>>;

/// Text completion over a full conversation.
#[async_trait]
pub trait CompletionApi: Send + Sync + 'static {
    /// Block until the whole assistant reply is available.
    async fn complete(&self, messages: &[Message]) -> Result<String, RelayError>;

    /// Open a streaming completion.
    async fn stream(&self, messages: &[Message]) -> Result<FragmentStream, RelayError>;
}

/// Single-shot image generation.
#[async_trait]
pub trait ImageApi: Send + Sync + 'static {
    /// Generate one image and return its URL.
    async fn generate_image(&self, prompt: &str) -> Result<String, RelayError>;
}
