//! Deterministic upstream for offline development and tests.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::RelayError;
use crate::transcript::{Message, Role};
use crate::upstream::{CompletionApi, FragmentStream, ImageApi};

/// Placeholder image returned by [`StubUpstream`].
pub const STUB_IMAGE_URL: &str = "https://placehold.co/512x512?text=chatrelay";

#[derive(Debug, Clone)]
enum Script {
    /// Reply with the last user message, split on word boundaries.
    Echo,
    /// Reply with these fragments for every turn.
    Fragments(Vec<String>),
}

/// Scripted [`CompletionApi`] / [`ImageApi`] implementation.
#[derive(Debug, Clone)]
pub struct StubUpstream {
    script: Script,
    fail_after: Option<usize>,
    delay: Option<Duration>,
}

impl StubUpstream {
    /// Echo the last user message back.
    pub fn echo() -> Self {
        Self { script: Script::Echo, fail_after: None, delay: None }
    }

    /// Emit exactly these fragments on every turn.
    pub fn fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Script::Fragments(fragments.into_iter().map(Into::into).collect()),
            fail_after: None,
            delay: None,
        }
    }

    /// Raise an upstream error after `n` fragments have been emitted.
    ///
    /// Blocking completions and image generation emit no fragments, so they
    /// fail outright whatever `n` is.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Sleep before each fragment, to simulate a slow model.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn reply_fragments(&self, messages: &[Message]) -> Vec<String> {
        match &self.script {
            Script::Fragments(f) => f.clone(),
            Script::Echo => {
                let last = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.as_str())
                    .unwrap_or_default();
                split_keeping_spaces(last)
            }
        }
    }
}

#[async_trait]
impl CompletionApi for StubUpstream {
    async fn complete(&self, messages: &[Message]) -> Result<String, RelayError> {
        if self.fail_after.is_some() {
            return Err(stub_failure());
        }
        Ok(self.reply_fragments(messages).concat())
    }

    async fn stream(&self, messages: &[Message]) -> Result<FragmentStream, RelayError> {
        let mut items: Vec<Result<String, RelayError>> =
            self.reply_fragments(messages).into_iter().map(Ok).collect();
        if let Some(n) = self.fail_after {
            items.truncate(n);
            items.push(Err(stub_failure()));
        }
        let delay = self.delay;
        let stream = futures::stream::unfold(items.into_iter(), move |mut it| async move {
            let item = it.next()?;
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            Some((item, it))
        });
        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl ImageApi for StubUpstream {
    async fn generate_image(&self, prompt: &str) -> Result<String, RelayError> {
        if self.fail_after.is_some() {
            return Err(stub_failure());
        }
        debug!(prompt_len = prompt.len(), "stub image generated");
        Ok(STUB_IMAGE_URL.to_owned())
    }
}

fn stub_failure() -> RelayError {
    RelayError::Upstream { status: 500, message: "stub upstream failure".into() }
}

/// `"a b  c"` → `["a", " ", "b", "  ", "c"]`; concatenation restores the input.
fn split_keeping_spaces(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_space = false;
    for ch in text.chars() {
        let is_space = ch.is_whitespace();
        if !current.is_empty() && is_space != in_space {
            out.push(std::mem::take(&mut current));
        }
        in_space = is_space;
        current.push(ch);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}
