//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use chatrelay_core::{CompletionApi, ImageApi, OpenAiClient, Relay, StubUpstream, TranscriptStore};

use crate::config::{Config, UpstreamKind};
use crate::templates::Templates;

/// State shared across all HTTP handlers and socket sessions.
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Per-session transcripts.
    pub store: Arc<TranscriptStore>,
    /// Completion relay over `store`.
    pub relay: Relay,
    /// Image generation upstream.
    pub images: Arc<dyn ImageApi>,
    pub templates: Templates,
}

impl AppState {
    /// Build state with the upstream selected by `config.upstream`.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let state = match config.upstream {
            UpstreamKind::OpenAi => {
                let client = Arc::new(OpenAiClient::new(config.openai_config())?);
                Self::with_upstream(config, client.clone(), client)?
            }
            UpstreamKind::Stub => {
                let stub = Arc::new(StubUpstream::echo());
                Self::with_upstream(config, stub.clone(), stub)?
            }
        };
        Ok(state)
    }

    pub fn with_upstream(
        config: Config,
        completions: Arc<dyn CompletionApi>,
        images: Arc<dyn ImageApi>,
    ) -> Result<Self, minijinja::Error> {
        let store = Arc::new(TranscriptStore::new(config.system_prompt.clone()));
        Ok(Self {
            relay: Relay::new(Arc::clone(&store), completions),
            config: Arc::new(config),
            store,
            images,
            templates: Templates::new()?,
        })
    }

    /// `"openai (gpt-4o-mini)"` or `"stub"`, for diagnostics.
    pub fn upstream_label(&self) -> String {
        match self.config.upstream {
            UpstreamKind::OpenAi => format!("{} ({})", self.config.upstream, self.config.chat_model),
            UpstreamKind::Stub => self.config.upstream.to_string(),
        }
    }

    pub fn credential_present(&self) -> bool {
        self.config.openai_api_key.is_some()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// State backed by `stub` with diagnostics on and no `/ws` pacing.
    pub fn state_with(stub: StubUpstream) -> Arc<AppState> {
        let config = Config {
            upstream: UpstreamKind::Stub,
            ws_pacing: std::time::Duration::ZERO,
            ..Config::default()
        };
        let stub = Arc::new(stub);
        match AppState::with_upstream(config, stub.clone(), stub) {
            Ok(state) => Arc::new(state),
            Err(e) => panic!("templates must compile: {e}"),
        }
    }
}
