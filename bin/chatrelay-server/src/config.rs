//! Server configuration, loaded from environment variables at startup.

use std::time::Duration;

use chatrelay_core::OpenAiConfig;

/// Which implementation answers completion and image requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, clap::ValueEnum)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum UpstreamKind {
    /// OpenAI-compatible REST API.
    #[value(name = "openai")]
    OpenAi,
    /// Offline echo upstream.
    Stub,
}

/// Runtime configuration for chatrelay-server.
///
/// Every field has a default so the server starts without any environment
/// variables set.  A missing API key only degrades the upstream calls.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:8000"`).
    pub bind_address: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Directory for daily rolling log files; stdout when unset.
    pub log_dir: Option<String>,

    pub openai_api_key: Option<String>,
    pub api_base: String,
    pub chat_model: String,
    pub image_model: String,
    pub image_size: String,

    /// Seed message of every new transcript.
    pub system_prompt: String,

    pub upstream: UpstreamKind,

    /// Delay after each chunk frame on `/ws`.
    pub ws_pacing: Duration,

    /// Comma-separated CORS origin allow-list; wildcard when unset.
    pub cors_allowed_origins: Option<String>,

    /// Serve `/debug`, `/test-templates` and `/test-openai`.
    pub enable_diagnostics: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            bind_address: env_or("CHATRELAY_BIND", "0.0.0.0:8000"),
            log_level: env_or("CHATRELAY_LOG", "info"),
            log_json: lookup("CHATRELAY_LOG_JSON").is_some_and(|v| parse_flag(&v)),
            log_dir: non_empty("CHATRELAY_LOG_DIR"),
            openai_api_key: non_empty("OPENAI_API_KEY"),
            api_base: env_or("CHATRELAY_API_BASE", "https://api.openai.com/v1"),
            chat_model: env_or("CHATRELAY_CHAT_MODEL", "gpt-4o-mini"),
            image_model: env_or("CHATRELAY_IMAGE_MODEL", "dall-e-3"),
            image_size: env_or("CHATRELAY_IMAGE_SIZE", "1024x1024"),
            system_prompt: env_or("CHATRELAY_SYSTEM_PROMPT", "You are a helpful assistant."),
            upstream: parse_or(lookup("CHATRELAY_UPSTREAM"), UpstreamKind::OpenAi),
            ws_pacing: Duration::from_millis(parse_or(lookup("CHATRELAY_WS_PACING_MS"), 10)),
            cors_allowed_origins: non_empty("CHATRELAY_CORS_ORIGINS"),
            enable_diagnostics: lookup("CHATRELAY_ENABLE_DIAGNOSTICS").is_none_or(|v| parse_flag(&v)),
        }
    }

    pub fn openai_config(&self) -> OpenAiConfig {
        OpenAiConfig {
            api_base: self.api_base.clone(),
            api_key: self.openai_api_key.clone(),
            chat_model: self.chat_model.clone(),
            image_model: self.image_model.clone(),
            image_size: self.image_size.clone(),
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
