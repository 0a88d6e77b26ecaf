//! Operational troubleshooting endpoints.
//!
//! Mounted only when `CHATRELAY_ENABLE_DIAGNOSTICS` is on.  Nothing here
//! reveals a credential value, upstream error detail or template source.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chatrelay_core::{Message, SessionId};
use minijinja::context;
use tracing::{error, warn};

use crate::config::UpstreamKind;
use crate::schemas::diagnostics::{DebugResponse, TemplateCheck, TemplateReport, UpstreamProbe};
use crate::state::AppState;

/// Characters of `PATH` shown by `/debug`.
const PATH_PREVIEW_CHARS: usize = 100;

const PROBE_PROMPT: &str = "Reply with the single word: pong";

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/debug", get(debug_info))
        .route("/test-templates", get(test_templates))
        .route("/test-openai", get(test_openai))
}

/// `GET /debug`
pub async fn debug_info(State(state): State<Arc<AppState>>) -> Json<DebugResponse> {
    let working_directory = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "unknown".to_owned());

    let mut environment_variables = BTreeMap::new();
    environment_variables.insert("OPENAI_API_KEY", presence(state.credential_present()).to_owned());
    let path = std::env::var("PATH").unwrap_or_else(|_| "NOT SET".to_owned());
    environment_variables.insert("PATH", preview(&path, PATH_PREVIEW_CHARS));

    Json(DebugResponse {
        version: env!("CARGO_PKG_VERSION"),
        working_directory,
        directory_contents: list_current_dir().await,
        environment_variables,
        upstream: state.upstream_label(),
        session_count: state.store.session_count().await,
    })
}

/// `GET /test-templates`: render every template with sample data.
pub async fn test_templates(State(state): State<Arc<AppState>>) -> Json<TemplateReport> {
    let sample = context! {
        session_id => SessionId::new().to_string(),
        messages => vec![
            Message::system("sample system prompt"),
            Message::user("Hello"),
            Message::assistant("Hi there"),
        ],
        prompt => "a lighthouse at dusk",
        image_url => "https://example.com/sample.png",
    };

    let templates: Vec<TemplateCheck> = state
        .templates
        .names()
        .map(|name| {
            let status = match state.templates.render(name, &sample) {
                Ok(_) => "ok",
                Err(e) => {
                    error!(template = name, error = ?e, "template self-test failed");
                    "failed"
                }
            };
            TemplateCheck { template: name, status }
        })
        .collect();

    let status = if templates.iter().all(|t| t.status == "ok") { "ok" } else { "failed" };
    Json(TemplateReport { status, templates })
}

/// `GET /test-openai`: one short completion on a throwaway transcript.
pub async fn test_openai(State(state): State<Arc<AppState>>) -> Json<UpstreamProbe> {
    let credential = presence(state.credential_present());
    let upstream = state.upstream_label();

    if state.config.upstream == UpstreamKind::OpenAi && !state.credential_present() {
        return Json(UpstreamProbe { status: "skipped", credential, upstream, reply: None, error: None });
    }

    let probe = [Message::system(state.store.system_prompt()), Message::user(PROBE_PROMPT)];
    match state.relay.api().complete(&probe).await {
        Ok(reply) => Json(UpstreamProbe { status: "ok", credential, upstream, reply: Some(reply), error: None }),
        Err(e) => {
            error!(error = %e, "upstream probe failed");
            Json(UpstreamProbe { status: "failed", credential, upstream, reply: None, error: Some(e.code()) })
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn presence(set: bool) -> &'static str {
    if set { "SET" } else { "NOT SET" }
}

/// First `max_chars` characters followed by `...`.
fn preview(value: &str, max_chars: usize) -> String {
    let mut out: String = value.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

async fn list_current_dir() -> Vec<String> {
    let mut names = Vec::new();
    let mut entries = match tokio::fs::read_dir(".").await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "cannot list working directory");
            return names;
        }
    };
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => names.push(entry.file_name().to_string_lossy().into_owned()),
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "directory listing interrupted");
                break;
            }
        }
    }
    names.sort();
    names
}
