use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct DebugResponse {
    pub version: &'static str,
    pub working_directory: String,
    pub directory_contents: Vec<String>,
    /// Presence markers only, never values.
    pub environment_variables: BTreeMap<&'static str, String>,
    pub upstream: String,
    pub session_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateCheck {
    pub template: &'static str,
    /// `"ok"` or `"failed"`.
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateReport {
    pub status: &'static str,
    pub templates: Vec<TemplateCheck>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamProbe {
    /// `"ok"`, `"skipped"` or `"failed"`.
    pub status: &'static str,
    pub credential: &'static str,
    pub upstream: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}
