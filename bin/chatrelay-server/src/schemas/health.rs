use serde::Serialize;
use utoipa::ToSchema;

/// Static liveness payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub version: &'static str,
}

impl HealthResponse {
    pub const fn healthy() -> Self {
        Self {
            status: "healthy",
            message: "Service is running",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}
