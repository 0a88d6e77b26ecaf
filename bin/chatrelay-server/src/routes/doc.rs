use axum::Json;
use utoipa::OpenApi;

use crate::routes::{health, sessions};

#[derive(OpenApi)]
#[openapi(info(
    title = "chatrelay-server",
    description = "chatrelay JSON API. Chat streaming itself runs over the /ws routes.",
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(sessions::SessionApi::openapi());
    root
}

/// `GET /api-docs/openapi.json`
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(get_docs())
}
