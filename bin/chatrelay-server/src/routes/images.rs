//! Image generation page.  No transcript interaction.

use std::sync::Arc;

use axum::extract::{Form, State};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chatrelay_core::RelayError;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ServerError, relay_status};
use crate::routes::pages::ErrorBanner;
use crate::state::AppState;
use crate::templates;

#[derive(Debug, Default, Serialize)]
struct ImageView {
    prompt: Option<String>,
    image_url: Option<String>,
    error: Option<ErrorBanner>,
}

#[derive(Debug, Deserialize)]
pub struct ImageForm {
    user_input: String,
}

/// Register the image page routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/image", get(image_page).post(generate_image))
}

/// `GET /image`
pub async fn image_page(State(state): State<Arc<AppState>>) -> Result<Html<String>, ServerError> {
    Ok(Html(state.templates.render(templates::IMAGE, ImageView::default())?))
}

/// `POST /image`: one generation call, result rendered inline.
pub async fn generate_image(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ImageForm>,
) -> Result<Response, ServerError> {
    let prompt = form.user_input;
    let generated = if prompt.trim().is_empty() {
        Err(RelayError::Validation("prompt must not be empty".into()))
    } else {
        state.images.generate_image(&prompt).await
    };
    match generated {
        Ok(url) => {
            info!(prompt_len = prompt.len(), "image generated");
            let view = ImageView { prompt: Some(prompt), image_url: Some(url), error: None };
            Ok(Html(state.templates.render(templates::IMAGE, view)?).into_response())
        }
        Err(e) => {
            warn!(code = e.code(), error = %e, "image generation failed");
            let view = ImageView { prompt: Some(prompt), image_url: None, error: Some(ErrorBanner::from(&e)) };
            let page = Html(state.templates.render(templates::IMAGE, view)?);
            Ok((relay_status(&e), page).into_response())
        }
    }
}
