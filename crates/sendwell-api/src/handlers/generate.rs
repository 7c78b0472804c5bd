//! Content generation handler

use axum::{extract::State, http::StatusCode, Json};
use sendwell_core::{GeneratedContent, GenerationError, GenerationRequest};
use std::sync::Arc;
use tracing::warn;

use super::{api_error, ApiError};
use crate::state::AppState;

/// Generate campaign content
///
/// POST /api/v1/generate
pub async fn generate_content(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerationRequest>,
) -> Result<Json<GeneratedContent>, ApiError> {
    let generator = state.generator.as_ref().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "generation_disabled",
            GenerationError::Disabled.to_string(),
        )
    })?;

    generator.generate(&request).await.map(Json).map_err(|e| {
        let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
        let code = match &e {
            GenerationError::Disabled => "generation_disabled",
            GenerationError::InvalidRequest(_) => "validation_error",
            GenerationError::RateLimited(_) => "rate_limited",
            GenerationError::Upstream(_) => "upstream_error",
        };
        warn!("Generation failed: {}", e);
        api_error(status, code, e.to_string())
    })
}
