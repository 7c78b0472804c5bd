//! Provider webhook handler

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use sendwell_core::tracking::BatchSummary;
use sendwell_core::ProviderEventKind;
use std::sync::Arc;
use tracing::{info, warn};

use super::{api_error, store_error, ApiError};
use crate::signature::{self, SIGNATURE_HEADER};
use crate::state::AppState;

/// Apply a batch of provider events
///
/// POST /api/v1/webhooks/:provider
pub async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<BatchSummary>, ApiError> {
    let kind: ProviderEventKind = provider.parse().map_err(|e| {
        warn!("Webhook for unknown provider '{}'", provider);
        api_error(StatusCode::BAD_REQUEST, "malformed_event", format!("{}", e))
    })?;

    if let Some(secret) = state.webhook_secrets.get(kind.as_str()) {
        let header = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        if !signature::verify(secret, &body, header) {
            warn!(provider = %kind, "Webhook signature rejected");
            return Err(api_error(
                StatusCode::UNAUTHORIZED,
                "invalid_signature",
                "Webhook signature is missing or invalid",
            ));
        }
    }

    let items = state.engine.normalizer.normalize(kind, &body).map_err(|e| {
        warn!(provider = %kind, "Rejecting webhook: {}", e);
        api_error(StatusCode::BAD_REQUEST, "malformed_event", e.to_string())
    })?;

    let summary = state
        .engine
        .processor
        .process_batch(items)
        .await
        .map_err(store_error)?;

    info!(
        provider = %kind,
        accepted = summary.accepted,
        duplicates = summary.duplicates,
        ignored = summary.ignored,
        rejected = summary.rejected,
        "Webhook processed"
    );

    Ok(Json(summary))
}
