//! API request handlers

pub mod campaigns;
pub mod generate;
pub mod health;
pub mod webhooks;

use axum::{http::StatusCode, Json};
use sendwell_core::CampaignError;
use serde::{Deserialize, Serialize};
use tracing::error;

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

pub(crate) fn store_error(e: sendwell_common::Error) -> ApiError {
    let status = status(e.status_code());
    if status.is_server_error() {
        error!("Request failed: {}", e);
    }
    api_error(status, &e.code().to_ascii_lowercase(), e.to_string())
}

pub(crate) fn campaign_error(e: CampaignError) -> ApiError {
    match e {
        CampaignError::Store(e) => store_error(e),
        e => api_error(status(e.status_code()), &e.code().to_ascii_lowercase(), e.to_string()),
    }
}
