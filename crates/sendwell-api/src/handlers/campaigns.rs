//! Campaign handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use sendwell_common::types::{CampaignStatus, Paginated, RecipientStatus};
use sendwell_core::CampaignAnalytics;
use sendwell_storage::models::{Campaign, CampaignRecipient, CreateCampaign};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{api_error, campaign_error, ApiError};
use crate::state::AppState;

/// Query parameters for listing campaigns
#[derive(Debug, Deserialize)]
pub struct ListCampaignsQuery {
    pub user_id: Option<Uuid>,
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

/// Query parameters for listing recipients
#[derive(Debug, Deserialize)]
pub struct ListRecipientsQuery {
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Request body for scheduling a campaign
#[derive(Debug, Deserialize)]
pub struct ScheduleCampaignRequest {
    pub scheduled_at: Option<DateTime<Utc>>,
}

fn parse_status<T: std::str::FromStr>(status: Option<String>) -> Result<Option<T>, ApiError> {
    status
        .map(|s| {
            s.parse::<T>().map_err(|_| {
                api_error(
                    StatusCode::BAD_REQUEST,
                    "validation_error",
                    format!("Unknown status '{}'", s),
                )
            })
        })
        .transpose()
}

fn page_bounds(limit: i64, offset: i64) -> (i64, i64) {
    (limit.clamp(1, 500), offset.max(0))
}

/// List campaigns
///
/// GET /api/v1/campaigns
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListCampaignsQuery>,
) -> Result<Json<Paginated<Campaign>>, ApiError> {
    let status = parse_status::<CampaignStatus>(query.status)?;
    let (limit, offset) = page_bounds(query.limit, query.offset);

    state
        .engine
        .manager
        .list(query.user_id, status, limit, offset)
        .await
        .map(Json)
        .map_err(campaign_error)
}

/// Create a draft campaign
///
/// POST /api/v1/campaigns
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateCampaign>,
) -> Result<(StatusCode, Json<Campaign>), ApiError> {
    let campaign = state
        .engine
        .manager
        .create(input)
        .await
        .map_err(campaign_error)?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

/// GET /api/v1/campaigns/:campaign_id
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
    state
        .engine
        .manager
        .get(campaign_id)
        .await
        .map(Json)
        .map_err(campaign_error)
}

/// Delete a draft campaign
///
/// DELETE /api/v1/campaigns/:campaign_id
pub async fn delete_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .manager
        .delete(campaign_id)
        .await
        .map_err(campaign_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Validate and schedule; due now unless `scheduled_at` is given
///
/// POST /api/v1/campaigns/:campaign_id/schedule
pub async fn schedule_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
    body: Option<Json<ScheduleCampaignRequest>>,
) -> Result<Json<Campaign>, ApiError> {
    let at = body.and_then(|Json(b)| b.scheduled_at);
    state
        .engine
        .manager
        .schedule(campaign_id, at)
        .await
        .map(Json)
        .map_err(campaign_error)
}

/// Resolve the audience and start sending a scheduled campaign
///
/// POST /api/v1/campaigns/:campaign_id/dispatch
pub async fn dispatch_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
    state
        .engine
        .manager
        .dispatch(campaign_id)
        .await
        .map(Json)
        .map_err(campaign_error)
}

/// Schedule and dispatch a draft in one step
///
/// POST /api/v1/campaigns/:campaign_id/send
pub async fn send_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
    state
        .engine
        .manager
        .send_now(campaign_id)
        .await
        .map(Json)
        .map_err(campaign_error)
}

/// POST /api/v1/campaigns/:campaign_id/pause
pub async fn pause_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
    state
        .engine
        .manager
        .pause(campaign_id)
        .await
        .map(Json)
        .map_err(campaign_error)
}

/// POST /api/v1/campaigns/:campaign_id/resume
pub async fn resume_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
    state
        .engine
        .manager
        .resume(campaign_id)
        .await
        .map(Json)
        .map_err(campaign_error)
}

/// POST /api/v1/campaigns/:campaign_id/cancel
pub async fn cancel_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
    state
        .engine
        .manager
        .cancel(campaign_id)
        .await
        .map(Json)
        .map_err(campaign_error)
}

/// Rebuild counters from recipient rows
///
/// POST /api/v1/campaigns/:campaign_id/recompute
pub async fn recompute_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
    state
        .engine
        .manager
        .recompute(campaign_id)
        .await
        .map(Json)
        .map_err(campaign_error)
}

/// GET /api/v1/campaigns/:campaign_id/recipients
pub async fn list_recipients(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
    Query(query): Query<ListRecipientsQuery>,
) -> Result<Json<Paginated<CampaignRecipient>>, ApiError> {
    let status = parse_status::<RecipientStatus>(query.status)?;
    let (limit, offset) = page_bounds(query.limit, query.offset);

    state
        .engine
        .manager
        .list_recipients(campaign_id, status, limit, offset)
        .await
        .map(Json)
        .map_err(campaign_error)
}

/// GET /api/v1/campaigns/:campaign_id/analytics
pub async fn get_campaign_analytics(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignAnalytics>, ApiError> {
    state
        .engine
        .manager
        .analytics(campaign_id)
        .await
        .map(Json)
        .map_err(campaign_error)
}
