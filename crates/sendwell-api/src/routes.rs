//! API routes

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{campaigns, generate, health, webhooks};
use crate::openapi::create_openapi_routes;
use crate::state::AppState;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .route("/detailed", get(health::health_detailed))
        .with_state(state.clone());

    // Campaign routes
    let campaign_routes = Router::new()
        .route(
            "/",
            get(campaigns::list_campaigns).post(campaigns::create_campaign),
        )
        .route(
            "/:campaign_id",
            get(campaigns::get_campaign).delete(campaigns::delete_campaign),
        )
        .route("/:campaign_id/schedule", post(campaigns::schedule_campaign))
        .route("/:campaign_id/dispatch", post(campaigns::dispatch_campaign))
        .route("/:campaign_id/send", post(campaigns::send_campaign))
        .route("/:campaign_id/pause", post(campaigns::pause_campaign))
        .route("/:campaign_id/resume", post(campaigns::resume_campaign))
        .route("/:campaign_id/cancel", post(campaigns::cancel_campaign))
        .route("/:campaign_id/recompute", post(campaigns::recompute_campaign))
        .route("/:campaign_id/recipients", get(campaigns::list_recipients))
        .route(
            "/:campaign_id/analytics",
            get(campaigns::get_campaign_analytics),
        );

    let api_v1 = Router::new()
        .route("/webhooks/:provider", post(webhooks::receive_webhook))
        .route("/generate", post(generate::generate_content))
        .nest("/campaigns", campaign_routes)
        .with_state(state.clone());

    Router::new()
        .nest("/health", health_routes)
        .route("/metrics", get(health::metrics).with_state(state))
        .nest("/api/v1", api_v1)
        .merge(create_openapi_routes())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{self, SIGNATURE_HEADER};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use pretty_assertions::assert_eq;
    use sendwell_common::config::TrackingConfig;
    use sendwell_common::types::Paginated;
    use sendwell_core::delivery::{LimiterClass, RateLimiter};
    use sendwell_core::generation::{
        ContentGenerator, GeneratedContent, GenerationError, GenerationRequest, ThrottledGenerator,
    };
    use sendwell_core::{BatchSummary, CampaignAnalytics, Engine, Metrics};
    use sendwell_storage::models::{Campaign, CampaignRecipient};
    use sendwell_storage::Repositories;
    use serde::de::DeserializeOwned;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::time::Duration;
    use tower::ServiceExt;
    use uuid::Uuid;

    struct Canned;

    #[async_trait]
    impl ContentGenerator for Canned {
        async fn generate(&self, _request: &GenerationRequest) -> Result<GeneratedContent, GenerationError> {
            Ok(GeneratedContent {
                content: "Fresh picks for spring".into(),
                confidence: 0.9,
            })
        }
    }

    struct Reply {
        status: StatusCode,
        body: Vec<u8>,
    }

    impl Reply {
        fn json<T: DeserializeOwned>(&self) -> T {
            serde_json::from_slice(&self.body).unwrap()
        }

        fn text(&self) -> String {
            String::from_utf8(self.body.clone()).unwrap()
        }
    }

    fn app(secrets: HashMap<String, String>, generator: Option<Arc<dyn ContentGenerator>>) -> Router {
        let repos = Repositories::in_memory();
        let metrics = Metrics::new().unwrap();
        let engine = Engine::new(&repos, &TrackingConfig::default(), metrics.clone());
        create_router(Arc::new(AppState {
            repos,
            engine,
            generator,
            webhook_secrets: secrets,
            metrics,
        }))
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Vec<u8>>, signature: Option<String>) -> Reply {
        let mut request = Request::builder().method(method).uri(uri);
        if body.is_some() {
            request = request.header(header::CONTENT_TYPE, "application/json");
        }
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }
        let request = request
            .body(body.map(Body::from).unwrap_or_else(Body::empty))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec();
        Reply { status, body }
    }

    async fn get(app: &Router, uri: &str) -> Reply {
        call(app, Method::GET, uri, None, None).await
    }

    async fn post(app: &Router, uri: &str, body: Value) -> Reply {
        call(app, Method::POST, uri, Some(body.to_string().into_bytes()), None).await
    }

    async fn post_empty(app: &Router, uri: &str) -> Reply {
        call(app, Method::POST, uri, None, None).await
    }

    async fn sending_campaign(app: &Router, audience: &[&str]) -> (Campaign, Vec<CampaignRecipient>) {
        let created = post(
            app,
            "/api/v1/campaigns",
            json!({
                "user_id": Uuid::new_v4(),
                "name": "Spring",
                "subject": "Spring sale",
                "html_body": "<p>Everything must go</p>",
                "audience": audience,
            }),
        )
        .await;
        assert_eq!(created.status, StatusCode::CREATED);
        let campaign: Campaign = created.json();

        let sent = post_empty(app, &format!("/api/v1/campaigns/{}/send", campaign.id)).await;
        assert_eq!(sent.status, StatusCode::OK);
        let campaign: Campaign = sent.json();

        let recipients: Paginated<CampaignRecipient> =
            get(app, &format!("/api/v1/campaigns/{}/recipients", campaign.id))
                .await
                .json();
        (campaign, recipients.data)
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(HashMap::new(), None);
        assert_eq!(get(&app, "/health").await.status, StatusCode::OK);
        assert_eq!(get(&app, "/health/live").await.status, StatusCode::OK);
        assert_eq!(get(&app, "/health/ready").await.status, StatusCode::OK);

        let detailed: Value = get(&app, "/health/detailed").await.json();
        assert_eq!(detailed["checks"]["store"]["backend"], "memory");
        assert_eq!(detailed["checks"]["generation"]["status"], "disabled");

        let spec: Value = get(&app, "/openapi.json").await.json();
        assert_eq!(spec["info"]["title"], "Sendwell API");
    }

    #[tokio::test]
    async fn test_campaign_lifecycle() {
        let app = app(HashMap::new(), None);
        let (campaign, recipients) =
            sending_campaign(&app, &["a@example.com", "B@example.com"]).await;
        assert_eq!(campaign.status, "sending");
        assert_eq!(campaign.recipient_count, 2);
        assert_eq!(recipients.len(), 2);

        let paused = post_empty(&app, &format!("/api/v1/campaigns/{}/pause", campaign.id)).await;
        assert_eq!(paused.json::<Campaign>().status, "paused");

        let cancelled = post_empty(&app, &format!("/api/v1/campaigns/{}/cancel", campaign.id)).await;
        assert_eq!(cancelled.json::<Campaign>().status, "cancelled");

        let again = post_empty(&app, &format!("/api/v1/campaigns/{}/cancel", campaign.id)).await;
        assert_eq!(again.status, StatusCode::CONFLICT);
        let error: Value = again.json();
        assert_eq!(error["error"], "invalid_transition");

        let missing = get(&app, &format!("/api/v1/campaigns/{}", Uuid::new_v4())).await;
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_schedule_requires_content() {
        let app = app(HashMap::new(), None);
        let created: Campaign = post(
            &app,
            "/api/v1/campaigns",
            json!({
                "user_id": Uuid::new_v4(),
                "name": "Empty",
                "audience": ["a@example.com"],
            }),
        )
        .await
        .json();

        let response = post_empty(&app, &format!("/api/v1/campaigns/{}/schedule", created.id)).await;
        assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);

        let bad_status = get(&app, "/api/v1/campaigns?status=archived").await;
        assert_eq!(bad_status.status, StatusCode::BAD_REQUEST);

        let deleted = call(
            &app,
            Method::DELETE,
            &format!("/api/v1/campaigns/{}", created.id),
            None,
            None,
        )
        .await;
        assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_webhook_is_idempotent() {
        let app = app(HashMap::new(), None);
        let (campaign, recipients) = sending_campaign(&app, &["a@example.com"]).await;
        let body = json!([{
            "event": "opened",
            "campaign_id": campaign.id,
            "recipient_id": recipients[0].id,
            "timestamp": "2024-06-01T12:00:00Z"
        }]);

        let first: BatchSummary = post(&app, "/api/v1/webhooks/generic", body.clone()).await.json();
        assert_eq!(first.accepted, 1);

        let replay: BatchSummary = post(&app, "/api/v1/webhooks/generic", body).await.json();
        assert_eq!(replay.duplicates, 1);
        assert_eq!(replay.accepted, 0);

        let analytics: CampaignAnalytics =
            get(&app, &format!("/api/v1/campaigns/{}/analytics", campaign.id))
                .await
                .json();
        assert_eq!(analytics.counters.opened_count, 1);
        assert_eq!(analytics.counters.sent_count, 1);

        let metrics = get(&app, "/metrics").await.text();
        assert!(metrics.contains("sendwell_events_total"));
    }

    #[tokio::test]
    async fn test_webhook_rejects_bad_input() {
        let app = app(HashMap::new(), None);

        let unknown = post(&app, "/api/v1/webhooks/postmark", json!([])).await;
        assert_eq!(unknown.status, StatusCode::BAD_REQUEST);

        let malformed = call(
            &app,
            Method::POST,
            "/api/v1/webhooks/sendgrid",
            Some(b"{not json".to_vec()),
            None,
        )
        .await;
        assert_eq!(malformed.status, StatusCode::BAD_REQUEST);

        // Unsupported and unknown-recipient items still get a 200
        let ignored: BatchSummary = post(
            &app,
            "/api/v1/webhooks/sendgrid",
            json!([
                {"event": "processed", "sg_message_id": "abc.1", "timestamp": 1717243200},
                {"event": "delivered", "sg_message_id": "nope.1", "timestamp": 1717243200}
            ]),
        )
        .await
        .json();
        assert_eq!(ignored.ignored, 2);
    }

    #[tokio::test]
    async fn test_webhook_signature() {
        let secrets = HashMap::from([("generic".to_string(), "s3cret".to_string())]);
        let app = app(secrets, None);
        let body = b"[]".to_vec();

        let unsigned = call(&app, Method::POST, "/api/v1/webhooks/generic", Some(body.clone()), None).await;
        assert_eq!(unsigned.status, StatusCode::UNAUTHORIZED);

        let signed = call(
            &app,
            Method::POST,
            "/api/v1/webhooks/generic",
            Some(body.clone()),
            Some(signature::sign("s3cret", &body)),
        )
        .await;
        assert_eq!(signed.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_generate() {
        let disabled = app(HashMap::new(), None);
        let response = post(&disabled, "/api/v1/generate", json!({"prompt": "spring sale"})).await;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);

        let limiter = Arc::new(RateLimiter::new(LimiterClass::AiGeneration, 0.01, 1, None));
        let generator: Arc<dyn ContentGenerator> = Arc::new(ThrottledGenerator::new(
            Arc::new(Canned),
            limiter,
            Duration::from_millis(20),
        ));
        let enabled = app(HashMap::new(), Some(generator));

        let first = post(
            &enabled,
            "/api/v1/generate",
            json!({"prompt": "spring sale", "tone": "friendly"}),
        )
        .await;
        assert_eq!(first.json::<GeneratedContent>().confidence, 0.9);

        let throttled = post(&enabled, "/api/v1/generate", json!({"prompt": "spring sale"})).await;
        assert_eq!(throttled.status, StatusCode::TOO_MANY_REQUESTS);
    }
}
