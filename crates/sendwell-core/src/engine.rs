//! Component wiring shared by the API and the delivery worker

use crate::delivery::{AudienceResolver, CampaignManager, StoredAudienceResolver};
use crate::metrics::Metrics;
use crate::tracking::{CampaignAggregator, EventNormalizer, EventProcessor, IdempotencyLedger};
use sendwell_common::config::TrackingConfig;
use sendwell_storage::Repositories;
use std::sync::Arc;
use std::time::Duration;

/// Tracking pipeline and campaign lifecycle over one set of repositories
#[derive(Clone)]
pub struct Engine {
    pub normalizer: EventNormalizer,
    pub ledger: Arc<IdempotencyLedger>,
    pub aggregator: Arc<CampaignAggregator>,
    pub processor: Arc<EventProcessor>,
    pub manager: Arc<CampaignManager>,
}

impl Engine {
    pub fn new(repos: &Repositories, tracking: &TrackingConfig, metrics: Metrics) -> Self {
        Self::with_resolver(repos, tracking, metrics, Arc::new(StoredAudienceResolver))
    }

    pub fn with_resolver(
        repos: &Repositories,
        tracking: &TrackingConfig,
        metrics: Metrics,
        resolver: Arc<dyn AudienceResolver>,
    ) -> Self {
        let normalizer = EventNormalizer::new(Duration::from_secs(tracking.dedup_bucket_secs));
        let ledger = Arc::new(IdempotencyLedger::new(
            repos.idempotency.clone(),
            chrono::Duration::days(tracking.ledger_retention_days),
        ));
        let aggregator = Arc::new(CampaignAggregator::new(repos.campaigns.clone()));
        let processor = Arc::new(
            EventProcessor::new(ledger.clone(), repos.recipients.clone(), aggregator.clone())
                .with_metrics(metrics),
        );
        let manager = Arc::new(CampaignManager::new(
            repos.campaigns.clone(),
            repos.recipients.clone(),
            resolver,
            aggregator.clone(),
        ));

        Self {
            normalizer,
            ledger,
            aggregator,
            processor,
            manager,
        }
    }
}
