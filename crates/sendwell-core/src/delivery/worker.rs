//! Delivery Worker - Background loop that moves campaigns forward
//!
//! Each cycle:
//! 1. dispatches scheduled campaigns that are due
//! 2. claims pending recipients of sending campaigns and sends to them
//! 3. completes sending campaigns with nothing left pending
//! 4. every maintenance interval, reconciles dirty counters and purges the
//!    idempotency ledger

use super::orchestrator::CampaignManager;
use super::sender::{RecipientSender, SendOutcome};
use crate::tracking::{CampaignAggregator, IdempotencyLedger};
use chrono::Utc;
use sendwell_common::config::{DeliveryConfig, TrackingConfig};
use sendwell_common::types::CampaignStatus;
use sendwell_common::Result;
use sendwell_storage::models::Campaign;
use sendwell_storage::repository::{CampaignRepository, RecipientRepository};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// What one cycle did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub dispatched: usize,
    pub sent: usize,
    pub bounced: usize,
    pub retrying: usize,
    pub deferred: usize,
    pub completed: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: &SendOutcome) {
        match outcome {
            SendOutcome::Sent { .. } => self.sent += 1,
            SendOutcome::Bounced { .. } => self.bounced += 1,
            SendOutcome::Retrying { .. } => self.retrying += 1,
            SendOutcome::Deferred | SendOutcome::Skipped => self.deferred += 1,
        }
    }
}

/// Delivery Worker
pub struct DeliveryWorker {
    manager: Arc<CampaignManager>,
    campaigns: Arc<dyn CampaignRepository>,
    recipients: Arc<dyn RecipientRepository>,
    sender: Arc<RecipientSender>,
    aggregator: Arc<CampaignAggregator>,
    ledger: Arc<IdempotencyLedger>,
    /// Maximum concurrent sends
    concurrency_limit: usize,
    /// Recipients claimed per campaign per cycle
    batch_size: i64,
    /// Interval between processing cycles (seconds)
    poll_interval_secs: u64,
    /// How long a claimed recipient stays reserved
    claim_lease: chrono::Duration,
    maintenance_interval: Duration,
    last_maintenance: Mutex<Option<Instant>>,
}

impl DeliveryWorker {
    pub fn new(
        manager: Arc<CampaignManager>,
        campaigns: Arc<dyn CampaignRepository>,
        recipients: Arc<dyn RecipientRepository>,
        sender: Arc<RecipientSender>,
        aggregator: Arc<CampaignAggregator>,
        ledger: Arc<IdempotencyLedger>,
    ) -> Self {
        Self {
            manager,
            campaigns,
            recipients,
            sender,
            aggregator,
            ledger,
            concurrency_limit: 10,
            batch_size: 100,
            poll_interval_secs: 5,
            claim_lease: chrono::Duration::minutes(5),
            maintenance_interval: Duration::from_secs(300),
            last_maintenance: Mutex::new(None),
        }
    }

    /// Apply the `[delivery]` and `[tracking]` settings
    pub fn configure(self, delivery: &DeliveryConfig, tracking: &TrackingConfig) -> Self {
        self.with_concurrency_limit(delivery.concurrency)
            .with_batch_size(delivery.batch_size)
            .with_poll_interval(delivery.poll_interval_secs)
            .with_claim_lease(chrono::Duration::seconds(delivery.claim_lease_secs))
            .with_maintenance_interval(Duration::from_secs(tracking.reconcile_interval_secs))
    }

    /// Set concurrency limit
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit.max(1);
        self
    }

    /// Set batch size
    pub fn with_batch_size(mut self, size: i64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set poll interval
    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs.max(1);
        self
    }

    pub fn with_claim_lease(mut self, lease: chrono::Duration) -> Self {
        self.claim_lease = lease;
        self
    }

    pub fn with_maintenance_interval(mut self, every: Duration) -> Self {
        self.maintenance_interval = every;
        self
    }

    /// Run until `shutdown` is signalled or its sender dropped
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(Duration::from_secs(self.poll_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let semaphore = Arc::new(Semaphore::new(self.concurrency_limit));

        info!(
            "Delivery worker started (concurrency: {}, batch: {}, interval: {}s)",
            self.concurrency_limit, self.batch_size, self.poll_interval_secs
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            let report = self.run_cycle(&semaphore).await;
            if report != CycleReport::default() {
                debug!(?report, "Delivery cycle finished");
            }
        }

        info!("Delivery worker stopped");
    }

    /// One pass over all campaign work. Step failures are logged and do
    /// not stop later steps.
    pub async fn run_cycle(&self, semaphore: &Arc<Semaphore>) -> CycleReport {
        let mut report = CycleReport::default();

        match self.start_due_campaigns().await {
            Ok(n) => report.dispatched = n,
            Err(e) => error!("Error starting scheduled campaigns: {}", e),
        }

        match self.campaigns.list_by_status(CampaignStatus::Sending).await {
            Ok(sending) => {
                for campaign in &sending {
                    if let Err(e) = self.process_campaign(campaign, semaphore, &mut report).await {
                        error!("Error processing campaign {}: {}", campaign.id, e);
                    }
                }

                // Check for campaign completions
                for campaign in &sending {
                    match self.manager.check_completion(campaign.id).await {
                        Ok(Some(_)) => report.completed += 1,
                        Ok(None) => {}
                        Err(e) => error!("Error checking completion of campaign {}: {}", campaign.id, e),
                    }
                }
            }
            Err(e) => error!("Error listing sending campaigns: {}", e),
        }

        self.maintain().await;
        report
    }

    async fn start_due_campaigns(&self) -> Result<usize> {
        let due = self.campaigns.list_due(Utc::now()).await?;
        let mut started = 0;
        for campaign in due {
            match self.manager.dispatch(campaign.id).await {
                Ok(_) => started += 1,
                Err(e) => warn!("Failed to dispatch campaign {}: {}", campaign.id, e),
            }
        }
        Ok(started)
    }

    /// Claim a batch of due recipients and send to them concurrently
    async fn process_campaign(
        &self,
        campaign: &Campaign,
        semaphore: &Arc<Semaphore>,
        report: &mut CycleReport,
    ) -> Result<()> {
        let now = Utc::now();
        let claimed = self
            .recipients
            .claim_pending(campaign.id, self.batch_size, now, now + self.claim_lease)
            .await?;

        if claimed.is_empty() {
            return Ok(());
        }

        debug!(campaign_id = %campaign.id, "Sending to {} recipients", claimed.len());

        let campaign = Arc::new(campaign.clone());
        let mut handles = Vec::with_capacity(claimed.len());

        for recipient in claimed {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| sendwell_common::Error::Internal(e.to_string()))?;
            let sender = self.sender.clone();
            let campaign = campaign.clone();

            handles.push(tokio::spawn(async move {
                let outcome = sender.deliver(&campaign, recipient).await;
                drop(permit);
                outcome
            }));
        }

        // Wait for all tasks to complete
        for handle in handles {
            match handle.await {
                Ok(outcome) => report.record(&outcome),
                Err(e) => error!("Send task error: {}", e),
            }
        }

        Ok(())
    }

    /// Counter reconciliation and ledger expiry, at most once per interval
    async fn maintain(&self) {
        let mut last = self.last_maintenance.lock().await;
        if last.map_or(false, |at| at.elapsed() < self.maintenance_interval) {
            return;
        }
        *last = Some(Instant::now());

        if let Err(e) = self.aggregator.reconcile_dirty().await {
            warn!("Error reconciling campaign counters: {}", e);
        }
        if let Err(e) = self.ledger.purge().await {
            warn!("Error purging idempotency ledger: {}", e);
        }
    }
}
