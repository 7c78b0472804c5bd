//! Event Processor - ledger, then state machine, then aggregator
//!
//! Every event, whether from a provider webhook or from the delivery path,
//! is applied here. The ledger key is released again if the recipient write
//! fails, so the provider's retry can apply it. A failed counter update only
//! flags the campaign for reconciliation.

use super::aggregator::CampaignAggregator;
use super::event::{DeliveryEvent, RecipientRef};
use super::ledger::{IdempotencyLedger, LedgerOutcome};
use super::normalizer::{NormalizeError, NormalizedItem};
use super::state_machine::{apply_event, Transition};
use crate::metrics::Metrics;
use sendwell_common::{Error, Result};
use sendwell_storage::models::{CampaignRecipient, CounterDelta};
use sendwell_storage::repository::RecipientRepository;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};

const DEFAULT_CONFLICT_RETRIES: usize = 5;

/// What happened to one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The recipient changed; `delta` may be empty for repeat engagement
    Applied { delta: CounterDelta },
    /// Valid, but behind the recipient's state or absorbed by a terminal one
    NoOp,
    Duplicate,
    UnknownRecipient,
}

impl ProcessOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ProcessOutcome::Applied { .. } => "applied",
            ProcessOutcome::NoOp => "noop",
            ProcessOutcome::Duplicate => "duplicate",
            ProcessOutcome::UnknownRecipient => "unknown_recipient",
        }
    }
}

/// Per-request tally returned to webhook callers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub accepted: usize,
    pub duplicates: usize,
    pub ignored: usize,
    pub rejected: usize,
}

/// Applies delivery events end to end
pub struct EventProcessor {
    ledger: Arc<IdempotencyLedger>,
    recipients: Arc<dyn RecipientRepository>,
    aggregator: Arc<CampaignAggregator>,
    metrics: Option<Metrics>,
    conflict_retries: usize,
}

impl EventProcessor {
    pub fn new(
        ledger: Arc<IdempotencyLedger>,
        recipients: Arc<dyn RecipientRepository>,
        aggregator: Arc<CampaignAggregator>,
    ) -> Self {
        Self {
            ledger,
            recipients,
            aggregator,
            metrics: None,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn ledger(&self) -> &Arc<IdempotencyLedger> {
        &self.ledger
    }

    pub fn aggregator(&self) -> &Arc<CampaignAggregator> {
        &self.aggregator
    }

    /// Apply one event
    pub async fn process(&self, event: &DeliveryEvent) -> Result<ProcessOutcome> {
        let outcome = self.process_inner(event).await;
        if let (Some(metrics), Ok(outcome)) = (&self.metrics, &outcome) {
            let source = event.dedup_key.split(':').next().unwrap_or("unknown");
            metrics.event(source, outcome.label());
        }
        outcome
    }

    async fn process_inner(&self, event: &DeliveryEvent) -> Result<ProcessOutcome> {
        let Some(recipient) = self.resolve(event).await? else {
            warn!(
                recipient = %event.recipient,
                event = %event.kind,
                "Event for unknown recipient dropped"
            );
            return Ok(ProcessOutcome::UnknownRecipient);
        };

        if let Some(campaign_id) = event.campaign_id {
            if campaign_id != recipient.campaign_id {
                warn!(
                    recipient_id = %recipient.id,
                    event_campaign = %campaign_id,
                    "Event campaign does not own recipient, dropped"
                );
                return Ok(ProcessOutcome::UnknownRecipient);
            }
        }

        if self.ledger.record(&event.dedup_key).await? == LedgerOutcome::AlreadyApplied {
            return Ok(ProcessOutcome::Duplicate);
        }

        let campaign_id = recipient.campaign_id;
        let transition = match self.transition(recipient, event).await {
            Ok(t) => t,
            Err(e) => {
                if let Err(release_err) = self.ledger.release(&event.dedup_key).await {
                    error!(
                        dedup_key = %event.dedup_key,
                        "Failed to release dedup key after failed apply: {}", release_err
                    );
                }
                return Err(e);
            }
        };

        let Some(transition) = transition else {
            return Ok(ProcessOutcome::NoOp);
        };

        debug!(
            recipient_id = %transition.recipient.id,
            from = %transition.from,
            to = %transition.to,
            "Recipient transition applied"
        );

        if let Err(e) = self.aggregator.apply_delta(campaign_id, transition.delta).await {
            warn!(
                campaign_id = %campaign_id,
                "Counter update failed, campaign marked for recompute: {}", e
            );
            if let Err(e) = self.aggregator.mark_dirty(campaign_id).await {
                error!(campaign_id = %campaign_id, "Failed to mark campaign dirty: {}", e);
            }
        }

        Ok(ProcessOutcome::Applied {
            delta: transition.delta,
        })
    }

    /// Apply a webhook batch, tallying each item. Store failures abort the
    /// batch so the provider retries it.
    pub async fn process_batch(&self, items: Vec<NormalizedItem>) -> Result<BatchSummary> {
        let mut summary = BatchSummary::default();

        for item in items {
            match item {
                Ok(event) => match self.process(&event).await? {
                    ProcessOutcome::Applied { .. } | ProcessOutcome::NoOp => summary.accepted += 1,
                    ProcessOutcome::Duplicate => summary.duplicates += 1,
                    ProcessOutcome::UnknownRecipient => summary.ignored += 1,
                },
                Err(NormalizeError::UnsupportedEventType(kind)) => {
                    debug!("Ignoring unsupported event type {}", kind);
                    summary.ignored += 1;
                }
                Err(NormalizeError::Malformed(reason)) => {
                    warn!("Dropping malformed event: {}", reason);
                    summary.rejected += 1;
                }
            }
        }

        Ok(summary)
    }

    async fn resolve(&self, event: &DeliveryEvent) -> Result<Option<CampaignRecipient>> {
        match &event.recipient {
            RecipientRef::Id(id) => self.recipients.get(*id).await,
            RecipientRef::MessageId(mid) => self.recipients.find_by_message_id(mid).await,
        }
    }

    /// Optimistic write loop: reload and re-apply when another writer won
    async fn transition(
        &self,
        mut recipient: CampaignRecipient,
        event: &DeliveryEvent,
    ) -> Result<Option<Transition>> {
        for _ in 0..=self.conflict_retries {
            let Some(transition) = apply_event(&recipient, event)? else {
                return Ok(None);
            };

            if self.recipients.save(&transition.recipient).await? {
                return Ok(Some(transition));
            }

            debug!(recipient_id = %recipient.id, "Version conflict, retrying transition");
            recipient = self
                .recipients
                .get(recipient.id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("recipient {}", recipient.id)))?;
        }

        Err(Error::Conflict(format!(
            "recipient {} changed concurrently too many times",
            recipient.id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::event::EventKind;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;
    use sendwell_common::types::CampaignId;
    use sendwell_storage::models::CreateCampaign;
    use sendwell_storage::repository::CampaignRepository;
    use sendwell_storage::MemoryStore;
    use uuid::Uuid;

    struct Fixture {
        store: MemoryStore,
        processor: EventProcessor,
        campaign_id: CampaignId,
        recipients: Vec<CampaignRecipient>,
    }

    async fn fixture(emails: &[&str]) -> Fixture {
        let store = MemoryStore::new();
        let campaign = CampaignRepository::create(
            &store,
            CreateCampaign {
                user_id: Uuid::new_v4(),
                name: "Fixture".into(),
                subject: "Hi".into(),
                text_body: Some("Body".into()),
                audience: emails.iter().map(|e| e.to_string()).collect(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        store.schedule(campaign.id, Utc::now()).await.unwrap();
        store
            .start_sending(campaign.id, &campaign.audience)
            .await
            .unwrap();

        let recipients = store
            .list_by_campaign(campaign.id, None, 100, 0)
            .await
            .unwrap();
        let ledger = Arc::new(IdempotencyLedger::new(
            Arc::new(store.clone()),
            Duration::days(30),
        ));
        let aggregator = Arc::new(CampaignAggregator::new(Arc::new(store.clone())));
        let processor = EventProcessor::new(ledger, Arc::new(store.clone()), aggregator);

        Fixture {
            store,
            processor,
            campaign_id: campaign.id,
            recipients,
        }
    }

    fn event(recipient: &CampaignRecipient, kind: EventKind, key: &str) -> DeliveryEvent {
        DeliveryEvent {
            kind,
            campaign_id: Some(recipient.campaign_id),
            recipient: RecipientRef::Id(recipient.id),
            dedup_key: format!("generic:{}", key),
            occurred_at: Utc::now(),
            bounce_reason: None,
            url: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_event_has_no_effect() {
        let f = fixture(&["a@example.com"]).await;
        let r = &f.recipients[0];

        let first = f.processor.process(&event(r, EventKind::Opened, "k1")).await.unwrap();
        let second = f.processor.process(&event(r, EventKind::Opened, "k1")).await.unwrap();

        assert!(matches!(first, ProcessOutcome::Applied { .. }));
        assert_eq!(second, ProcessOutcome::Duplicate);

        let campaign = CampaignRepository::get(&f.store, f.campaign_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(campaign.opened_count, 1);
        let stored = RecipientRepository::get(&f.store, r.id).await.unwrap().unwrap();
        assert_eq!(stored.open_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_recipient_is_ignored() {
        let f = fixture(&["a@example.com"]).await;
        let mut e = event(&f.recipients[0], EventKind::Delivered, "k");
        e.recipient = RecipientRef::MessageId("missing".into());

        assert_eq!(
            f.processor.process(&e).await.unwrap(),
            ProcessOutcome::UnknownRecipient
        );
        // The key was never recorded, so a later retry can still apply
        assert_eq!(
            f.processor.ledger().record(&e.dedup_key).await.unwrap(),
            LedgerOutcome::Applied
        );
    }

    #[tokio::test]
    async fn test_resolves_by_message_id() {
        let f = fixture(&["a@example.com"]).await;
        let r = &f.recipients[0];
        f.store.set_provider_message_id(r.id, "msg-1").await.unwrap();

        let mut e = event(r, EventKind::Delivered, "k");
        e.recipient = RecipientRef::MessageId("msg-1".into());
        e.campaign_id = None;

        let outcome = f.processor.process(&e).await.unwrap();
        assert_eq!(
            outcome,
            ProcessOutcome::Applied {
                delta: CounterDelta {
                    sent: 1,
                    delivered: 1,
                    ..Default::default()
                }
            }
        );
    }

    #[tokio::test]
    async fn test_concurrent_distinct_events_commute() {
        let f = fixture(&["a@example.com"]).await;
        let processor = Arc::new(f.processor);
        let r = f.recipients[0].clone();

        let kinds = [
            EventKind::Delivered,
            EventKind::Opened,
            EventKind::Clicked,
            EventKind::Opened,
        ];
        let mut handles = Vec::new();
        for (i, kind) in kinds.into_iter().enumerate() {
            let processor = processor.clone();
            let e = event(&r, kind, &format!("k{}", i));
            handles.push(tokio::spawn(async move { processor.process(&e).await.unwrap() }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let stored = RecipientRepository::get(&f.store, r.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "clicked");

        let before = CampaignRepository::get(&f.store, f.campaign_id)
            .await
            .unwrap()
            .unwrap()
            .counters();
        let after = f
            .store
            .recompute_counters(f.campaign_id)
            .await
            .unwrap()
            .unwrap()
            .counters();
        assert_eq!(before, after);
        assert_eq!(after.opened_count, 1);
        assert_eq!(after.clicked_count, 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_keeps_reached_milestones() {
        let f = fixture(&["a@example.com", "b@example.com"]).await;
        let a = &f.recipients[0];
        let b = &f.recipients[1];

        for (i, kind) in [EventKind::Opened, EventKind::Unsubscribed].into_iter().enumerate() {
            f.processor.process(&event(a, kind, &format!("a{}", i))).await.unwrap();
        }
        f.processor.process(&event(b, EventKind::Opened, "b0")).await.unwrap();

        let stored = RecipientRepository::get(&f.store, a.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "unsubscribed");

        let incremental = CampaignRepository::get(&f.store, f.campaign_id)
            .await
            .unwrap()
            .unwrap()
            .counters();
        let exact = f
            .store
            .recompute_counters(f.campaign_id)
            .await
            .unwrap()
            .unwrap()
            .counters();
        assert_eq!(incremental, exact);
        // Only b is still in an opened state, but a reached the milestone too
        assert_eq!(exact.opened_count, 2);
        assert_eq!(exact.unsubscribed_count, 1);
    }

    #[tokio::test]
    async fn test_batch_summary() {
        let f = fixture(&["a@example.com", "b@example.com"]).await;
        let a = &f.recipients[0];
        let b = &f.recipients[1];

        let summary = f
            .processor
            .process_batch(vec![
                Ok(event(a, EventKind::Delivered, "1")),
                Ok(event(a, EventKind::Delivered, "1")),
                Ok(event(b, EventKind::Bounced, "2")),
                Ok(event(b, EventKind::Opened, "3")),
                Err(NormalizeError::UnsupportedEventType("deferred".into())),
                Err(NormalizeError::Malformed("bad".into())),
            ])
            .await
            .unwrap();

        assert_eq!(
            summary,
            BatchSummary {
                accepted: 3,
                duplicates: 1,
                ignored: 1,
                rejected: 1,
            }
        );
    }
}
