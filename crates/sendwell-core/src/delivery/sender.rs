//! Recipient Sender - One claimed recipient through limiter and transport
//!
//! The outcome of a send is recorded the same way a provider webhook is:
//! as an internal `sent` or `bounced` event through the event processor.

use super::rate_limiter::RateLimiter;
use super::retry::RetryPolicy;
use super::transport::{OutboundEmail, SendError, Transport};
use crate::metrics::Metrics;
use crate::tracking::{DeliveryEvent, EventKind, EventProcessor};
use chrono::Utc;
use sendwell_common::types::CampaignStatus;
use sendwell_storage::models::{Campaign, CampaignRecipient};
use sendwell_storage::repository::{CampaignRepository, RecipientRepository};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Bounce reason recorded when the transport refuses a recipient
pub const SEND_REJECTED: &str = "SendRejected";

const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Accepted by the transport
    Sent { message_id: String },
    /// Refused for good, or out of retries
    Bounced { reason: String },
    /// Transient failure, will be retried
    Retrying { attempt: i32 },
    /// Lease given back without consuming an attempt
    Deferred,
    /// Campaign no longer sending
    Skipped,
}

impl SendOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SendOutcome::Sent { .. } => "sent",
            SendOutcome::Bounced { .. } => "bounced",
            SendOutcome::Retrying { .. } => "retrying",
            SendOutcome::Deferred => "deferred",
            SendOutcome::Skipped => "skipped",
        }
    }
}

/// Sends to claimed recipients
pub struct RecipientSender {
    campaigns: Arc<dyn CampaignRepository>,
    recipients: Arc<dyn RecipientRepository>,
    processor: Arc<EventProcessor>,
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    acquire_timeout: Duration,
    default_from: String,
    metrics: Option<Metrics>,
}

impl RecipientSender {
    pub fn new(
        campaigns: Arc<dyn CampaignRepository>,
        recipients: Arc<dyn RecipientRepository>,
        processor: Arc<EventProcessor>,
        transport: Arc<dyn Transport>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            campaigns,
            recipients,
            processor,
            transport,
            limiter,
            retry: RetryPolicy::default(),
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            default_from: "noreply@localhost".to_string(),
            metrics: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_default_from(mut self, from: impl Into<String>) -> Self {
        self.default_from = from.into();
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Deliver to a recipient this worker holds the lease on
    pub async fn deliver(&self, campaign: &Campaign, recipient: CampaignRecipient) -> SendOutcome {
        let outcome = self.deliver_inner(campaign, recipient).await;
        if let Some(metrics) = &self.metrics {
            metrics.send(outcome.label());
        }
        outcome
    }

    async fn deliver_inner(&self, campaign: &Campaign, recipient: CampaignRecipient) -> SendOutcome {
        // Sent before but the `sent` event never landed: record it, do not resend
        if let Some(message_id) = recipient.provider_message_id.clone() {
            info!(recipient_id = %recipient.id, "Recording earlier send of {}", message_id);
            self.record(&recipient, EventKind::Sent, None).await;
            return SendOutcome::Sent { message_id };
        }

        // Out of attempts but the bounce never landed: record it, do not resend
        if self.retry.exhausted(recipient.attempts) {
            let reason = recipient
                .last_error
                .clone()
                .unwrap_or_else(|| SEND_REJECTED.to_string());
            info!(recipient_id = %recipient.id, "Recording earlier bounce: {}", reason);
            return self.bounce(&recipient, recipient.attempts, &reason).await;
        }

        let _permit = match self.limiter.acquire(self.acquire_timeout).await {
            Ok(permit) => permit,
            Err(e) => {
                warn!(recipient_id = %recipient.id, "{}", e);
                if let Some(metrics) = &self.metrics {
                    metrics.rate_limit_timeout(self.limiter.class().as_str());
                }
                self.release(&recipient).await;
                return SendOutcome::Deferred;
            }
        };

        // Pause and cancel take effect before the next send
        match self.campaigns.get(campaign.id).await {
            Ok(Some(current)) if current.status_enum() == Some(CampaignStatus::Sending) => {}
            Ok(_) => {
                debug!(campaign_id = %campaign.id, "Campaign no longer sending, skipping {}", recipient.email);
                self.release(&recipient).await;
                return SendOutcome::Skipped;
            }
            Err(e) => {
                error!("Error re-checking campaign {}: {}", campaign.id, e);
                self.release(&recipient).await;
                return SendOutcome::Deferred;
            }
        }

        let email = OutboundEmail::for_recipient(campaign, &recipient, &self.default_from);
        match self.transport.send(&email).await {
            Ok(message_id) => {
                if let Err(e) = self
                    .recipients
                    .set_provider_message_id(recipient.id, &message_id)
                    .await
                {
                    error!("Error storing message id for recipient {}: {}", recipient.id, e);
                }
                self.record(&recipient, EventKind::Sent, None).await;
                debug!(recipient_id = %recipient.id, "Sent as {}", message_id);
                SendOutcome::Sent { message_id }
            }
            Err(SendError::Permanent(reason)) => {
                warn!(recipient_id = %recipient.id, "Send rejected: {}", reason);
                self.bounce(&recipient, recipient.attempts + 1, &reason).await
            }
            Err(SendError::Transient(reason)) => {
                let attempt = recipient.attempts + 1;
                if self.retry.exhausted(attempt) {
                    warn!(
                        recipient_id = %recipient.id,
                        attempt,
                        "Giving up after transient failure: {}", reason
                    );
                    return self.bounce(&recipient, attempt, &reason).await;
                }

                let delay = self.retry.backoff(attempt);
                let next_attempt_at = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::hours(1));
                debug!(
                    recipient_id = %recipient.id,
                    attempt,
                    "Transient failure, retrying in {:?}: {}", delay, reason
                );
                if let Err(e) = self
                    .recipients
                    .reschedule(recipient.id, attempt, next_attempt_at, &reason)
                    .await
                {
                    error!("Error rescheduling recipient {}: {}", recipient.id, e);
                }
                SendOutcome::Retrying { attempt }
            }
        }
    }

    async fn bounce(&self, recipient: &CampaignRecipient, attempts: i32, reason: &str) -> SendOutcome {
        if self.record(recipient, EventKind::Bounced, Some(SEND_REJECTED)).await {
            // Bookkeeping only; the recipient is no longer pending
            if let Err(e) = self
                .recipients
                .reschedule(recipient.id, attempts, Utc::now(), reason)
                .await
            {
                error!("Error recording failure for recipient {}: {}", recipient.id, e);
            }
            return SendOutcome::Bounced {
                reason: SEND_REJECTED.to_string(),
            };
        }

        // Still pending: keep it out of the next claims for a backoff period,
        // with attempts used up so the retry records the bounce without sending
        let attempts = attempts.max(self.retry.max_attempts);
        let delay = self.retry.backoff(attempts);
        let next_attempt_at =
            Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::hours(1));
        warn!(
            recipient_id = %recipient.id,
            "Bounce not recorded, retrying in {:?}", delay
        );
        if let Err(e) = self
            .recipients
            .reschedule(recipient.id, attempts, next_attempt_at, reason)
            .await
        {
            error!("Error rescheduling recipient {}: {}", recipient.id, e);
        }
        SendOutcome::Retrying { attempt: attempts }
    }

    /// Apply an internal event. False when it could not be applied.
    async fn record(&self, recipient: &CampaignRecipient, kind: EventKind, bounce_reason: Option<&str>) -> bool {
        let mut event = DeliveryEvent::internal(kind, recipient.campaign_id, recipient.id, Utc::now());
        if let Some(reason) = bounce_reason {
            event = event.with_bounce_reason(reason);
        }
        match self.processor.process(&event).await {
            Ok(_) => true,
            Err(e) => {
                error!(
                    recipient_id = %recipient.id,
                    "Error recording {} event: {}", kind, e
                );
                false
            }
        }
    }

    async fn release(&self, recipient: &CampaignRecipient) {
        if let Err(e) = self.recipients.release_claim(recipient.id).await {
            error!("Error releasing claim on recipient {}: {}", recipient.id, e);
        }
    }
}
