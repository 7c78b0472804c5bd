//! Canonical delivery events

use chrono::{DateTime, Utc};
use sendwell_common::types::{CampaignId, RecipientId, RecipientStatus};
use serde::{Deserialize, Serialize};

/// Canonical event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Accepted by the outbound transport; only produced internally
    Sent,
    Delivered,
    Opened,
    Clicked,
    Bounced,
    Unsubscribed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Sent => "sent",
            EventKind::Delivered => "delivered",
            EventKind::Opened => "opened",
            EventKind::Clicked => "clicked",
            EventKind::Bounced => "bounced",
            EventKind::Unsubscribed => "unsubscribed",
        }
    }

    /// Recipient milestone this event reaches
    pub fn milestone(&self) -> RecipientStatus {
        match self {
            EventKind::Sent => RecipientStatus::Sent,
            EventKind::Delivered => RecipientStatus::Delivered,
            EventKind::Opened => RecipientStatus::Opened,
            EventKind::Clicked => RecipientStatus::Clicked,
            EventKind::Bounced => RecipientStatus::Bounced,
            EventKind::Unsubscribed => RecipientStatus::Unsubscribed,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an event identifies its recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientRef {
    Id(RecipientId),
    /// Provider-assigned message id, looked up in the store
    MessageId(String),
}

impl std::fmt::Display for RecipientRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecipientRef::Id(id) => write!(f, "{}", id),
            RecipientRef::MessageId(mid) => write!(f, "message-id {}", mid),
        }
    }
}

/// One provider event, normalized
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryEvent {
    pub kind: EventKind,
    pub campaign_id: Option<CampaignId>,
    pub recipient: RecipientRef,
    pub dedup_key: String,
    pub occurred_at: DateTime<Utc>,
    pub bounce_reason: Option<String>,
    pub url: Option<String>,
}

impl DeliveryEvent {
    /// An event raised by the delivery path itself rather than a provider
    pub fn internal(
        kind: EventKind,
        campaign_id: CampaignId,
        recipient_id: RecipientId,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            campaign_id: Some(campaign_id),
            recipient: RecipientRef::Id(recipient_id),
            dedup_key: format!("internal:{}:{}", recipient_id, kind),
            occurred_at,
            bounce_reason: None,
            url: None,
        }
    }

    pub fn with_bounce_reason(mut self, reason: impl Into<String>) -> Self {
        self.bounce_reason = Some(reason.into());
        self
    }
}
