//! Database models

use chrono::{DateTime, Utc};
use sendwell_common::types::{CampaignId, CampaignStatus, RecipientId, RecipientStatus, UserId};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Campaign model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub user_id: UserId,
    pub name: String,
    pub subject: String,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub from_address: Option<String>,
    pub from_name: Option<String>,
    /// Addresses resolved into recipients at dispatch
    pub audience: Vec<String>,
    pub ai_generated: bool,
    pub status: String,
    pub recipient_count: i32,
    pub sent_count: i32,
    pub delivered_count: i32,
    pub opened_count: i32,
    pub clicked_count: i32,
    pub bounced_count: i32,
    pub unsubscribed_count: i32,
    /// Set when a counter update was lost; cleared by a recompute
    pub counters_dirty: bool,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Get status enum
    pub fn status_enum(&self) -> Option<CampaignStatus> {
        self.status.parse().ok()
    }

    pub fn has_content(&self) -> bool {
        let filled = |s: &Option<String>| s.as_deref().map_or(false, |s| !s.trim().is_empty());
        filled(&self.html_body) || filled(&self.text_body)
    }

    /// Current counters
    pub fn counters(&self) -> CampaignCounters {
        CampaignCounters {
            recipient_count: self.recipient_count,
            sent_count: self.sent_count,
            delivered_count: self.delivered_count,
            opened_count: self.opened_count,
            clicked_count: self.clicked_count,
            bounced_count: self.bounced_count,
            unsubscribed_count: self.unsubscribed_count,
        }
    }
}

/// Create campaign input
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateCampaign {
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub subject: String,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub from_address: Option<String>,
    pub from_name: Option<String>,
    #[serde(default)]
    pub audience: Vec<String>,
    #[serde(default)]
    pub ai_generated: bool,
}

/// Snapshot of a campaign's derived counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignCounters {
    pub recipient_count: i32,
    pub sent_count: i32,
    pub delivered_count: i32,
    pub opened_count: i32,
    pub clicked_count: i32,
    pub bounced_count: i32,
    pub unsubscribed_count: i32,
}

/// Additive change to a campaign's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDelta {
    pub sent: i32,
    pub delivered: i32,
    pub opened: i32,
    pub clicked: i32,
    pub bounced: i32,
    pub unsubscribed: i32,
}

impl CounterDelta {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Delta for a newly reached milestone
    pub fn milestone(status: RecipientStatus) -> Self {
        let mut delta = Self::default();
        match status {
            RecipientStatus::Pending => {}
            RecipientStatus::Sent => delta.sent = 1,
            RecipientStatus::Delivered => delta.delivered = 1,
            RecipientStatus::Opened => delta.opened = 1,
            RecipientStatus::Clicked => delta.clicked = 1,
            RecipientStatus::Bounced => delta.bounced = 1,
            RecipientStatus::Unsubscribed => delta.unsubscribed = 1,
        }
        delta
    }
}

impl std::ops::Add for CounterDelta {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            sent: self.sent + rhs.sent,
            delivered: self.delivered + rhs.delivered,
            opened: self.opened + rhs.opened,
            clicked: self.clicked + rhs.clicked,
            bounced: self.bounced + rhs.bounced,
            unsubscribed: self.unsubscribed + rhs.unsubscribed,
        }
    }
}

impl std::ops::Sub for CounterDelta {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            sent: self.sent - rhs.sent,
            delivered: self.delivered - rhs.delivered,
            opened: self.opened - rhs.opened,
            clicked: self.clicked - rhs.clicked,
            bounced: self.bounced - rhs.bounced,
            unsubscribed: self.unsubscribed - rhs.unsubscribed,
        }
    }
}

/// Campaign recipient model
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct CampaignRecipient {
    pub id: RecipientId,
    pub campaign_id: CampaignId,
    pub email: String,
    pub status: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub bounced_at: Option<DateTime<Utc>>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub open_count: i32,
    pub click_count: i32,
    pub last_opened_at: Option<DateTime<Utc>>,
    pub last_clicked_at: Option<DateTime<Utc>>,
    pub bounce_reason: Option<String>,
    pub last_click_url: Option<String>,
    pub provider_message_id: Option<String>,
    pub attempts: i32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub claimed_until: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped on every write
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CampaignRecipient {
    /// A fresh pending recipient
    pub fn pending(campaign_id: CampaignId, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::now_v7(),
            campaign_id,
            email: email.into(),
            status: RecipientStatus::Pending.to_string(),
            sent_at: None,
            delivered_at: None,
            opened_at: None,
            clicked_at: None,
            bounced_at: None,
            unsubscribed_at: None,
            open_count: 0,
            click_count: 0,
            last_opened_at: None,
            last_clicked_at: None,
            bounce_reason: None,
            last_click_url: None,
            provider_message_id: None,
            attempts: 0,
            next_attempt_at: None,
            last_error: None,
            claimed_until: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Get status enum
    pub fn status_enum(&self) -> Option<RecipientStatus> {
        self.status.parse().ok()
    }

    /// Timestamp recorded for a milestone, if reached
    pub fn milestone_at(&self, status: RecipientStatus) -> Option<DateTime<Utc>> {
        match status {
            RecipientStatus::Pending => None,
            RecipientStatus::Sent => self.sent_at,
            RecipientStatus::Delivered => self.delivered_at,
            RecipientStatus::Opened => self.opened_at,
            RecipientStatus::Clicked => self.clicked_at,
            RecipientStatus::Bounced => self.bounced_at,
            RecipientStatus::Unsubscribed => self.unsubscribed_at,
        }
    }

    /// Counter contribution of this recipient, one per reached milestone
    pub fn milestone_delta(&self) -> CounterDelta {
        let hit = |t: Option<DateTime<Utc>>| i32::from(t.is_some());
        CounterDelta {
            sent: hit(self.sent_at),
            delivered: hit(self.delivered_at),
            opened: hit(self.opened_at),
            clicked: hit(self.clicked_at),
            bounced: hit(self.bounced_at),
            unsubscribed: hit(self.unsubscribed_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_counter_delta_add() {
        let delta = CounterDelta::milestone(RecipientStatus::Sent)
            + CounterDelta::milestone(RecipientStatus::Opened);
        assert_eq!(
            delta,
            CounterDelta {
                sent: 1,
                opened: 1,
                ..Default::default()
            }
        );
        assert!(CounterDelta::milestone(RecipientStatus::Pending).is_empty());
    }

    #[test]
    fn test_milestone_delta() {
        let mut recipient = CampaignRecipient::pending(uuid::Uuid::new_v4(), "a@example.com");
        assert!(recipient.milestone_delta().is_empty());

        recipient.sent_at = Some(Utc::now());
        recipient.bounced_at = Some(Utc::now());
        let delta = recipient.milestone_delta();
        assert_eq!(delta.sent, 1);
        assert_eq!(delta.bounced, 1);
        assert_eq!(delta.opened, 0);
    }
}
