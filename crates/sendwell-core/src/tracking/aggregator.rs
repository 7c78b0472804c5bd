//! Campaign Aggregator - Per-campaign counters and analytics

use sendwell_common::types::{CampaignId, CampaignStatus};
use sendwell_common::{Error, Result};
use sendwell_storage::models::{Campaign, CampaignCounters, CounterDelta};
use sendwell_storage::repository::CampaignRepository;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Read model served to dashboards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignAnalytics {
    pub campaign_id: CampaignId,
    pub status: CampaignStatus,
    #[serde(flatten)]
    pub counters: CampaignCounters,
    pub delivery_rate: f64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub click_to_open_rate: f64,
    pub bounce_rate: f64,
    pub unsubscribe_rate: f64,
    pub progress: f64,
    /// Counters may be behind until the next reconciliation
    pub counters_dirty: bool,
}

fn ratio(numerator: i32, denominator: i32) -> f64 {
    if denominator <= 0 {
        0.0
    } else {
        f64::from(numerator) / f64::from(denominator)
    }
}

impl CampaignAnalytics {
    pub fn from_campaign(campaign: &Campaign) -> Result<Self> {
        let status = campaign.status_enum().ok_or_else(|| {
            Error::Internal(format!(
                "campaign {} has unknown status '{}'",
                campaign.id, campaign.status
            ))
        })?;
        let c = campaign.counters();

        Ok(Self {
            campaign_id: campaign.id,
            status,
            counters: c,
            delivery_rate: ratio(c.delivered_count, c.sent_count),
            open_rate: ratio(c.opened_count, c.sent_count),
            click_rate: ratio(c.clicked_count, c.sent_count),
            click_to_open_rate: ratio(c.clicked_count, c.opened_count),
            bounce_rate: ratio(c.bounced_count, c.sent_count),
            unsubscribe_rate: ratio(c.unsubscribed_count, c.sent_count),
            progress: ratio(c.sent_count, c.recipient_count),
            counters_dirty: campaign.counters_dirty,
        })
    }
}

/// Maintains campaign counters from recipient transitions
pub struct CampaignAggregator {
    campaigns: Arc<dyn CampaignRepository>,
}

impl CampaignAggregator {
    pub fn new(campaigns: Arc<dyn CampaignRepository>) -> Self {
        Self { campaigns }
    }

    /// Add a delta; commutative, so callers may apply in any order
    pub async fn apply_delta(&self, campaign_id: CampaignId, delta: CounterDelta) -> Result<()> {
        if delta.is_empty() {
            return Ok(());
        }
        self.campaigns.apply_counter_delta(campaign_id, delta).await
    }

    /// Flag the counters as untrusted until the next recompute
    pub async fn mark_dirty(&self, campaign_id: CampaignId) -> Result<()> {
        self.campaigns.mark_dirty(campaign_id).await
    }

    /// Overwrite counters with exact counts from recipient rows
    pub async fn recompute(&self, campaign_id: CampaignId) -> Result<Campaign> {
        self.campaigns
            .recompute_counters(campaign_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("campaign {}", campaign_id)))
    }

    /// Recompute every campaign flagged dirty. Returns how many were fixed.
    pub async fn reconcile_dirty(&self) -> Result<usize> {
        let dirty = self.campaigns.list_dirty().await?;
        let mut fixed = 0;
        for campaign_id in dirty {
            match self.recompute(campaign_id).await {
                Ok(_) => fixed += 1,
                Err(e) => warn!("Failed to recompute counters for campaign {}: {}", campaign_id, e),
            }
        }
        if fixed > 0 {
            info!("Reconciled counters for {} campaigns", fixed);
        }
        Ok(fixed)
    }

    pub async fn get_analytics(&self, campaign_id: CampaignId) -> Result<CampaignAnalytics> {
        let campaign = self
            .campaigns
            .get(campaign_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("campaign {}", campaign_id)))?;
        CampaignAnalytics::from_campaign(&campaign)
    }
}
