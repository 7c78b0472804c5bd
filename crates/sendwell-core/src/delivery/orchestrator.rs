//! Campaign Manager - Drives a campaign through its send lifecycle
//!
//! ```text
//! draft --schedule--> scheduled --dispatch--> sending --nothing pending--> sent
//!                                             sending <--resume-- paused
//!                                             sending --pause---> paused
//! any non-terminal --cancel--> cancelled
//! ```
//!
//! Every status change is a compare-and-swap on the current status, so of
//! two racing callers exactly one wins and the other sees
//! [`CampaignError::InvalidTransition`].

use super::audience::AudienceResolver;
use crate::tracking::{CampaignAggregator, CampaignAnalytics};
use chrono::{DateTime, Utc};
use sendwell_common::types::{CampaignId, CampaignStatus, Paginated, RecipientStatus, UserId};
use sendwell_storage::models::{Campaign, CampaignRecipient, CreateCampaign};
use sendwell_storage::repository::{CampaignRepository, RecipientRepository};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Campaign manager errors
#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Campaign not found")]
    NotFound,

    #[error("Cannot {action} a campaign that is {current}")]
    InvalidTransition {
        current: String,
        action: &'static str,
    },

    #[error("Campaign is not ready: {0}")]
    Validation(String),

    #[error("Audience resolution failed: {0}")]
    AudienceResolutionFailed(String),

    #[error(transparent)]
    Store(#[from] sendwell_common::Error),
}

impl CampaignError {
    pub fn status_code(&self) -> u16 {
        match self {
            CampaignError::NotFound => 404,
            CampaignError::InvalidTransition { .. } => 409,
            CampaignError::Validation(_) | CampaignError::AudienceResolutionFailed(_) => 422,
            CampaignError::Store(e) => e.status_code(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CampaignError::NotFound => "NOT_FOUND",
            CampaignError::InvalidTransition { .. } => "INVALID_TRANSITION",
            CampaignError::Validation(_) => "VALIDATION_ERROR",
            CampaignError::AudienceResolutionFailed(_) => "AUDIENCE_RESOLUTION_FAILED",
            CampaignError::Store(e) => e.code(),
        }
    }
}

type Result<T> = std::result::Result<T, CampaignError>;

/// Campaign Manager - Manages campaign lifecycle
pub struct CampaignManager {
    campaigns: Arc<dyn CampaignRepository>,
    recipients: Arc<dyn RecipientRepository>,
    resolver: Arc<dyn AudienceResolver>,
    aggregator: Arc<CampaignAggregator>,
}

impl CampaignManager {
    pub fn new(
        campaigns: Arc<dyn CampaignRepository>,
        recipients: Arc<dyn RecipientRepository>,
        resolver: Arc<dyn AudienceResolver>,
        aggregator: Arc<CampaignAggregator>,
    ) -> Self {
        Self {
            campaigns,
            recipients,
            resolver,
            aggregator,
        }
    }

    /// Create a draft campaign
    pub async fn create(&self, input: CreateCampaign) -> Result<Campaign> {
        if input.name.trim().is_empty() {
            return Err(CampaignError::Validation("name is required".into()));
        }
        let campaign = self.campaigns.create(input).await?;
        info!(campaign_id = %campaign.id, "Created campaign '{}'", campaign.name);
        Ok(campaign)
    }

    pub async fn get(&self, id: CampaignId) -> Result<Campaign> {
        self.campaigns.get(id).await?.ok_or(CampaignError::NotFound)
    }

    pub async fn list(
        &self,
        user_id: Option<UserId>,
        status: Option<CampaignStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Paginated<Campaign>> {
        let data = self.campaigns.list(user_id, status, limit, offset).await?;
        let total = self.campaigns.count(user_id, status).await?;
        Ok(Paginated {
            data,
            total,
            limit,
            offset,
        })
    }

    /// Delete a campaign that has not left `draft`
    pub async fn delete(&self, id: CampaignId) -> Result<()> {
        let campaign = self.get(id).await?;
        if !self.campaigns.delete_draft(id).await? {
            return Err(self.invalid(id, "delete", &campaign.status).await);
        }
        info!(campaign_id = %id, "Deleted draft campaign");
        Ok(())
    }

    /// Check a campaign is complete enough to send
    pub fn validate(campaign: &Campaign) -> Result<()> {
        if campaign.subject.trim().is_empty() {
            return Err(CampaignError::Validation("subject is required".into()));
        }
        if !campaign.has_content() {
            return Err(CampaignError::Validation("html or text content is required".into()));
        }
        if campaign.audience.iter().all(|a| a.trim().is_empty()) {
            return Err(CampaignError::Validation("audience is empty".into()));
        }
        Ok(())
    }

    /// Validate a draft and schedule it, due at `at` (now when omitted)
    pub async fn schedule(&self, id: CampaignId, at: Option<DateTime<Utc>>) -> Result<Campaign> {
        let campaign = self.get(id).await?;
        if campaign.status_enum() != Some(CampaignStatus::Draft) {
            return Err(invalid_transition(&campaign.status, "schedule"));
        }
        Self::validate(&campaign)?;

        let at = at.unwrap_or_else(Utc::now);
        match self.campaigns.schedule(id, at).await? {
            Some(scheduled) => {
                info!(campaign_id = %id, scheduled_at = %at, "Campaign scheduled");
                Ok(scheduled)
            }
            None => Err(self.invalid(id, "schedule", &campaign.status).await),
        }
    }

    /// Resolve the audience into pending recipients and start sending
    pub async fn dispatch(&self, id: CampaignId) -> Result<Campaign> {
        let campaign = self.get(id).await?;
        if campaign.status_enum() != Some(CampaignStatus::Scheduled) {
            return Err(invalid_transition(&campaign.status, "dispatch"));
        }
        Self::validate(&campaign)?;

        let addresses = self.resolver.resolve(&campaign).await.map_err(|e| {
            warn!(campaign_id = %id, "Audience resolution failed: {}", e);
            CampaignError::AudienceResolutionFailed(e.to_string())
        })?;

        match self.campaigns.start_sending(id, &addresses).await? {
            Some(sending) => {
                info!(
                    campaign_id = %id,
                    recipients = sending.recipient_count,
                    "Campaign dispatched"
                );
                Ok(sending)
            }
            None => Err(self.invalid(id, "dispatch", &campaign.status).await),
        }
    }

    /// Schedule for now and dispatch immediately
    pub async fn send_now(&self, id: CampaignId) -> Result<Campaign> {
        self.schedule(id, Some(Utc::now())).await?;
        self.dispatch(id).await
    }

    pub async fn pause(&self, id: CampaignId) -> Result<Campaign> {
        self.transition(id, CampaignStatus::Sending, CampaignStatus::Paused, "pause")
            .await
    }

    pub async fn resume(&self, id: CampaignId) -> Result<Campaign> {
        self.transition(id, CampaignStatus::Paused, CampaignStatus::Sending, "resume")
            .await
    }

    /// Cancel from any non-terminal status. In-flight sends still complete.
    pub async fn cancel(&self, id: CampaignId) -> Result<Campaign> {
        let campaign = self.get(id).await?;
        let current = campaign
            .status_enum()
            .filter(|s| !s.is_terminal())
            .ok_or_else(|| invalid_transition(&campaign.status, "cancel"))?;

        self.transition(id, current, CampaignStatus::Cancelled, "cancel")
            .await
    }

    /// Mark a sending campaign `sent` once nothing is pending. Returns the
    /// completed campaign, or `None` while work remains.
    pub async fn check_completion(&self, id: CampaignId) -> Result<Option<Campaign>> {
        let campaign = self.get(id).await?;
        if campaign.status_enum() != Some(CampaignStatus::Sending) {
            return Ok(None);
        }

        let pending = self
            .recipients
            .count_by_campaign(id, Some(RecipientStatus::Pending))
            .await?;
        if pending > 0 {
            debug!(campaign_id = %id, pending, "Campaign still sending");
            return Ok(None);
        }

        match self
            .campaigns
            .transition_status(id, CampaignStatus::Sending, CampaignStatus::Sent)
            .await?
        {
            Some(_) => {
                let sent = self.aggregator.recompute(id).await?;
                info!(
                    campaign_id = %id,
                    sent = sent.sent_count,
                    bounced = sent.bounced_count,
                    "Campaign completed"
                );
                Ok(Some(sent))
            }
            // Paused or cancelled in the meantime
            None => Ok(None),
        }
    }

    pub async fn recompute(&self, id: CampaignId) -> Result<Campaign> {
        Ok(self.aggregator.recompute(id).await?)
    }

    pub async fn analytics(&self, id: CampaignId) -> Result<CampaignAnalytics> {
        Ok(self.aggregator.get_analytics(id).await?)
    }

    pub async fn list_recipients(
        &self,
        id: CampaignId,
        status: Option<RecipientStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Paginated<CampaignRecipient>> {
        self.get(id).await?;
        let data = self
            .recipients
            .list_by_campaign(id, status, limit, offset)
            .await?;
        let total = self.recipients.count_by_campaign(id, status).await?;
        Ok(Paginated {
            data,
            total,
            limit,
            offset,
        })
    }

    /// Scheduled campaigns whose time has come
    pub async fn due(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>> {
        Ok(self.campaigns.list_due(now).await?)
    }

    async fn transition(
        &self,
        id: CampaignId,
        from: CampaignStatus,
        to: CampaignStatus,
        action: &'static str,
    ) -> Result<Campaign> {
        if let Some(campaign) = self.campaigns.transition_status(id, from, to).await? {
            info!(campaign_id = %id, from = %from, to = %to, "Campaign status changed");
            return Ok(campaign);
        }
        Err(self.invalid(id, action, from.as_str()).await)
    }

    /// Build the error for a lost compare-and-swap from the freshest status
    async fn invalid(&self, id: CampaignId, action: &'static str, fallback: &str) -> CampaignError {
        match self.campaigns.get(id).await {
            Ok(Some(campaign)) => invalid_transition(&campaign.status, action),
            Ok(None) => CampaignError::NotFound,
            Err(_) => invalid_transition(fallback, action),
        }
    }
}

fn invalid_transition(current: &str, action: &'static str) -> CampaignError {
    CampaignError::InvalidTransition {
        current: current.to_string(),
        action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::audience::StoredAudienceResolver;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use sendwell_storage::MemoryStore;
    use uuid::Uuid;

    fn manager(store: &MemoryStore) -> CampaignManager {
        let store = Arc::new(store.clone());
        CampaignManager::new(
            store.clone(),
            store.clone(),
            Arc::new(StoredAudienceResolver),
            Arc::new(CampaignAggregator::new(store)),
        )
    }

    fn input(audience: &[&str]) -> CreateCampaign {
        CreateCampaign {
            user_id: Uuid::new_v4(),
            name: "Spring".into(),
            subject: "Spring sale".into(),
            text_body: Some("Everything must go".into()),
            audience: audience.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let store = MemoryStore::new();
        let m = manager(&store);
        let c = m.create(input(&["a@example.com", "b@example.com"])).await.unwrap();
        assert_eq!(c.status, "draft");

        let c = m.schedule(c.id, None).await.unwrap();
        assert_eq!(c.status, "scheduled");

        let c = m.dispatch(c.id).await.unwrap();
        assert_eq!(c.status, "sending");
        assert_eq!(c.recipient_count, 2);

        let c = m.pause(c.id).await.unwrap();
        assert_eq!(c.status, "paused");
        let c = m.resume(c.id).await.unwrap();
        assert_eq!(c.status, "sending");

        // Two pending recipients keep it open
        assert!(m.check_completion(c.id).await.unwrap().is_none());

        let c = m.cancel(c.id).await.unwrap();
        assert_eq!(c.status, "cancelled");
        let err = m.cancel(c.id).await.unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn test_schedule_validates() {
        let store = MemoryStore::new();
        let m = manager(&store);

        let mut missing_subject = input(&["a@example.com"]);
        missing_subject.subject = " ".into();
        let c = m.create(missing_subject).await.unwrap();
        assert!(matches!(
            m.schedule(c.id, None).await.unwrap_err(),
            CampaignError::Validation(_)
        ));

        let c = m.create(input(&[])).await.unwrap();
        let err = m.schedule(c.id, None).await.unwrap_err();
        assert_eq!(err.status_code(), 422);
        assert_eq!(m.get(c.id).await.unwrap().status, "draft");
    }

    #[tokio::test]
    async fn test_unresolvable_audience_stays_scheduled() {
        let store = MemoryStore::new();
        let m = manager(&store);
        let c = m.create(input(&["not-an-address"])).await.unwrap();
        m.schedule(c.id, None).await.unwrap();

        let err = m.dispatch(c.id).await.unwrap_err();
        assert!(matches!(err, CampaignError::AudienceResolutionFailed(_)));
        assert_eq!(m.get(c.id).await.unwrap().status, "scheduled");
    }

    struct FailingResolver;

    #[async_trait]
    impl AudienceResolver for FailingResolver {
        async fn resolve(&self, _campaign: &Campaign) -> sendwell_common::Result<Vec<String>> {
            Err(sendwell_common::Error::Upstream("directory unavailable".into()))
        }
    }

    #[tokio::test]
    async fn test_resolver_failure_is_reported() {
        let store = Arc::new(MemoryStore::new());
        let m = CampaignManager::new(
            store.clone(),
            store.clone(),
            Arc::new(FailingResolver),
            Arc::new(CampaignAggregator::new(store.clone())),
        );
        let c = m.create(input(&["a@example.com"])).await.unwrap();
        m.schedule(c.id, None).await.unwrap();
        assert_eq!(m.dispatch(c.id).await.unwrap_err().code(), "AUDIENCE_RESOLUTION_FAILED");
    }

    #[tokio::test]
    async fn test_concurrent_dispatch_has_one_winner() {
        let store = MemoryStore::new();
        let m = Arc::new(manager(&store));
        let c = m.create(input(&["a@example.com"])).await.unwrap();
        m.schedule(c.id, None).await.unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = m.clone();
                tokio::spawn(async move { m.dispatch(c.id).await })
            })
            .collect();

        let mut won = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => won += 1,
                Err(e) => assert!(matches!(e, CampaignError::InvalidTransition { .. })),
            }
        }
        assert_eq!(won, 1);
        assert_eq!(m.get(c.id).await.unwrap().recipient_count, 1);
    }

    #[tokio::test]
    async fn test_delete_only_drafts() {
        let store = MemoryStore::new();
        let m = manager(&store);
        let c = m.create(input(&["a@example.com"])).await.unwrap();
        m.schedule(c.id, None).await.unwrap();
        assert_eq!(m.delete(c.id).await.unwrap_err().status_code(), 409);

        let d = m.create(input(&["a@example.com"])).await.unwrap();
        m.delete(d.id).await.unwrap();
        assert!(matches!(m.get(d.id).await.unwrap_err(), CampaignError::NotFound));
    }

    #[tokio::test]
    async fn test_list_paginates() {
        let store = MemoryStore::new();
        let m = manager(&store);
        for _ in 0..3 {
            m.create(input(&["a@example.com"])).await.unwrap();
        }
        let page = m.list(None, Some(CampaignStatus::Draft), 2, 0).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.data.len(), 2);
    }
}
