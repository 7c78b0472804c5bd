//! In-memory store
//!
//! Implements every repository trait over one mutex-guarded state, with the
//! same compare-and-swap and uniqueness semantics as the PostgreSQL queries.
//! Used by tests and by the `memory` database backend.

use crate::models::{Campaign, CampaignRecipient, CounterDelta, CreateCampaign};
use crate::repository::{CampaignRepository, IdempotencyRepository, RecipientRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sendwell_common::types::{CampaignId, CampaignStatus, RecipientId, RecipientStatus, UserId};
use sendwell_common::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    campaigns: HashMap<CampaignId, Campaign>,
    recipients: HashMap<RecipientId, CampaignRecipient>,
    idempotency_keys: HashMap<String, DateTime<Utc>>,
}

impl MemoryState {
    fn recipients_of(&self, campaign_id: CampaignId) -> impl Iterator<Item = &CampaignRecipient> {
        self.recipients
            .values()
            .filter(move |r| r.campaign_id == campaign_id)
    }
}

/// Shared in-memory store
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("memory store lock poisoned".to_string()))
    }
}

fn status_matches(actual: &str, wanted: Option<&str>) -> bool {
    wanted.map_or(true, |w| actual == w)
}

#[async_trait]
impl CampaignRepository for MemoryStore {
    async fn create(&self, input: CreateCampaign) -> Result<Campaign> {
        let now = Utc::now();
        let campaign = Campaign {
            id: Uuid::now_v7(),
            user_id: input.user_id,
            name: input.name,
            subject: input.subject,
            html_body: input.html_body,
            text_body: input.text_body,
            from_address: input.from_address,
            from_name: input.from_name,
            audience: input.audience,
            ai_generated: input.ai_generated,
            status: CampaignStatus::Draft.to_string(),
            recipient_count: 0,
            sent_count: 0,
            delivered_count: 0,
            opened_count: 0,
            clicked_count: 0,
            bounced_count: 0,
            unsubscribed_count: 0,
            counters_dirty: false,
            scheduled_at: None,
            started_at: None,
            sent_at: None,
            created_at: now,
            updated_at: now,
        };

        self.state()?
            .campaigns
            .insert(campaign.id, campaign.clone());
        Ok(campaign)
    }

    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        Ok(self.state()?.campaigns.get(&id).cloned())
    }

    async fn list(
        &self,
        user_id: Option<UserId>,
        status: Option<CampaignStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Campaign>> {
        let state = self.state()?;
        let wanted = status.map(|s| s.as_str());
        let mut campaigns: Vec<Campaign> = state
            .campaigns
            .values()
            .filter(|c| user_id.map_or(true, |u| c.user_id == u))
            .filter(|c| status_matches(&c.status, wanted))
            .cloned()
            .collect();
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(campaigns
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count(&self, user_id: Option<UserId>, status: Option<CampaignStatus>) -> Result<i64> {
        let state = self.state()?;
        let wanted = status.map(|s| s.as_str());
        Ok(state
            .campaigns
            .values()
            .filter(|c| user_id.map_or(true, |u| c.user_id == u))
            .filter(|c| status_matches(&c.status, wanted))
            .count() as i64)
    }

    async fn delete_draft(&self, id: CampaignId) -> Result<bool> {
        let mut state = self.state()?;
        let is_draft = state
            .campaigns
            .get(&id)
            .map_or(false, |c| c.status == CampaignStatus::Draft.as_str());
        if !is_draft {
            return Ok(false);
        }

        state.campaigns.remove(&id);
        state.recipients.retain(|_, r| r.campaign_id != id);
        Ok(true)
    }

    async fn schedule(&self, id: CampaignId, at: DateTime<Utc>) -> Result<Option<Campaign>> {
        let mut state = self.state()?;
        match state.campaigns.get_mut(&id) {
            Some(c) if c.status == CampaignStatus::Draft.as_str() => {
                c.status = CampaignStatus::Scheduled.to_string();
                c.scheduled_at = Some(at);
                c.updated_at = Utc::now();
                Ok(Some(c.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn transition_status(
        &self,
        id: CampaignId,
        from: CampaignStatus,
        to: CampaignStatus,
    ) -> Result<Option<Campaign>> {
        let mut state = self.state()?;
        match state.campaigns.get_mut(&id) {
            Some(c) if c.status == from.as_str() => {
                let now = Utc::now();
                c.status = to.to_string();
                if to == CampaignStatus::Sending && c.started_at.is_none() {
                    c.started_at = Some(now);
                }
                if to == CampaignStatus::Sent {
                    c.sent_at = Some(now);
                }
                c.updated_at = now;
                Ok(Some(c.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn start_sending(&self, id: CampaignId, emails: &[String]) -> Result<Option<Campaign>> {
        let mut state = self.state()?;
        let now = Utc::now();

        let campaign = match state.campaigns.get_mut(&id) {
            Some(c) if c.status == CampaignStatus::Scheduled.as_str() => {
                c.status = CampaignStatus::Sending.to_string();
                c.recipient_count = emails.len() as i32;
                c.started_at.get_or_insert(now);
                c.updated_at = now;
                c.clone()
            }
            _ => return Ok(None),
        };

        for email in emails {
            let exists = state
                .recipients_of(id)
                .any(|r| r.email == *email);
            if !exists {
                let recipient = CampaignRecipient::pending(id, email.clone());
                state.recipients.insert(recipient.id, recipient);
            }
        }

        Ok(Some(campaign))
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>> {
        let state = self.state()?;
        let mut due: Vec<Campaign> = state
            .campaigns
            .values()
            .filter(|c| c.status == CampaignStatus::Scheduled.as_str())
            .filter(|c| c.scheduled_at.map_or(true, |at| at <= now))
            .cloned()
            .collect();
        due.sort_by_key(|c| c.scheduled_at);
        Ok(due)
    }

    async fn list_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>> {
        let state = self.state()?;
        Ok(state
            .campaigns
            .values()
            .filter(|c| c.status == status.as_str())
            .cloned()
            .collect())
    }

    async fn apply_counter_delta(&self, id: CampaignId, delta: CounterDelta) -> Result<()> {
        let mut state = self.state()?;
        if let Some(c) = state.campaigns.get_mut(&id) {
            c.sent_count += delta.sent;
            c.delivered_count += delta.delivered;
            c.opened_count += delta.opened;
            c.clicked_count += delta.clicked;
            c.bounced_count += delta.bounced;
            c.unsubscribed_count += delta.unsubscribed;
            c.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn recompute_counters(&self, id: CampaignId) -> Result<Option<Campaign>> {
        let mut state = self.state()?;
        let mut total = 0;
        let mut sum = CounterDelta::default();
        for r in state.recipients_of(id) {
            total += 1;
            sum = sum + r.milestone_delta();
        }

        match state.campaigns.get_mut(&id) {
            Some(c) => {
                c.recipient_count = total;
                c.sent_count = sum.sent;
                c.delivered_count = sum.delivered;
                c.opened_count = sum.opened;
                c.clicked_count = sum.clicked;
                c.bounced_count = sum.bounced;
                c.unsubscribed_count = sum.unsubscribed;
                c.counters_dirty = false;
                c.updated_at = Utc::now();
                Ok(Some(c.clone()))
            }
            None => Ok(None),
        }
    }

    async fn mark_dirty(&self, id: CampaignId) -> Result<()> {
        if let Some(c) = self.state()?.campaigns.get_mut(&id) {
            c.counters_dirty = true;
        }
        Ok(())
    }

    async fn list_dirty(&self) -> Result<Vec<CampaignId>> {
        Ok(self
            .state()?
            .campaigns
            .values()
            .filter(|c| c.counters_dirty)
            .map(|c| c.id)
            .collect())
    }
}

#[async_trait]
impl RecipientRepository for MemoryStore {
    async fn get(&self, id: RecipientId) -> Result<Option<CampaignRecipient>> {
        Ok(self.state()?.recipients.get(&id).cloned())
    }

    async fn find_by_message_id(&self, message_id: &str) -> Result<Option<CampaignRecipient>> {
        Ok(self
            .state()?
            .recipients
            .values()
            .find(|r| r.provider_message_id.as_deref() == Some(message_id))
            .cloned())
    }

    async fn list_by_campaign(
        &self,
        campaign_id: CampaignId,
        status: Option<RecipientStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CampaignRecipient>> {
        let state = self.state()?;
        let wanted = status.map(|s| s.as_str());
        let mut recipients: Vec<CampaignRecipient> = state
            .recipients_of(campaign_id)
            .filter(|r| status_matches(&r.status, wanted))
            .cloned()
            .collect();
        recipients.sort_by(|a, b| a.email.cmp(&b.email));

        Ok(recipients
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_by_campaign(
        &self,
        campaign_id: CampaignId,
        status: Option<RecipientStatus>,
    ) -> Result<i64> {
        let state = self.state()?;
        let wanted = status.map(|s| s.as_str());
        Ok(state
            .recipients_of(campaign_id)
            .filter(|r| status_matches(&r.status, wanted))
            .count() as i64)
    }

    async fn claim_pending(
        &self,
        campaign_id: CampaignId,
        limit: i64,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Vec<CampaignRecipient>> {
        let mut state = self.state()?;
        let mut due: Vec<(DateTime<Utc>, RecipientId)> = state
            .recipients_of(campaign_id)
            .filter(|r| r.status == RecipientStatus::Pending.as_str())
            .filter(|r| r.next_attempt_at.map_or(true, |at| at <= now))
            .filter(|r| r.claimed_until.map_or(true, |until| until < now))
            .map(|r| (r.created_at, r.id))
            .collect();
        due.sort();
        due.truncate(limit.max(0) as usize);

        let mut claimed = Vec::with_capacity(due.len());
        for (_, id) in due {
            if let Some(r) = state.recipients.get_mut(&id) {
                r.claimed_until = Some(lease_until);
                r.version += 1;
                r.updated_at = now;
                claimed.push(r.clone());
            }
        }
        Ok(claimed)
    }

    async fn release_claim(&self, id: RecipientId) -> Result<()> {
        if let Some(r) = self.state()?.recipients.get_mut(&id) {
            r.claimed_until = None;
            r.version += 1;
            r.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn reschedule(
        &self,
        id: RecipientId,
        attempts: i32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<()> {
        if let Some(r) = self.state()?.recipients.get_mut(&id) {
            r.attempts = attempts;
            r.next_attempt_at = Some(next_attempt_at);
            r.last_error = Some(error.to_string());
            r.claimed_until = None;
            r.version += 1;
            r.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_provider_message_id(&self, id: RecipientId, message_id: &str) -> Result<()> {
        if let Some(r) = self.state()?.recipients.get_mut(&id) {
            r.provider_message_id = Some(message_id.to_string());
            r.version += 1;
            r.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn save(&self, recipient: &CampaignRecipient) -> Result<bool> {
        let mut state = self.state()?;
        match state.recipients.get_mut(&recipient.id) {
            Some(current) if current.version == recipient.version => {
                let provider_message_id = current.provider_message_id.take();
                let next_attempt_at = current.next_attempt_at;
                *current = recipient.clone();
                current.provider_message_id = provider_message_id;
                current.next_attempt_at = next_attempt_at;
                current.version += 1;
                current.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl IdempotencyRepository for MemoryStore {
    async fn insert_if_absent(&self, key: &str, seen_at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state()?;
        if state.idempotency_keys.contains_key(key) {
            return Ok(false);
        }
        state.idempotency_keys.insert(key.to_string(), seen_at);
        Ok(true)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.state()?.idempotency_keys.remove(key);
        Ok(())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state()?;
        let before = state.idempotency_keys.len();
        state.idempotency_keys.retain(|_, seen| *seen >= cutoff);
        Ok((before - state.idempotency_keys.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    async fn scheduled_campaign(store: &MemoryStore) -> Campaign {
        let campaign = CampaignRepository::create(
            store,
            CreateCampaign {
                user_id: Uuid::new_v4(),
                name: "Launch".into(),
                subject: "Hello".into(),
                text_body: Some("Hi there".into()),
                audience: vec!["a@example.com".into(), "b@example.com".into()],
                ..Default::default()
            },
        )
        .await
        .unwrap();
        store.schedule(campaign.id, Utc::now()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_start_sending_is_compare_and_swap() {
        let store = MemoryStore::new();
        let campaign = scheduled_campaign(&store).await;
        let emails = campaign.audience.clone();

        let started = store.start_sending(campaign.id, &emails).await.unwrap().unwrap();
        assert_eq!(started.status, "sending");
        assert_eq!(started.recipient_count, 2);
        assert!(store.start_sending(campaign.id, &emails).await.unwrap().is_none());
        assert_eq!(
            store.count_by_campaign(campaign.id, None).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_claim_skips_leased_rows() {
        let store = MemoryStore::new();
        let campaign = scheduled_campaign(&store).await;
        store
            .start_sending(campaign.id, &campaign.audience)
            .await
            .unwrap();

        let now = Utc::now();
        let lease = now + Duration::seconds(60);
        let first = store.claim_pending(campaign.id, 10, now, lease).await.unwrap();
        let second = store.claim_pending(campaign.id, 10, now, lease).await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(second.is_empty());

        store.release_claim(first[0].id).await.unwrap();
        let third = store.claim_pending(campaign.id, 10, now, lease).await.unwrap();
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].id, first[0].id);
    }

    #[tokio::test]
    async fn test_save_rejects_stale_version() {
        let store = MemoryStore::new();
        let campaign = scheduled_campaign(&store).await;
        store
            .start_sending(campaign.id, &campaign.audience)
            .await
            .unwrap();
        let recipient = store
            .list_by_campaign(campaign.id, None, 1, 0)
            .await
            .unwrap()
            .remove(0);

        let mut first = recipient.clone();
        first.status = "sent".into();
        first.sent_at = Some(Utc::now());
        assert!(store.save(&first).await.unwrap());

        let mut stale = recipient;
        stale.status = "bounced".into();
        assert!(!store.save(&stale).await.unwrap());

        let stored = RecipientRepository::get(&store, first.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "sent");
        assert_eq!(stored.version, first.version + 1);
    }

    #[tokio::test]
    async fn test_idempotency_keys() {
        let store = MemoryStore::new();
        let old = Utc::now() - Duration::days(40);

        assert!(store.insert_if_absent("k1", old).await.unwrap());
        assert!(!store.insert_if_absent("k1", Utc::now()).await.unwrap());
        assert!(store.insert_if_absent("k2", Utc::now()).await.unwrap());

        let purged = store
            .purge_older_than(Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert!(store.insert_if_absent("k1", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_recompute_counts_milestones() {
        let store = MemoryStore::new();
        let campaign = scheduled_campaign(&store).await;
        store
            .start_sending(campaign.id, &campaign.audience)
            .await
            .unwrap();
        let mut recipient = store
            .list_by_campaign(campaign.id, None, 1, 0)
            .await
            .unwrap()
            .remove(0);
        recipient.status = "opened".into();
        recipient.sent_at = Some(Utc::now());
        recipient.opened_at = Some(Utc::now());
        store.save(&recipient).await.unwrap();

        store
            .apply_counter_delta(
                campaign.id,
                CounterDelta {
                    clicked: 5,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store.mark_dirty(campaign.id).await.unwrap();
        assert_eq!(store.list_dirty().await.unwrap(), vec![campaign.id]);

        let recomputed = store.recompute_counters(campaign.id).await.unwrap().unwrap();
        assert_eq!(recomputed.sent_count, 1);
        assert_eq!(recomputed.opened_count, 1);
        assert_eq!(recomputed.clicked_count, 0);
        assert!(!recomputed.counters_dirty);
        assert!(store.list_dirty().await.unwrap().is_empty());
    }
}
