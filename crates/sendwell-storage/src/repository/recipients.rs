//! Campaign recipient repository

use crate::db::DatabasePool;
use crate::models::CampaignRecipient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sendwell_common::types::{CampaignId, RecipientId, RecipientStatus};
use sendwell_common::{Error, Result};

/// Recipient repository trait
#[async_trait]
pub trait RecipientRepository: Send + Sync {
    async fn get(&self, id: RecipientId) -> Result<Option<CampaignRecipient>>;
    async fn find_by_message_id(&self, message_id: &str) -> Result<Option<CampaignRecipient>>;
    async fn list_by_campaign(
        &self,
        campaign_id: CampaignId,
        status: Option<RecipientStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CampaignRecipient>>;
    async fn count_by_campaign(
        &self,
        campaign_id: CampaignId,
        status: Option<RecipientStatus>,
    ) -> Result<i64>;

    /// Lease due pending recipients to the caller until `lease_until`.
    /// Rows leased by someone else are skipped.
    async fn claim_pending(
        &self,
        campaign_id: CampaignId,
        limit: i64,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Vec<CampaignRecipient>>;

    /// Give a lease back without consuming an attempt
    async fn release_claim(&self, id: RecipientId) -> Result<()>;

    /// Record a transient send failure and when to try again
    async fn reschedule(
        &self,
        id: RecipientId,
        attempts: i32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<()>;

    async fn set_provider_message_id(&self, id: RecipientId, message_id: &str) -> Result<()>;

    /// Persist engagement fields if `recipient.version` is still current.
    /// Returns false when another writer got there first.
    async fn save(&self, recipient: &CampaignRecipient) -> Result<bool>;
}

/// Database recipient repository
pub struct DbRecipientRepository {
    pool: DatabasePool,
}

impl DbRecipientRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecipientRepository for DbRecipientRepository {
    async fn get(&self, id: RecipientId) -> Result<Option<CampaignRecipient>> {
        sqlx::query_as::<_, CampaignRecipient>("SELECT * FROM campaign_recipients WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn find_by_message_id(&self, message_id: &str) -> Result<Option<CampaignRecipient>> {
        sqlx::query_as::<_, CampaignRecipient>(
            "SELECT * FROM campaign_recipients WHERE provider_message_id = $1",
        )
        .bind(message_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_by_campaign(
        &self,
        campaign_id: CampaignId,
        status: Option<RecipientStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CampaignRecipient>> {
        sqlx::query_as::<_, CampaignRecipient>(
            r#"
            SELECT * FROM campaign_recipients
            WHERE campaign_id = $1 AND ($2::text IS NULL OR status = $2)
            ORDER BY email ASC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(campaign_id)
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn count_by_campaign(
        &self,
        campaign_id: CampaignId,
        status: Option<RecipientStatus>,
    ) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM campaign_recipients
            WHERE campaign_id = $1 AND ($2::text IS NULL OR status = $2)
            "#,
        )
        .bind(campaign_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(count.0)
    }

    async fn claim_pending(
        &self,
        campaign_id: CampaignId,
        limit: i64,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Vec<CampaignRecipient>> {
        sqlx::query_as::<_, CampaignRecipient>(
            r#"
            UPDATE campaign_recipients SET
                claimed_until = $4,
                version = version + 1,
                updated_at = NOW()
            WHERE id IN (
                SELECT id FROM campaign_recipients
                WHERE campaign_id = $1
                  AND status = 'pending'
                  AND (next_attempt_at IS NULL OR next_attempt_at <= $3)
                  AND (claimed_until IS NULL OR claimed_until < $3)
                ORDER BY created_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(campaign_id)
        .bind(limit)
        .bind(now)
        .bind(lease_until)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn release_claim(&self, id: RecipientId) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE campaign_recipients SET
                claimed_until = NULL,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn reschedule(
        &self,
        id: RecipientId,
        attempts: i32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE campaign_recipients SET
                attempts = $2,
                next_attempt_at = $3,
                last_error = $4,
                claimed_until = NULL,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempts)
        .bind(next_attempt_at)
        .bind(error)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn set_provider_message_id(&self, id: RecipientId, message_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE campaign_recipients SET
                provider_message_id = $2,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(message_id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn save(&self, recipient: &CampaignRecipient) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE campaign_recipients SET
                status = $3,
                sent_at = $4,
                delivered_at = $5,
                opened_at = $6,
                clicked_at = $7,
                bounced_at = $8,
                unsubscribed_at = $9,
                open_count = $10,
                click_count = $11,
                last_opened_at = $12,
                last_clicked_at = $13,
                bounce_reason = $14,
                last_click_url = $15,
                attempts = $16,
                last_error = $17,
                claimed_until = $18,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(recipient.id)
        .bind(recipient.version)
        .bind(&recipient.status)
        .bind(recipient.sent_at)
        .bind(recipient.delivered_at)
        .bind(recipient.opened_at)
        .bind(recipient.clicked_at)
        .bind(recipient.bounced_at)
        .bind(recipient.unsubscribed_at)
        .bind(recipient.open_count)
        .bind(recipient.click_count)
        .bind(recipient.last_opened_at)
        .bind(recipient.last_clicked_at)
        .bind(&recipient.bounce_reason)
        .bind(&recipient.last_click_url)
        .bind(recipient.attempts)
        .bind(&recipient.last_error)
        .bind(recipient.claimed_until)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}
