//! Campaign repository

use crate::db::DatabasePool;
use crate::models::{Campaign, CreateCampaign, CounterDelta};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sendwell_common::types::{CampaignId, CampaignStatus, UserId};
use sendwell_common::{Error, Result};
use uuid::Uuid;

/// Campaign repository trait
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn create(&self, input: CreateCampaign) -> Result<Campaign>;
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>>;
    async fn list(
        &self,
        user_id: Option<UserId>,
        status: Option<CampaignStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Campaign>>;
    async fn count(&self, user_id: Option<UserId>, status: Option<CampaignStatus>) -> Result<i64>;

    /// Delete a campaign that is still a draft
    async fn delete_draft(&self, id: CampaignId) -> Result<bool>;

    /// Move `draft -> scheduled`, recording when it becomes due
    async fn schedule(&self, id: CampaignId, at: DateTime<Utc>) -> Result<Option<Campaign>>;

    /// Compare-and-swap on the current status. `None` when the campaign is
    /// missing or was not in `from`.
    async fn transition_status(
        &self,
        id: CampaignId,
        from: CampaignStatus,
        to: CampaignStatus,
    ) -> Result<Option<Campaign>>;

    /// Move `scheduled -> sending` and insert one pending recipient per
    /// address, in one transaction.
    async fn start_sending(&self, id: CampaignId, emails: &[String]) -> Result<Option<Campaign>>;

    /// Scheduled campaigns whose `scheduled_at` has passed
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>>;

    async fn list_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>>;

    /// Atomic counter increments
    async fn apply_counter_delta(&self, id: CampaignId, delta: CounterDelta) -> Result<()>;

    /// Overwrite counters with exact counts taken from recipient rows
    async fn recompute_counters(&self, id: CampaignId) -> Result<Option<Campaign>>;

    async fn mark_dirty(&self, id: CampaignId) -> Result<()>;

    async fn list_dirty(&self) -> Result<Vec<CampaignId>>;
}

/// Database campaign repository
pub struct DbCampaignRepository {
    pool: DatabasePool,
}

impl DbCampaignRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignRepository for DbCampaignRepository {
    async fn create(&self, input: CreateCampaign) -> Result<Campaign> {
        let id = Uuid::now_v7();

        sqlx::query_as::<_, Campaign>(
            r#"
            INSERT INTO campaigns (
                id, user_id, name, subject, html_body, text_body,
                from_address, from_name, audience, ai_generated
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.user_id)
        .bind(&input.name)
        .bind(&input.subject)
        .bind(&input.html_body)
        .bind(&input.text_body)
        .bind(&input.from_address)
        .bind(&input.from_name)
        .bind(&input.audience)
        .bind(input.ai_generated)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list(
        &self,
        user_id: Option<UserId>,
        status: Option<CampaignStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Campaign>> {
        sqlx::query_as::<_, Campaign>(
            r#"
            SELECT * FROM campaigns
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn count(&self, user_id: Option<UserId>, status: Option<CampaignStatus>) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM campaigns
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::text IS NULL OR status = $2)
            "#,
        )
        .bind(user_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(count.0)
    }

    async fn delete_draft(&self, id: CampaignId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM campaigns WHERE id = $1 AND status = 'draft'")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn schedule(&self, id: CampaignId, at: DateTime<Utc>) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                status = 'scheduled',
                scheduled_at = $2,
                updated_at = NOW()
            WHERE id = $1 AND status = 'draft'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(at)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn transition_status(
        &self,
        id: CampaignId,
        from: CampaignStatus,
        to: CampaignStatus,
    ) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                status = $3,
                started_at = CASE WHEN $3 = 'sending' THEN COALESCE(started_at, NOW()) ELSE started_at END,
                sent_at = CASE WHEN $3 = 'sent' THEN NOW() ELSE sent_at END,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn start_sending(&self, id: CampaignId, emails: &[String]) -> Result<Option<Campaign>> {
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let campaign = sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                status = 'sending',
                recipient_count = $2,
                started_at = COALESCE(started_at, NOW()),
                updated_at = NOW()
            WHERE id = $1 AND status = 'scheduled'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(emails.len() as i32)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let Some(campaign) = campaign else {
            return Ok(None);
        };

        for email in emails {
            sqlx::query(
                r#"
                INSERT INTO campaign_recipients (id, campaign_id, email)
                VALUES ($1, $2, $3)
                ON CONFLICT (campaign_id, email) DO NOTHING
                "#,
            )
            .bind(Uuid::now_v7())
            .bind(id)
            .bind(email)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Some(campaign))
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>> {
        sqlx::query_as::<_, Campaign>(
            r#"
            SELECT * FROM campaigns
            WHERE status = 'scheduled'
              AND (scheduled_at IS NULL OR scheduled_at <= $1)
            ORDER BY scheduled_at ASC NULLS FIRST
            "#,
        )
        .bind(now)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>> {
        sqlx::query_as::<_, Campaign>(
            "SELECT * FROM campaigns WHERE status = $1 ORDER BY started_at ASC NULLS LAST",
        )
        .bind(status.as_str())
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn apply_counter_delta(&self, id: CampaignId, delta: CounterDelta) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE campaigns SET
                sent_count = sent_count + $2,
                delivered_count = delivered_count + $3,
                opened_count = opened_count + $4,
                clicked_count = clicked_count + $5,
                bounced_count = bounced_count + $6,
                unsubscribed_count = unsubscribed_count + $7,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(delta.sent)
        .bind(delta.delivered)
        .bind(delta.opened)
        .bind(delta.clicked)
        .bind(delta.bounced)
        .bind(delta.unsubscribed)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn recompute_counters(&self, id: CampaignId) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns c SET
                recipient_count = s.total,
                sent_count = s.sent,
                delivered_count = s.delivered,
                opened_count = s.opened,
                clicked_count = s.clicked,
                bounced_count = s.bounced,
                unsubscribed_count = s.unsubscribed,
                counters_dirty = FALSE,
                updated_at = NOW()
            FROM (
                SELECT
                    COUNT(*) AS total,
                    COUNT(*) FILTER (WHERE sent_at IS NOT NULL) AS sent,
                    COUNT(*) FILTER (WHERE delivered_at IS NOT NULL) AS delivered,
                    COUNT(*) FILTER (WHERE opened_at IS NOT NULL) AS opened,
                    COUNT(*) FILTER (WHERE clicked_at IS NOT NULL) AS clicked,
                    COUNT(*) FILTER (WHERE bounced_at IS NOT NULL) AS bounced,
                    COUNT(*) FILTER (WHERE unsubscribed_at IS NOT NULL) AS unsubscribed
                FROM campaign_recipients
                WHERE campaign_id = $1
            ) s
            WHERE c.id = $1
            RETURNING c.*
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn mark_dirty(&self, id: CampaignId) -> Result<()> {
        sqlx::query("UPDATE campaigns SET counters_dirty = TRUE WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn list_dirty(&self) -> Result<Vec<CampaignId>> {
        let rows: Vec<(CampaignId,)> =
            sqlx::query_as("SELECT id FROM campaigns WHERE counters_dirty")
                .fetch_all(self.pool.pool())
                .await
                .map_err(|e| Error::Database(e.to_string()))?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
