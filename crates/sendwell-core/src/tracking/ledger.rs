//! Idempotency Ledger - Records which events have been applied

use chrono::{Duration, Utc};
use sendwell_common::Result;
use sendwell_storage::repository::IdempotencyRepository;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of recording a dedup key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// First sighting; the caller owns applying the event
    Applied,
    /// Seen before; the event must not be applied again
    AlreadyApplied,
}

/// Dedup ledger over a store with a uniqueness constraint on the key
pub struct IdempotencyLedger {
    repo: Arc<dyn IdempotencyRepository>,
    retention: Duration,
}

impl IdempotencyLedger {
    pub fn new(repo: Arc<dyn IdempotencyRepository>, retention: Duration) -> Self {
        Self { repo, retention }
    }

    pub async fn record(&self, key: &str) -> Result<LedgerOutcome> {
        if self.repo.insert_if_absent(key, Utc::now()).await? {
            Ok(LedgerOutcome::Applied)
        } else {
            debug!(dedup_key = %key, "Event already applied");
            Ok(LedgerOutcome::AlreadyApplied)
        }
    }

    /// Forget a key whose application failed, so a provider retry can apply it
    pub async fn release(&self, key: &str) -> Result<()> {
        self.repo.remove(key).await
    }

    /// Delete entries older than the retention window
    pub async fn purge(&self) -> Result<u64> {
        let cutoff = Utc::now() - self.retention;
        let purged = self.repo.purge_older_than(cutoff).await?;
        if purged > 0 {
            info!("Purged {} idempotency keys older than {}", purged, cutoff);
        }
        Ok(purged)
    }
}
