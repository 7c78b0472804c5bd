//! Engagement tracking - Folds provider events into recipient and campaign state

mod aggregator;
mod event;
mod ledger;
mod normalizer;
mod processor;
mod state_machine;

pub use aggregator::{CampaignAggregator, CampaignAnalytics};
pub use event::{DeliveryEvent, EventKind, RecipientRef};
pub use ledger::{IdempotencyLedger, LedgerOutcome};
pub use normalizer::{EventNormalizer, NormalizeError, NormalizedItem, ProviderEventKind};
pub use processor::{BatchSummary, EventProcessor, ProcessOutcome};
pub use state_machine::{apply_event, Transition};
