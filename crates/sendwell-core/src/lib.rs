//! Sendwell Core - Campaign delivery and engagement tracking
//!
//! This crate provides the delivery pipeline (campaign lifecycle, rate
//! limiting, outbound transport, background worker), the tracking pipeline
//! (webhook normalization, idempotency, recipient state machine, counters)
//! and the content generation adapter.

pub mod delivery;
pub mod engine;
pub mod generation;
pub mod metrics;
pub mod tracking;

pub use delivery::{
    AudienceResolver, CampaignError, CampaignManager, DeliveryWorker, LimiterClass, RateLimiter,
    RecipientSender, RetryPolicy, SmtpTransport, StoredAudienceResolver, Transport,
};
pub use engine::Engine;
pub use generation::{
    ContentGenerator, GeneratedContent, GenerationError, GenerationRequest, HttpContentGenerator,
    ThrottledGenerator,
};
pub use metrics::Metrics;
pub use tracking::{
    BatchSummary, CampaignAggregator, CampaignAnalytics, EventNormalizer, EventProcessor,
    IdempotencyLedger, ProviderEventKind,
};
