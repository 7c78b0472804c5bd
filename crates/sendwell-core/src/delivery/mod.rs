//! Campaign delivery
//!
//! Campaign lifecycle, audience resolution, rate limiting, the outbound
//! transport and the background worker that sends to recipients.

mod audience;
mod orchestrator;
mod rate_limiter;
mod retry;
mod sender;
mod transport;
mod worker;

pub use audience::{AudienceResolver, StoredAudienceResolver};
pub use orchestrator::{CampaignError, CampaignManager};
pub use rate_limiter::{LimiterClass, RateLimitError, RateLimiter, RatePermit};
pub use retry::RetryPolicy;
pub use sender::{RecipientSender, SendOutcome, SEND_REJECTED};
pub use transport::{OutboundEmail, SendError, SmtpTransport, Transport};
pub use worker::{CycleReport, DeliveryWorker};
