//! Repository layer for data access

pub mod campaigns;
pub mod idempotency;
pub mod recipients;

pub use campaigns::{CampaignRepository, DbCampaignRepository};
pub use idempotency::{DbIdempotencyRepository, IdempotencyRepository};
pub use recipients::{DbRecipientRepository, RecipientRepository};
