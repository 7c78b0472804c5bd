//! Sendwell Storage - Persistence for campaigns, recipients and applied events
//!
//! PostgreSQL repositories (sqlx) and an in-memory store implementing the
//! same traits.

pub mod db;
pub mod memory;
pub mod models;
pub mod repository;

pub use db::{DatabasePool, Repositories};
pub use memory::MemoryStore;
pub use models::*;
pub use repository::*;
