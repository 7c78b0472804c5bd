//! Shared handler state

use sendwell_core::{ContentGenerator, Engine, Metrics};
use sendwell_storage::Repositories;
use std::collections::HashMap;
use std::sync::Arc;

/// Application state shared across handlers
pub struct AppState {
    pub repos: Repositories,
    pub engine: Engine,
    /// `None` when generation is not configured
    pub generator: Option<Arc<dyn ContentGenerator>>,
    /// Signing secret per provider name
    pub webhook_secrets: HashMap<String, String>,
    pub metrics: Metrics,
}
