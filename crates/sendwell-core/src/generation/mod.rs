//! AI content generation
//!
//! Generation is an external capability. Every call goes through the
//! `ai_generation` limiter so cost and provider quotas are respected.

mod client;

pub use client::HttpContentGenerator;

use crate::delivery::{RateLimitError, RateLimiter};
use crate::metrics::Metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Content tone
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Professional,
    Casual,
    Friendly,
    Formal,
    Enthusiastic,
    Urgent,
}

/// Content length
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Length {
    Short,
    #[default]
    Medium,
    Long,
}

/// What to generate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub length: Length,
}

/// Generated text with the service's confidence in it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub content: String,
    /// 0.0 to 1.0
    pub confidence: f64,
}

/// Content generation errors
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generation is not configured")]
    Disabled,

    #[error("Invalid generation request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    #[error("Generation service error: {0}")]
    Upstream(String),
}

impl GenerationError {
    pub fn status_code(&self) -> u16 {
        match self {
            GenerationError::Disabled => 503,
            GenerationError::InvalidRequest(_) => 422,
            GenerationError::RateLimited(_) => 429,
            GenerationError::Upstream(_) => 502,
        }
    }
}

/// Generates campaign content
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent, GenerationError>;
}

/// Runs a generator behind the `ai_generation` limiter
pub struct ThrottledGenerator {
    inner: Arc<dyn ContentGenerator>,
    limiter: Arc<RateLimiter>,
    acquire_timeout: Duration,
    metrics: Option<Metrics>,
}

impl ThrottledGenerator {
    pub fn new(inner: Arc<dyn ContentGenerator>, limiter: Arc<RateLimiter>, acquire_timeout: Duration) -> Self {
        Self {
            inner,
            limiter,
            acquire_timeout,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

#[async_trait]
impl ContentGenerator for ThrottledGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent, GenerationError> {
        if request.prompt.trim().is_empty() {
            return Err(GenerationError::InvalidRequest("prompt is empty".into()));
        }

        let _permit = self.limiter.acquire(self.acquire_timeout).await.map_err(|e| {
            warn!("Generation request not admitted: {}", e);
            if let Some(metrics) = &self.metrics {
                metrics.rate_limit_timeout(self.limiter.class().as_str());
            }
            e
        })?;

        self.inner.generate(request).await
    }
}
