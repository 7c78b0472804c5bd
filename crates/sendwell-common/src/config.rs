//! Configuration for Sendwell

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Webhook ingestion and counter reconciliation
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Campaign delivery worker
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Token buckets per external capability
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,

    /// Outbound SMTP relay
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// AI content generation service
    #[serde(default)]
    pub ai: AiConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname, used in generated Message-IDs
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            bind_address: default_bind_address(),
        }
    }
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database backend: "postgres" or "memory"
    #[serde(default = "default_db_backend")]
    pub backend: String,

    /// Database URL (for postgres)
    pub url: Option<String>,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_db_backend(),
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

fn default_db_backend() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API port
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Width of the timestamp bucket folded into dedup keys
    #[serde(default = "default_dedup_bucket_secs")]
    pub dedup_bucket_secs: u64,

    /// How long dedup keys are kept before they may be purged
    #[serde(default = "default_ledger_retention_days")]
    pub ledger_retention_days: i64,

    /// Interval between counter reconciliation passes
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    /// Per-provider webhook signing secrets (provider name -> secret)
    #[serde(default)]
    pub webhook_secrets: HashMap<String, String>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            dedup_bucket_secs: default_dedup_bucket_secs(),
            ledger_retention_days: default_ledger_retention_days(),
            reconcile_interval_secs: default_reconcile_interval(),
            webhook_secrets: HashMap::new(),
        }
    }
}

fn default_dedup_bucket_secs() -> u64 {
    1
}

fn default_ledger_retention_days() -> i64 {
    30
}

fn default_reconcile_interval() -> u64 {
    300
}

/// Delivery worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Maximum concurrent sends per worker
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Recipients claimed per campaign per cycle
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Interval between processing cycles (seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Send attempts per recipient before it is bounced
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,

    /// First retry delay (seconds), doubled on every further attempt
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,

    /// Upper bound for the retry delay (seconds)
    #[serde(default = "default_backoff_max")]
    pub backoff_max_secs: u64,

    /// How long a claimed recipient stays reserved for one worker
    #[serde(default = "default_claim_lease")]
    pub claim_lease_secs: i64,

    /// How long a send waits for an outbound token
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            batch_size: default_batch_size(),
            poll_interval_secs: default_poll_interval(),
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base(),
            backoff_max_secs: default_backoff_max(),
            claim_lease_secs: default_claim_lease(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

fn default_concurrency() -> usize {
    10
}

fn default_batch_size() -> i64 {
    100
}

fn default_poll_interval() -> u64 {
    5
}

fn default_max_attempts() -> i32 {
    3
}

fn default_backoff_base() -> u64 {
    30
}

fn default_backoff_max() -> u64 {
    3600
}

fn default_claim_lease() -> i64 {
    300
}

fn default_acquire_timeout() -> u64 {
    30
}

/// Rate limits for the external capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitsConfig {
    #[serde(default = "default_outbound_send")]
    pub outbound_send: RateLimitClassConfig,

    #[serde(default = "default_ai_generation")]
    pub ai_generation: RateLimitClassConfig,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            outbound_send: default_outbound_send(),
            ai_generation: default_ai_generation(),
        }
    }
}

/// Token bucket settings for one capability class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitClassConfig {
    /// Tokens added per second
    pub per_second: f64,

    /// Bucket capacity
    pub burst: u32,

    /// Optional cap on calls in flight at once
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

fn default_outbound_send() -> RateLimitClassConfig {
    RateLimitClassConfig {
        per_second: 10.0,
        burst: 20,
        max_concurrency: None,
    }
}

fn default_ai_generation() -> RateLimitClassConfig {
    RateLimitClassConfig {
        per_second: 1.0,
        burst: 5,
        max_concurrency: Some(4),
    }
}

/// SMTP relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Implicit TLS
    #[serde(default)]
    pub use_tls: bool,

    #[serde(default = "default_true")]
    pub use_starttls: bool,

    /// Envelope sender used when a campaign has none
    #[serde(default = "default_from_address")]
    pub from_address: String,

    /// Send timeout in seconds
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: None,
            password: None,
            use_tls: false,
            use_starttls: true,
            from_address: default_from_address(),
            timeout_secs: default_smtp_timeout(),
        }
    }
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

fn default_from_address() -> String {
    "noreply@localhost".to_string()
}

fn default_smtp_timeout() -> u64 {
    30
}

/// AI content generation service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Enable the generation endpoint
    #[serde(default)]
    pub enabled: bool,

    /// Generation service endpoint
    pub endpoint: Option<String>,

    /// Bearer token for the generation service
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_ai_timeout")]
    pub timeout_secs: u64,

    /// How long a generation request waits for a token
    #[serde(default = "default_ai_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            api_key: None,
            timeout_secs: default_ai_timeout(),
            acquire_timeout_secs: default_ai_acquire_timeout(),
        }
    }
}

fn default_ai_timeout() -> u64 {
    60
}

fn default_ai_acquire_timeout() -> u64 {
    10
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from the first file found plus `SENDWELL__*`
    /// environment overrides (e.g. `SENDWELL__DATABASE__URL`).
    pub fn load() -> crate::Result<Self> {
        let mut paths = vec![
            PathBuf::from("./config.toml"),
            PathBuf::from("./config.yaml"),
            PathBuf::from("/etc/sendwell/config.toml"),
            PathBuf::from("/etc/sendwell/config.yaml"),
        ];
        if let Ok(explicit) = std::env::var("SENDWELL_CONFIG") {
            paths.insert(0, PathBuf::from(explicit));
        }

        let mut builder = config::Config::builder();
        if let Some(path) = paths.into_iter().find(|p| p.exists()) {
            builder = builder.add_source(config::File::from(path));
        }

        builder
            .add_source(
                config::Environment::with_prefix("SENDWELL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize::<Config>())
            .map_err(|e| crate::Error::Config(format!("Failed to load config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.backend, "postgres");
        assert_eq!(config.tracking.ledger_retention_days, 30);
        assert_eq!(config.delivery.max_attempts, 3);
        assert_eq!(config.rate_limits.outbound_send.burst, 20);
        assert_eq!(config.rate_limits.ai_generation.max_concurrency, Some(4));
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[database]
backend = "memory"

[tracking]
dedup_bucket_secs = 60

[tracking.webhook_secrets]
sendgrid = "s3cret"

[delivery]
max_attempts = 5

[rate_limits.outbound_send]
per_second = 5.0
burst = 5
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.database.backend, "memory");
        assert_eq!(config.tracking.dedup_bucket_secs, 60);
        assert_eq!(
            config.tracking.webhook_secrets.get("sendgrid").map(String::as_str),
            Some("s3cret")
        );
        assert_eq!(config.delivery.max_attempts, 5);
        assert_eq!(config.delivery.batch_size, 100);
        assert_eq!(config.rate_limits.outbound_send.per_second, 5.0);
        assert_eq!(config.rate_limits.outbound_send.max_concurrency, None);
        assert_eq!(config.rate_limits.ai_generation.burst, 5);
    }
}
