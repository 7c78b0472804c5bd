//! Database connection and pool management

use crate::memory::MemoryStore;
use crate::repository::{
    CampaignRepository, DbCampaignRepository, DbIdempotencyRepository, DbRecipientRepository,
    IdempotencyRepository, RecipientRepository,
};
use sendwell_common::config::DatabaseConfig;
use sendwell_common::{Error, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Database pool wrapper
#[derive(Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| Error::Config("Database URL required for PostgreSQL".to_string()))?;

        info!(backend = %config.backend, "Connecting to database");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&url)
            .await
            .map_err(|e| Error::Database(format!("Failed to connect: {}", e)))?;

        info!("Database connection established");

        Ok(Self { pool })
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Migration failed: {}", e)))?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Health check failed: {}", e)))?;
        Ok(())
    }
}

/// The repositories a running service needs, behind trait objects so the
/// backend can be chosen at startup.
#[derive(Clone)]
pub struct Repositories {
    pub campaigns: Arc<dyn CampaignRepository>,
    pub recipients: Arc<dyn RecipientRepository>,
    pub idempotency: Arc<dyn IdempotencyRepository>,
    pool: Option<DatabasePool>,
}

impl Repositories {
    /// Connect the backend named in the configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        match config.backend.as_str() {
            "postgres" => {
                let pool = DatabasePool::new(config).await?;
                pool.migrate().await?;
                Ok(Self::postgres(pool))
            }
            "memory" => {
                info!("Using in-memory store; data is lost on restart");
                Ok(Self::in_memory())
            }
            other => Err(Error::Config(format!(
                "Unsupported database backend: {}",
                other
            ))),
        }
    }

    pub fn postgres(pool: DatabasePool) -> Self {
        Self {
            campaigns: Arc::new(DbCampaignRepository::new(pool.clone())),
            recipients: Arc::new(DbRecipientRepository::new(pool.clone())),
            idempotency: Arc::new(DbIdempotencyRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    pub fn in_memory() -> Self {
        Self::from_memory(MemoryStore::new())
    }

    pub fn from_memory(store: MemoryStore) -> Self {
        Self {
            campaigns: Arc::new(store.clone()),
            recipients: Arc::new(store.clone()),
            idempotency: Arc::new(store),
            pool: None,
        }
    }

    pub fn backend(&self) -> &'static str {
        if self.pool.is_some() {
            "postgres"
        } else {
            "memory"
        }
    }

    pub async fn health_check(&self) -> Result<()> {
        match &self.pool {
            Some(pool) => pool.health_check().await,
            None => Ok(()),
        }
    }
}
