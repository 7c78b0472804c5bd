//! Sendwell - Campaign delivery server entry point

use anyhow::{Context, Result};
use sendwell_api::AppState;
use sendwell_common::config::{Config, LoggingConfig};
use sendwell_core::delivery::{
    DeliveryWorker, LimiterClass, RateLimiter, RecipientSender, RetryPolicy, SmtpTransport,
};
use sendwell_core::generation::{ContentGenerator, HttpContentGenerator, ThrottledGenerator};
use sendwell_core::{Engine, Metrics};
use sendwell_storage::Repositories;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    init_logging(&config.logging);

    info!("Starting Sendwell...");

    let repos = Repositories::connect(&config.database).await?;
    info!("Store ready ({})", repos.backend());

    let metrics = Metrics::new().context("Failed to register metrics")?;
    let engine = Engine::new(&repos, &config.tracking, metrics.clone());

    // Outbound sending
    let send_limiter = Arc::new(RateLimiter::from_config(
        LimiterClass::OutboundSend,
        &config.rate_limits.outbound_send,
    ));
    let transport = Arc::new(SmtpTransport::new(&config.smtp, &config.server.hostname)?);
    let sender = Arc::new(
        RecipientSender::new(
            repos.campaigns.clone(),
            repos.recipients.clone(),
            engine.processor.clone(),
            transport,
            send_limiter,
        )
        .with_retry_policy(RetryPolicy::from_config(&config.delivery))
        .with_acquire_timeout(Duration::from_secs(config.delivery.acquire_timeout_secs))
        .with_default_from(config.smtp.from_address.clone())
        .with_metrics(metrics.clone()),
    );
    let worker = DeliveryWorker::new(
        engine.manager.clone(),
        repos.campaigns.clone(),
        repos.recipients.clone(),
        sender,
        engine.aggregator.clone(),
        engine.ledger.clone(),
    )
    .configure(&config.delivery, &config.tracking);

    // Content generation
    let generator: Option<Arc<dyn ContentGenerator>> = if config.ai.enabled {
        let client = HttpContentGenerator::new(&config.ai)?;
        let limiter = Arc::new(RateLimiter::from_config(
            LimiterClass::AiGeneration,
            &config.rate_limits.ai_generation,
        ));
        info!("Content generation enabled");
        Some(Arc::new(
            ThrottledGenerator::new(
                Arc::new(client),
                limiter,
                Duration::from_secs(config.ai.acquire_timeout_secs),
            )
            .with_metrics(metrics.clone()),
        ))
    } else {
        info!("Content generation disabled");
        None
    };

    let webhook_secrets = config
        .tracking
        .webhook_secrets
        .iter()
        .map(|(provider, secret)| (provider.to_ascii_lowercase(), secret.clone()))
        .collect();

    let state = Arc::new(AppState {
        repos,
        engine,
        generator,
        webhook_secrets,
        metrics,
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start delivery worker
    let worker_handle = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            worker.run(shutdown).await;
        })
    };

    // Start API server
    let api_handle = {
        let app = with_cors(sendwell_api::create_router(state), &config.api.cors_origins);
        let addr = format!("{}:{}", config.server.bind_address, config.api.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind API server on {}", addr))?;
        info!("Starting API server on {}", addr);

        let mut shutdown = shutdown_rx;
        tokio::spawn(async move {
            let graceful = async move {
                let _ = shutdown.changed().await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(graceful)
                .await
            {
                error!("API server error: {}", e);
            }
        })
    };

    info!("Sendwell started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    if let Err(e) = worker_handle.await {
        warn!("Delivery worker ended abnormally: {}", e);
    }
    if let Err(e) = api_handle.await {
        warn!("API server ended abnormally: {}", e);
    }

    info!("Sendwell shutdown complete");

    Ok(())
}

fn with_cors(router: axum::Router, origins: &[String]) -> axum::Router {
    if origins.is_empty() {
        return router;
    }
    let origins: Vec<_> = origins
        .iter()
        .filter_map(|o| match o.parse::<axum::http::HeaderValue>() {
            Ok(origin) => Some(origin),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();
    router.layer(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    )
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
