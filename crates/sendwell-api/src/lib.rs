//! Sendwell API - REST API server
//!
//! Provider webhook intake, campaign lifecycle and analytics endpoints,
//! content generation, health checks and Prometheus metrics.

pub mod handlers;
pub mod openapi;
pub mod routes;
pub mod signature;
pub mod state;

pub use openapi::create_openapi_routes;
pub use routes::create_router;
pub use state::AppState;
