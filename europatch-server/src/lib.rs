//! europatch-server library interface
//!
//! Exposes the scraper, services, repository functions and router so the
//! binary and the integration tests share one wiring.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod scraper;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use europatch_common::config::{CacheConfig, ScraperConfig};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::scraper::PageFetcher;
use crate::services::{KnowledgeCache, RackParser};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    pub rack_parser: Arc<RackParser>,
    pub knowledge: Arc<KnowledgeCache>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, fetcher: Arc<dyn PageFetcher>, scraper: &ScraperConfig, cache: CacheConfig) -> Self {
        Self {
            db,
            rack_parser: Arc::new(RackParser::new(fetcher.clone(), scraper.base_url.clone())),
            knowledge: Arc::new(KnowledgeCache::new(fetcher, cache)),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::module_routes())
        .merge(api::rack_routes())
        .merge(api::patch_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
