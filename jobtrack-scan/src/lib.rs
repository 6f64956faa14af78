//! jobtrack-scan library interface
//!
//! Exposes the router, state and services for integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use jobtrack_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::config::{PaginationDefaults, ServiceConfig};
use crate::models::ScanSummary;
use crate::services::{ApplicationService, FetchPool, MessageSource, ScanError, ScanService};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub scan_service: Arc<ScanService>,
    pub applications: ApplicationService,
    /// Blocking workers for mail provider calls, drained at shutdown
    pub fetch_pool: Arc<FetchPool>,
    pub progress_idle_timeout: Duration,
    pub pagination: PaginationDefaults,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Most recent scan failure, reported by `/health`
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        source: Arc<dyn MessageSource>,
        config: &ServiceConfig,
    ) -> Self {
        let fetch_pool = Arc::new(FetchPool::new(config.fetch_workers));
        let scan_service = Arc::new(ScanService::new(
            db.clone(),
            event_bus.clone(),
            source,
            Arc::clone(&fetch_pool),
            config.scan,
        ));

        Self {
            applications: ApplicationService::new(db.clone()),
            db,
            event_bus,
            scan_service,
            fetch_pool,
            progress_idle_timeout: config.progress_idle_timeout,
            pagination: config.pagination,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Remember a scan failure for `/health`; success clears it
    ///
    /// Cooldown rejections are not failures and leave the value alone.
    pub async fn record_scan_result(&self, result: &Result<ScanSummary, ScanError>) {
        match result {
            Ok(_) => *self.last_error.write().await = None,
            Err(ScanError::RateLimited { .. }) => {}
            Err(e) => *self.last_error.write().await = Some(e.to_string()),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    let job_tracker = Router::new()
        .merge(api::scan_routes())
        .merge(api::application_routes())
        .merge(api::email_routes());

    Router::new()
        .nest("/job-tracker", job_tracker)
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
