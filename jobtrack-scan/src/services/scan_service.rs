//! Scan entry point
//!
//! `run_scan` admits the request through the cooldown gate, checks the message
//! source configuration, then hands off to the orchestrator. Rejections at
//! either check happen before any audit row exists.

use jobtrack_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::admission::{retry_after_secs, AdmissionGate};
use super::fetch_pool::{FetchPool, PoolError};
use super::message_source::{FetchWindow, MessageSource, SourceError};
use super::scan_orchestrator::{ProgressSender, ScanOrchestrator};
use crate::models::ScanSummary;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("A scan ran recently, retry in {}s", retry_after_secs(*retry_after))]
    RateLimited { retry_after: Duration },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Mail provider error: {0}")]
    Provider(String),

    #[error("Scan cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SourceError> for ScanError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotConfigured(msg) => ScanError::Configuration(msg),
            SourceError::Transport(msg) => ScanError::Provider(msg),
        }
    }
}

impl From<PoolError> for ScanError {
    fn from(err: PoolError) -> Self {
        ScanError::Internal(err.to_string())
    }
}

impl From<jobtrack_common::Error> for ScanError {
    fn from(err: jobtrack_common::Error) -> Self {
        ScanError::Internal(err.to_string())
    }
}

/// Scan tuning resolved from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    pub window: FetchWindow,
    pub cooldown: Duration,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            window: FetchWindow::default(),
            cooldown: super::admission::DEFAULT_COOLDOWN,
        }
    }
}

pub struct ScanService {
    admission: AdmissionGate,
    source: Arc<dyn MessageSource>,
    fetch_pool: Arc<FetchPool>,
    orchestrator: ScanOrchestrator,
}

impl ScanService {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        source: Arc<dyn MessageSource>,
        fetch_pool: Arc<FetchPool>,
        settings: ScanSettings,
    ) -> Self {
        let orchestrator = ScanOrchestrator::new(
            db,
            event_bus,
            Arc::clone(&source),
            Arc::clone(&fetch_pool),
            settings.window,
        );
        Self {
            admission: AdmissionGate::new(settings.cooldown),
            source,
            fetch_pool,
            orchestrator,
        }
    }

    /// Run one scan, streaming progress to `progress` when given
    pub async fn run_scan(
        &self,
        progress: Option<ProgressSender>,
        cancel: CancellationToken,
    ) -> Result<ScanSummary, ScanError> {
        if let Err(retry_after) = self.admission.try_admit().await {
            tracing::info!(retry_after_secs = retry_after_secs(retry_after), "Scan rejected by cooldown");
            return Err(ScanError::RateLimited { retry_after });
        }

        let source = Arc::clone(&self.source);
        if let Err(e) = self.fetch_pool.run(move || source.ensure_ready()).await? {
            tracing::warn!(error = %e, "Message source not ready, scan not started");
            return Err(e.into());
        }

        self.orchestrator.execute(progress, cancel).await
    }
}
