//! Test Helper Utilities
//!
//! Shared utilities for testing jobtrack-scan: an in-memory database and a
//! scripted message source.

#![allow(dead_code)]

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jobtrack_common::events::EventBus;
use jobtrack_scan::config::{CliOverrides, ServiceConfig};
use jobtrack_scan::models::RawMessage;
use jobtrack_scan::services::{FetchWindow, MessageSource, SourceError};
use jobtrack_scan::AppState;
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Single-connection in-memory database with the job tracker schema
pub async fn create_test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .expect("Failed to enable foreign keys");
    jobtrack_common::db::create_schema(&pool)
        .await
        .expect("Failed to create schema");
    pool
}

/// Message source returning queued responses in order
///
/// Once the queue is empty every fetch returns no messages.
pub struct FakeSource {
    responses: Mutex<VecDeque<Result<Vec<RawMessage>, SourceError>>>,
    ready: Result<(), SourceError>,
    fetch_delay: Duration,
    fetch_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            ready: Ok(()),
            fetch_delay: Duration::ZERO,
            fetch_calls: AtomicUsize::new(0),
        }
    }

    pub fn not_configured(message: &str) -> Self {
        Self {
            ready: Err(SourceError::NotConfigured(message.to_string())),
            ..Self::new()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    pub fn push(self, response: Result<Vec<RawMessage>, SourceError>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

impl MessageSource for FakeSource {
    fn ensure_ready(&self) -> Result<(), SourceError> {
        self.ready.clone()
    }

    fn fetch_recent(&self, window: &FetchWindow) -> Result<Vec<RawMessage>, SourceError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if !self.fetch_delay.is_zero() {
            std::thread::sleep(self.fetch_delay);
        }
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(Vec::new()))
            .map(|mut messages| {
                messages.truncate(window.max_messages);
                messages
            })
    }
}

/// Message received `hours_ago` hours before now
pub fn message(id: &str, subject: &str, sender: &str, hours_ago: i64) -> RawMessage {
    RawMessage {
        provider_id: id.to_string(),
        subject: Some(subject.to_string()),
        sender: Some(sender.to_string()),
        received_at: hours_before_now(hours_ago),
        snippet: None,
    }
}

pub fn hours_before_now(hours: i64) -> DateTime<Utc> {
    Utc::now() - ChronoDuration::hours(hours)
}

/// Resolved configuration with the given cooldown and test-friendly defaults
pub fn test_config(cooldown: Duration) -> ServiceConfig {
    let mut config = ServiceConfig::resolve(&CliOverrides::default(), &Default::default());
    config.scan.cooldown = cooldown;
    config.fetch_workers = 2;
    config
}

/// App state over `pool` and `source`
pub fn test_state(pool: SqlitePool, source: Arc<dyn MessageSource>, cooldown: Duration) -> AppState {
    AppState::new(pool, EventBus::new(100), source, &test_config(cooldown))
}
