//! Database access for jobtrack-scan
//!
//! Free functions over `SqlitePool` for standalone reads and writes, and over
//! `&mut SqliteConnection` for statements that must share a transaction.

pub mod applications;
pub mod references;
pub mod scan_runs;

use chrono::{DateTime, Utc};
use jobtrack_common::time::format_timestamp;

/// Bind value for an optional timestamp column
pub(crate) fn optional_timestamp(ts: Option<&DateTime<Utc>>) -> Option<String> {
    ts.map(format_timestamp)
}

/// Single-connection in-memory database with the full schema
#[cfg(test)]
pub(crate) async fn test_pool() -> sqlx::SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .expect("enable foreign keys");
    jobtrack_common::db::create_schema(&pool)
        .await
        .expect("create schema");
    pool
}
