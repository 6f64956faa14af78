//! Database initialization
//!
//! Opens (creating if needed) the SQLite database, applies connection pragmas
//! and creates the job tracker tables. Table creation is idempotent.

use crate::time::{format_timestamp, now};
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Busy timeout applied to every pooled connection
pub const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Error text recorded on scan runs abandoned by a previous process
pub const INTERRUPTED_SCAN_ERROR: &str = "Scan interrupted by service restart";

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Pragmas go on the connect options so every pooled connection gets them
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    let stale = fail_stale_scan_runs(&pool).await?;
    if stale > 0 {
        warn!(stale_runs = stale, "Marked scan runs left running by a previous process as failed");
    }

    Ok(pool)
}

/// Create all job tracker tables and indexes
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_applications_table(pool).await?;
    create_message_references_table(pool).await?;
    create_scan_runs_table(pool).await?;
    Ok(())
}

async fn create_applications_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS applications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            company_name TEXT NOT NULL,
            role_title TEXT,
            status TEXT NOT NULL DEFAULT 'applied'
                CHECK (status IN ('new', 'applied', 'interviewing', 'offer', 'rejected', 'hired')),
            source TEXT,
            applied_at TEXT,
            last_email_at TEXT,
            notes TEXT,
            job_url TEXT,
            next_action_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_applications_status ON applications(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_applications_updated_at ON applications(updated_at)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_message_references_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS message_references (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            provider_id TEXT NOT NULL UNIQUE,
            subject TEXT,
            sender TEXT,
            received_at TEXT,
            snippet TEXT,
            application_id INTEGER REFERENCES applications(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_message_references_application ON message_references(application_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_message_references_received_at ON message_references(received_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_scan_runs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scan_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            status TEXT NOT NULL DEFAULT 'running'
                CHECK (status IN ('running', 'completed', 'failed')),
            emails_fetched INTEGER,
            emails_inserted INTEGER,
            apps_created INTEGER,
            error TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Mark scan runs still `running` from an earlier process as failed
///
/// Only one process owns the database, so any run still marked running at
/// startup can never complete.
pub async fn fail_stale_scan_runs(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE scan_runs SET status = 'failed', completed_at = ?, error = ? WHERE status = 'running'",
    )
    .bind(format_timestamp(&now()))
    .bind(INTERRUPTED_SCAN_ERROR)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
