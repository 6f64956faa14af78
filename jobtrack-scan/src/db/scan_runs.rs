//! Scan run audit trail
//!
//! A row is created `running` when a scan starts and is finished exactly once,
//! as either `completed` or `failed`. Finishing only touches rows still
//! `running`, so a second finish is a no-op.

use jobtrack_common::time::{format_timestamp, now, parse_optional_timestamp, parse_timestamp};
use jobtrack_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::models::scan_run::bounded_error;
use crate::models::{ScanRun, ScanRunStatus};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

/// Counters recorded on a completed scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanCounts {
    pub emails_fetched: usize,
    pub emails_inserted: usize,
    pub apps_created: usize,
}

/// Create a `running` row and return its id
pub async fn start_scan_run(pool: &SqlitePool) -> Result<i64> {
    let started_at = format_timestamp(&now());

    retry_on_lock("start_scan_run", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query("INSERT INTO scan_runs (started_at, status) VALUES (?, 'running')")
            .bind(&started_at)
            .execute(pool)
            .await?;
        Ok(result.last_insert_rowid())
    })
    .await
}

/// Mark a run completed; participates in the caller's transaction
pub async fn complete_scan_run(
    conn: &mut SqliteConnection,
    id: i64,
    counts: &ScanCounts,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE scan_runs
        SET status = 'completed', completed_at = ?,
            emails_fetched = ?, emails_inserted = ?, apps_created = ?
        WHERE id = ? AND status = 'running'
        "#,
    )
    .bind(format_timestamp(&now()))
    .bind(counts.emails_fetched as i64)
    .bind(counts.emails_inserted as i64)
    .bind(counts.apps_created as i64)
    .bind(id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Mark a run failed with the error text bounded to 2000 chars
///
/// Counters that are already known are recorded; unknown ones stay NULL.
pub async fn fail_scan_run(
    pool: &SqlitePool,
    id: i64,
    error: &str,
    emails_fetched: Option<usize>,
    emails_inserted: Option<usize>,
) -> Result<bool> {
    let error = bounded_error(error);
    let completed_at = format_timestamp(&now());

    retry_on_lock("fail_scan_run", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(
            r#"
            UPDATE scan_runs
            SET status = 'failed', completed_at = ?, error = ?,
                emails_fetched = ?, emails_inserted = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(&completed_at)
        .bind(&error)
        .bind(emails_fetched.map(|n| n as i64))
        .bind(emails_inserted.map(|n| n as i64))
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    })
    .await
}

/// Most recent runs, newest first
pub async fn list_recent(pool: &SqlitePool, limit: i64) -> Result<Vec<ScanRun>> {
    let rows = sqlx::query(
        r#"
        SELECT id, started_at, completed_at, status, emails_fetched, emails_inserted,
               apps_created, error
        FROM scan_runs
        ORDER BY started_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_scan_run).collect()
}

pub async fn get_scan_run(pool: &SqlitePool, id: i64) -> Result<Option<ScanRun>> {
    let row = sqlx::query(
        r#"
        SELECT id, started_at, completed_at, status, emails_fetched, emails_inserted,
               apps_created, error
        FROM scan_runs WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_scan_run).transpose()
}

fn row_to_scan_run(row: &SqliteRow) -> Result<ScanRun> {
    let status = row
        .get::<&str, _>("status")
        .parse::<ScanRunStatus>()
        .map_err(Error::Internal)?;

    Ok(ScanRun {
        id: row.get("id"),
        started_at: parse_timestamp(row.get::<&str, _>("started_at"))?,
        completed_at: parse_optional_timestamp(row.get("completed_at"))?,
        status,
        emails_fetched: row.get("emails_fetched"),
        emails_inserted: row.get("emails_inserted"),
        apps_created: row.get("apps_created"),
        error: row.get("error"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::scan_run::MAX_SCAN_ERROR_LEN;

    #[tokio::test]
    async fn test_run_completes_once() {
        let pool = test_pool().await;
        let id = start_scan_run(&pool).await.unwrap();

        let counts = ScanCounts {
            emails_fetched: 3,
            emails_inserted: 2,
            apps_created: 1,
        };
        let mut conn = pool.acquire().await.unwrap();
        assert!(complete_scan_run(&mut conn, id, &counts).await.unwrap());
        assert!(!complete_scan_run(&mut conn, id, &counts).await.unwrap());
        drop(conn);

        // A finished run cannot flip to failed
        assert!(!fail_scan_run(&pool, id, "late", None, None).await.unwrap());

        let run = get_scan_run(&pool, id).await.unwrap().unwrap();
        assert_eq!(run.status, ScanRunStatus::Completed);
        assert_eq!(run.apps_created, Some(1));
        assert!(run.completed_at.is_some());
        assert!(run.error.is_none());
    }

    #[tokio::test]
    async fn test_failure_text_is_bounded() {
        let pool = test_pool().await;
        let id = start_scan_run(&pool).await.unwrap();

        let long = "e".repeat(MAX_SCAN_ERROR_LEN * 2);
        assert!(fail_scan_run(&pool, id, &long, Some(4), None).await.unwrap());

        let run = get_scan_run(&pool, id).await.unwrap().unwrap();
        assert_eq!(run.status, ScanRunStatus::Failed);
        assert_eq!(run.error.unwrap().len(), MAX_SCAN_ERROR_LEN);
        assert_eq!(run.emails_fetched, Some(4));
        assert_eq!(run.emails_inserted, None);
        assert_eq!(run.apps_created, None);
    }

    #[tokio::test]
    async fn test_list_recent_newest_first() {
        let pool = test_pool().await;
        let first = start_scan_run(&pool).await.unwrap();
        let second = start_scan_run(&pool).await.unwrap();

        let runs = list_recent(&pool, 10).await.unwrap();
        let ids: Vec<i64> = runs.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second, first]);

        assert_eq!(list_recent(&pool, 1).await.unwrap().len(), 1);
    }
}
