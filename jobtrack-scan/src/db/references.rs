//! Message reference persistence
//!
//! References are keyed by the provider's message id. Inserting the same batch
//! twice, or two overlapping batches, never creates a second row for an id.

use chrono::{DateTime, Utc};
use jobtrack_common::time::{format_timestamp, now, parse_optional_timestamp, parse_timestamp};
use jobtrack_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashSet;

use crate::models::{MessageReference, RawMessage};

/// Ids per `IN (...)` existence query, well under SQLite's bound-variable limit
pub const EXISTENCE_CHUNK_SIZE: usize = 500;

const SELECT_COLUMNS: &str =
    "id, provider_id, subject, sender, received_at, snippet, application_id, created_at";

/// Result of `upsert_batch`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpsertOutcome {
    pub inserted: usize,
    /// Ids already stored, repeated within the batch, or lost to a concurrent writer
    pub duplicates: usize,
}

/// Insert the messages whose provider id is not yet stored
///
/// Runs in one transaction. Messages with an empty provider id are dropped.
pub async fn upsert_batch(pool: &SqlitePool, messages: &[RawMessage]) -> Result<UpsertOutcome> {
    let mut outcome = UpsertOutcome::default();

    let mut seen: HashSet<&str> = HashSet::with_capacity(messages.len());
    let mut candidates: Vec<&RawMessage> = Vec::with_capacity(messages.len());
    for message in messages {
        let id = message.provider_id.trim();
        if id.is_empty() {
            tracing::warn!(subject = ?message.subject, "Dropping message without a provider id");
            continue;
        }
        if seen.insert(id) {
            candidates.push(message);
        } else {
            outcome.duplicates += 1;
        }
    }

    if candidates.is_empty() {
        return Ok(outcome);
    }

    let ids: Vec<&str> = candidates.iter().map(|m| m.provider_id.trim()).collect();
    let existing = existing_provider_ids(pool, &ids).await?;

    let created_at = format_timestamp(&now());
    let mut tx = pool.begin().await?;

    for message in candidates {
        let provider_id = message.provider_id.trim();
        if existing.contains(provider_id) {
            outcome.duplicates += 1;
            continue;
        }

        let result = sqlx::query(
            r#"
            INSERT INTO message_references (
                provider_id, subject, sender, received_at, snippet, application_id, created_at
            ) VALUES (?, ?, ?, ?, ?, NULL, ?)
            ON CONFLICT(provider_id) DO NOTHING
            "#,
        )
        .bind(provider_id)
        .bind(&message.subject)
        .bind(&message.sender)
        .bind(format_timestamp(&message.received_at))
        .bind(&message.snippet)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 1 {
            outcome.inserted += 1;
        } else {
            outcome.duplicates += 1;
        }
    }

    tx.commit().await?;

    Ok(outcome)
}

/// Provider ids from `ids` that are already stored
pub async fn existing_provider_ids(pool: &SqlitePool, ids: &[&str]) -> Result<HashSet<String>> {
    let mut existing = HashSet::new();

    for chunk in ids.chunks(EXISTENCE_CHUNK_SIZE) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT provider_id FROM message_references WHERE provider_id IN (");
        let mut separated = builder.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows = builder.build().fetch_all(pool).await?;
        existing.extend(rows.iter().map(|row| row.get::<String, _>("provider_id")));
    }

    Ok(existing)
}

/// All unlinked references, oldest first
pub async fn list_unlinked(conn: &mut SqliteConnection) -> Result<Vec<MessageReference>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM message_references WHERE application_id IS NULL ORDER BY received_at, id",
        SELECT_COLUMNS
    ))
    .fetch_all(conn)
    .await?;

    rows.iter().map(row_to_reference).collect()
}

/// Paginated references, newest first, with the total count
pub async fn list_references(
    pool: &SqlitePool,
    limit: i64,
    offset: i64,
) -> Result<(Vec<MessageReference>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM message_references")
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query(&format!(
        "SELECT {} FROM message_references ORDER BY received_at DESC, id DESC LIMIT ? OFFSET ?",
        SELECT_COLUMNS
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let references = rows.iter().map(row_to_reference).collect::<Result<Vec<_>>>()?;
    Ok((references, total))
}

/// References linked to an application, newest first
pub async fn list_for_application(
    pool: &SqlitePool,
    application_id: i64,
) -> Result<Vec<MessageReference>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM message_references WHERE application_id = ? ORDER BY received_at DESC, id DESC",
        SELECT_COLUMNS
    ))
    .bind(application_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_reference).collect()
}

pub async fn get_reference(conn: &mut SqliteConnection, id: i64) -> Result<Option<MessageReference>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM message_references WHERE id = ?",
        SELECT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(row_to_reference).transpose()
}

/// Point a reference at an application, or unlink it with `None`
pub async fn set_application(
    conn: &mut SqliteConnection,
    reference_id: i64,
    application_id: Option<i64>,
) -> Result<bool> {
    let result = sqlx::query("UPDATE message_references SET application_id = ? WHERE id = ?")
        .bind(application_id)
        .bind(reference_id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn count_references(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM message_references")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn row_to_reference(row: &SqliteRow) -> Result<MessageReference> {
    let received_at: Option<DateTime<Utc>> = parse_optional_timestamp(row.get("received_at"))?;

    Ok(MessageReference {
        id: row.get("id"),
        provider_id: row.get("provider_id"),
        subject: row.get("subject"),
        sender: row.get("sender"),
        received_at,
        snippet: row.get("snippet"),
        application_id: row.get("application_id"),
        created_at: parse_timestamp(row.get::<&str, _>("created_at"))?,
    })
}
