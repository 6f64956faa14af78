//! Application persistence

use chrono::{DateTime, Utc};
use jobtrack_common::time::{format_timestamp, now, parse_optional_timestamp, parse_timestamp};
use jobtrack_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;

use super::optional_timestamp;
use crate::models::{Application, ApplicationStatus, ApplicationUpdate, NewApplication};

const SELECT_COLUMNS: &str = "id, company_name, role_title, status, source, applied_at, \
     last_email_at, notes, job_url, next_action_at, created_at, updated_at";

/// Sort orders accepted by `list_applications`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationSort {
    #[default]
    UpdatedAt,
    AppliedAt,
    CompanyName,
}

impl ApplicationSort {
    fn order_clause(&self) -> &'static str {
        match self {
            ApplicationSort::UpdatedAt => "updated_at DESC, id DESC",
            ApplicationSort::AppliedAt => "applied_at IS NULL, applied_at DESC, id DESC",
            ApplicationSort::CompanyName => "company_name COLLATE NOCASE ASC, id ASC",
        }
    }
}

/// List filter and page
#[derive(Debug, Clone, Default)]
pub struct ApplicationFilter {
    pub status: Option<ApplicationStatus>,
    /// Substring of company name or role title
    pub search: Option<String>,
    pub sort: ApplicationSort,
    pub limit: i64,
    pub offset: i64,
}

/// Dashboard counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationStats {
    pub total: i64,
    pub by_status: HashMap<ApplicationStatus, i64>,
    /// Percentage of applications with at least one linked email, one decimal
    pub reply_rate: f64,
}

/// Insert an application and return it as stored
///
/// An empty or whitespace role is stored as NULL.
pub async fn insert_application(
    conn: &mut SqliteConnection,
    new: &NewApplication,
) -> Result<Application> {
    let company_name = new.company_name.trim().to_string();
    if company_name.is_empty() {
        return Err(Error::InvalidInput("company_name must not be empty".to_string()));
    }
    let role_title = new
        .role_title
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string);
    let timestamp = now();

    let result = sqlx::query(
        r#"
        INSERT INTO applications (
            company_name, role_title, status, source, applied_at, last_email_at,
            notes, job_url, next_action_at, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&company_name)
    .bind(&role_title)
    .bind(new.status.as_str())
    .bind(&new.source)
    .bind(optional_timestamp(new.applied_at.as_ref()))
    .bind(optional_timestamp(new.last_email_at.as_ref()))
    .bind(&new.notes)
    .bind(&new.job_url)
    .bind(optional_timestamp(new.next_action_at.as_ref()))
    .bind(format_timestamp(&timestamp))
    .bind(format_timestamp(&timestamp))
    .execute(conn)
    .await?;

    Ok(Application {
        id: result.last_insert_rowid(),
        company_name,
        role_title,
        status: new.status,
        source: new.source.clone(),
        applied_at: new.applied_at,
        last_email_at: new.last_email_at,
        notes: new.notes.clone(),
        job_url: new.job_url.clone(),
        next_action_at: new.next_action_at,
        created_at: timestamp,
        updated_at: timestamp,
    })
}

pub async fn get_application(conn: &mut SqliteConnection, id: i64) -> Result<Option<Application>> {
    let row = sqlx::query(&format!("SELECT {} FROM applications WHERE id = ?", SELECT_COLUMNS))
        .bind(id)
        .fetch_optional(conn)
        .await?;

    row.as_ref().map(row_to_application).transpose()
}

/// Every application, in creation order (matcher candidates)
pub async fn list_all_applications(conn: &mut SqliteConnection) -> Result<Vec<Application>> {
    let rows = sqlx::query(&format!("SELECT {} FROM applications ORDER BY id", SELECT_COLUMNS))
        .fetch_all(conn)
        .await?;

    rows.iter().map(row_to_application).collect()
}

/// Filtered, sorted page of applications with the total matching count
pub async fn list_applications(
    pool: &SqlitePool,
    filter: &ApplicationFilter,
) -> Result<(Vec<Application>, i64)> {
    let search = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s));

    let mut count_query: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM applications WHERE 1 = 1");
    push_filters(&mut count_query, filter.status, search.as_deref());
    let total: i64 = count_query.build_query_scalar::<i64>().fetch_one(pool).await?;

    let mut list_query: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM applications WHERE 1 = 1", SELECT_COLUMNS));
    push_filters(&mut list_query, filter.status, search.as_deref());
    list_query.push(" ORDER BY ");
    list_query.push(filter.sort.order_clause());
    list_query.push(" LIMIT ");
    list_query.push_bind(filter.limit);
    list_query.push(" OFFSET ");
    list_query.push_bind(filter.offset);

    let rows = list_query.build().fetch_all(pool).await?;
    let applications = rows.iter().map(row_to_application).collect::<Result<Vec<_>>>()?;

    Ok((applications, total))
}

fn push_filters<'a>(
    query: &mut QueryBuilder<'a, Sqlite>,
    status: Option<ApplicationStatus>,
    search: Option<&'a str>,
) {
    if let Some(status) = status {
        query.push(" AND status = ");
        query.push_bind(status.as_str());
    }
    if let Some(pattern) = search {
        query.push(" AND (company_name LIKE ");
        query.push_bind(pattern);
        query.push(" OR role_title LIKE ");
        query.push_bind(pattern);
        query.push(")");
    }
}

/// Apply a partial update and bump `updated_at`
///
/// Returns `None` when the application does not exist.
pub async fn update_application(
    pool: &SqlitePool,
    id: i64,
    update: &ApplicationUpdate,
) -> Result<Option<Application>> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE applications SET updated_at = ");
    query.push_bind(format_timestamp(&now()));

    if let Some(company) = &update.company_name {
        let company = company.trim();
        if company.is_empty() {
            return Err(Error::InvalidInput("company_name must not be empty".to_string()));
        }
        query.push(", company_name = ");
        query.push_bind(company.to_string());
    }
    if let Some(role) = &update.role_title {
        let role = role.trim();
        query.push(", role_title = ");
        query.push_bind((!role.is_empty()).then(|| role.to_string()));
    }
    if let Some(status) = update.status {
        query.push(", status = ");
        query.push_bind(status.as_str());
    }
    if let Some(source) = &update.source {
        query.push(", source = ");
        query.push_bind(source.clone());
    }
    if let Some(applied_at) = &update.applied_at {
        query.push(", applied_at = ");
        query.push_bind(format_timestamp(applied_at));
    }
    if let Some(notes) = &update.notes {
        query.push(", notes = ");
        query.push_bind(notes.clone());
    }
    if let Some(job_url) = &update.job_url {
        query.push(", job_url = ");
        query.push_bind(job_url.clone());
    }
    if let Some(next_action_at) = &update.next_action_at {
        query.push(", next_action_at = ");
        query.push_bind(format_timestamp(next_action_at));
    }

    query.push(" WHERE id = ");
    query.push_bind(id);

    let mut conn = pool.acquire().await?;
    let result = query.build().execute(&mut *conn).await?;
    if result.rows_affected() == 0 {
        return Ok(None);
    }

    get_application(&mut conn, id).await
}

/// Delete an application; linked references go with it
pub async fn delete_application(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM applications WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() == 1)
}

/// Raise `last_email_at` to `received_at`, never lowering it
pub async fn bump_last_email_at(
    conn: &mut SqliteConnection,
    application_id: i64,
    received_at: &DateTime<Utc>,
) -> Result<()> {
    let received_at = format_timestamp(received_at);

    sqlx::query(
        "UPDATE applications SET last_email_at = ? \
         WHERE id = ? AND (last_email_at IS NULL OR last_email_at < ?)",
    )
    .bind(&received_at)
    .bind(application_id)
    .bind(&received_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Reset `last_email_at` to the newest remaining linked email (NULL if none)
pub async fn recompute_last_email_at(conn: &mut SqliteConnection, application_id: i64) -> Result<()> {
    sqlx::query(
        "UPDATE applications SET last_email_at = \
         (SELECT MAX(received_at) FROM message_references WHERE application_id = ?) \
         WHERE id = ?",
    )
    .bind(application_id)
    .bind(application_id)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn application_stats(pool: &SqlitePool) -> Result<ApplicationStats> {
    let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM applications GROUP BY status")
        .fetch_all(pool)
        .await?;

    let mut by_status: HashMap<ApplicationStatus, i64> =
        ApplicationStatus::ALL.into_iter().map(|s| (s, 0)).collect();
    let mut total = 0;
    for row in &rows {
        let status: ApplicationStatus = row
            .get::<&str, _>("status")
            .parse()
            .map_err(Error::Internal)?;
        let n: i64 = row.get("n");
        by_status.insert(status, n);
        total += n;
    }

    let replied: i64 = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT application_id) FROM message_references WHERE application_id IS NOT NULL",
    )
    .fetch_one(pool)
    .await?;

    let reply_rate = if total > 0 {
        (replied as f64 / total as f64 * 1000.0).round() / 10.0
    } else {
        0.0
    };

    Ok(ApplicationStats {
        total,
        by_status,
        reply_rate,
    })
}

fn row_to_application(row: &SqliteRow) -> Result<Application> {
    let status = row
        .get::<&str, _>("status")
        .parse::<ApplicationStatus>()
        .map_err(Error::Internal)?;

    Ok(Application {
        id: row.get("id"),
        company_name: row.get("company_name"),
        role_title: row.get("role_title"),
        status,
        source: row.get("source"),
        applied_at: parse_optional_timestamp(row.get("applied_at"))?,
        last_email_at: parse_optional_timestamp(row.get("last_email_at"))?,
        notes: row.get("notes"),
        job_url: row.get("job_url"),
        next_action_at: parse_optional_timestamp(row.get("next_action_at"))?,
        created_at: parse_timestamp(row.get::<&str, _>("created_at"))?,
        updated_at: parse_timestamp(row.get::<&str, _>("updated_at"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::TimeZone;

    fn new_app(company: &str, role: Option<&str>) -> NewApplication {
        NewApplication {
            company_name: company.to_string(),
            role_title: role.map(str::to_string),
            ..NewApplication::default()
        }
    }

    #[tokio::test]
    async fn test_blank_role_stored_as_null() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let app = insert_application(&mut conn, &new_app("Acme", Some("   "))).await.unwrap();
        assert_eq!(app.role_title, None);

        let stored = get_application(&mut conn, app.id).await.unwrap().unwrap();
        assert_eq!(stored.role_title, None);
        assert_eq!(stored.status, ApplicationStatus::Applied);
    }

    #[tokio::test]
    async fn test_empty_company_rejected() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let err = insert_application(&mut conn, &new_app(" ", None)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_bump_last_email_at_never_decreases() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let app = insert_application(&mut conn, &new_app("Acme", None)).await.unwrap();

        let later = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        bump_last_email_at(&mut conn, app.id, &later).await.unwrap();
        bump_last_email_at(&mut conn, app.id, &earlier).await.unwrap();

        let stored = get_application(&mut conn, app.id).await.unwrap().unwrap();
        assert_eq!(stored.last_email_at, Some(later));
    }

    #[tokio::test]
    async fn test_update_missing_application_returns_none() {
        let pool = test_pool().await;
        let update = ApplicationUpdate {
            notes: Some("follow up".to_string()),
            ..ApplicationUpdate::default()
        };

        assert!(update_application(&pool, 999, &update).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_filters_and_sorts() {
        let pool = test_pool().await;
        {
            let mut conn = pool.acquire().await.unwrap();
            insert_application(&mut conn, &new_app("Zeta", Some("Engineer"))).await.unwrap();
            insert_application(&mut conn, &new_app("acme", Some("Designer"))).await.unwrap();
            let mut rejected = new_app("Beta", Some("Engineer"));
            rejected.status = ApplicationStatus::Rejected;
            insert_application(&mut conn, &rejected).await.unwrap();
        }

        let filter = ApplicationFilter {
            sort: ApplicationSort::CompanyName,
            limit: 50,
            ..ApplicationFilter::default()
        };
        let (apps, total) = list_applications(&pool, &filter).await.unwrap();
        assert_eq!(total, 3);
        let names: Vec<&str> = apps.iter().map(|a| a.company_name.as_str()).collect();
        assert_eq!(names, vec!["acme", "Beta", "Zeta"]);

        let filter = ApplicationFilter {
            search: Some("engineer".to_string()),
            status: Some(ApplicationStatus::Applied),
            limit: 50,
            ..ApplicationFilter::default()
        };
        let (apps, total) = list_applications(&pool, &filter).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(apps[0].company_name, "Zeta");

        let filter = ApplicationFilter {
            limit: 1,
            offset: 1,
            ..ApplicationFilter::default()
        };
        let (apps, total) = list_applications(&pool, &filter).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(apps.len(), 1);
    }

    #[tokio::test]
    async fn test_stats_counts_and_reply_rate() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let a = insert_application(&mut conn, &new_app("Acme", None)).await.unwrap();
        insert_application(&mut conn, &new_app("Beta", None)).await.unwrap();
        insert_application(&mut conn, &new_app("Gamma", None)).await.unwrap();

        sqlx::query(
            "INSERT INTO message_references (provider_id, application_id, created_at) \
             VALUES ('m1', ?, '2024-01-01T00:00:00.000000Z')",
        )
        .bind(a.id)
        .execute(&mut *conn)
        .await
        .unwrap();
        drop(conn);

        let stats = application_stats(&pool).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_status[&ApplicationStatus::Applied], 3);
        assert_eq!(stats.by_status[&ApplicationStatus::Offer], 0);
        assert_eq!(stats.reply_rate, 33.3);
    }
}
