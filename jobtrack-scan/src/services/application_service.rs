//! Application and email management
//!
//! Thin layer over the db modules that turns missing rows into `NotFound`
//! and keeps `last_email_at` consistent when emails are assigned by hand.

use jobtrack_common::{Error, Result};
use sqlx::SqlitePool;

use crate::db::applications::{
    self, bump_last_email_at, get_application, recompute_last_email_at, ApplicationFilter,
    ApplicationStats,
};
use crate::db::{references, scan_runs};
use crate::models::{
    Application, ApplicationDetail, ApplicationUpdate, MessageReference, NewApplication, ScanRun,
};

/// Default number of scan runs listed
pub const DEFAULT_SCAN_RUN_LIMIT: i64 = 10;

#[derive(Clone)]
pub struct ApplicationService {
    db: SqlitePool,
}

impl ApplicationService {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn create(&self, new: &NewApplication) -> Result<Application> {
        let mut conn = self.db.acquire().await?;
        let app = applications::insert_application(&mut conn, new).await?;
        tracing::info!(application_id = app.id, company = %app.company_name, "Application created");
        Ok(app)
    }

    /// Application with its linked emails, newest first
    pub async fn get(&self, id: i64) -> Result<ApplicationDetail> {
        let mut conn = self.db.acquire().await?;
        let application = get_application(&mut conn, id)
            .await?
            .ok_or_else(|| not_found_application(id))?;
        drop(conn);

        let emails = references::list_for_application(&self.db, id).await?;
        Ok(ApplicationDetail { application, emails })
    }

    pub async fn list(&self, filter: &ApplicationFilter) -> Result<(Vec<Application>, i64)> {
        applications::list_applications(&self.db, filter).await
    }

    pub async fn update(&self, id: i64, update: &ApplicationUpdate) -> Result<Application> {
        if update.is_empty() {
            return Err(Error::InvalidInput("No fields to update".to_string()));
        }
        applications::update_application(&self.db, id, update)
            .await?
            .ok_or_else(|| not_found_application(id))
    }

    /// Delete an application and its linked emails
    pub async fn delete(&self, id: i64) -> Result<()> {
        if !applications::delete_application(&self.db, id).await? {
            return Err(not_found_application(id));
        }
        tracing::info!(application_id = id, "Application deleted");
        Ok(())
    }

    /// Link an email to an application, moving it if already linked elsewhere
    pub async fn assign_email(&self, application_id: i64, email_id: i64) -> Result<Application> {
        let mut tx = self.db.begin().await?;

        get_application(&mut tx, application_id)
            .await?
            .ok_or_else(|| not_found_application(application_id))?;
        let email = references::get_reference(&mut tx, email_id)
            .await?
            .ok_or_else(|| not_found_email(email_id))?;

        references::set_application(&mut tx, email_id, Some(application_id)).await?;
        if let Some(received_at) = &email.received_at {
            bump_last_email_at(&mut tx, application_id, received_at).await?;
        }
        if let Some(previous) = email.application_id.filter(|prev| *prev != application_id) {
            recompute_last_email_at(&mut tx, previous).await?;
        }

        let app = get_application(&mut tx, application_id)
            .await?
            .ok_or_else(|| not_found_application(application_id))?;
        tx.commit().await?;

        tracing::info!(application_id, email_id, "Email assigned to application");
        Ok(app)
    }

    /// Unlink an email and recompute the application's `last_email_at`
    pub async fn unassign_email(&self, application_id: i64, email_id: i64) -> Result<Application> {
        let mut tx = self.db.begin().await?;

        get_application(&mut tx, application_id)
            .await?
            .ok_or_else(|| not_found_application(application_id))?;
        let email = references::get_reference(&mut tx, email_id)
            .await?
            .ok_or_else(|| not_found_email(email_id))?;
        if email.application_id != Some(application_id) {
            return Err(Error::InvalidInput(format!(
                "Email {} is not linked to application {}",
                email_id, application_id
            )));
        }

        references::set_application(&mut tx, email_id, None).await?;
        recompute_last_email_at(&mut tx, application_id).await?;

        let app = get_application(&mut tx, application_id)
            .await?
            .ok_or_else(|| not_found_application(application_id))?;
        tx.commit().await?;

        tracing::info!(application_id, email_id, "Email unassigned from application");
        Ok(app)
    }

    pub async fn stats(&self) -> Result<ApplicationStats> {
        applications::application_stats(&self.db).await
    }

    pub async fn list_emails(&self, limit: i64, offset: i64) -> Result<(Vec<MessageReference>, i64)> {
        references::list_references(&self.db, limit.max(0), offset.max(0)).await
    }

    pub async fn list_scan_runs(&self, limit: i64) -> Result<Vec<ScanRun>> {
        scan_runs::list_recent(&self.db, limit.max(0)).await
    }
}

fn not_found_application(id: i64) -> Error {
    Error::NotFound(format!("Application {} not found", id))
}

fn not_found_email(id: i64) -> Error {
    Error::NotFound(format!("Email {} not found", id))
}
