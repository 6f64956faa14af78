//! Scan orchestrator
//!
//! Drives one scan through its stages:
//!
//! fetching → filtering → saving → matching → creating → done
//!
//! with `error` reachable from any in-progress stage. Each stage is a
//! `phase_*` method and cancellation is checked between stages.
//!
//! Commit boundaries:
//! - the audit row is created in its own commit before fetching
//! - saved references are committed at the end of `saving`
//! - matching, creating and the audit completion share one transaction
//!
//! On failure the audit row is marked failed; earlier commits stay.

use chrono::Utc;
use jobtrack_common::events::{EventBus, JobTrackerEvent};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::application_inference::infer_batch;
use super::application_matcher::match_application;
use super::fetch_pool::FetchPool;
use super::message_source::{FetchWindow, MessageSource};
use super::relevance_filter::is_job_related;
use super::scan_service::ScanError;
use crate::db::applications::{bump_last_email_at, insert_application, list_all_applications};
use crate::db::references::{list_unlinked, set_application, upsert_batch, UpsertOutcome};
use crate::db::scan_runs::{complete_scan_run, fail_scan_run, start_scan_run, ScanCounts};
use crate::models::application::dedup_key;
use crate::models::{Application, RawMessage, ScanProgress, ScanStage, ScanSummary};

/// Receiving end of a scan's progress reports
pub type ProgressSender = mpsc::Sender<ScanProgress>;

/// Counters known so far, recorded on failure
#[derive(Debug, Default)]
struct ScanTally {
    emails_fetched: Option<usize>,
    emails_inserted: Option<usize>,
}

/// Progress fan-out for one scan: the caller's channel plus the event bus
struct ProgressReporter {
    progress: Option<ProgressSender>,
    event_bus: EventBus,
    scan_run_id: Option<i64>,
    cancel: CancellationToken,
}

impl ProgressReporter {
    async fn emit(&self, stage: ScanStage, detail: impl Into<String>) {
        let detail = detail.into();
        tracing::debug!(scan_run_id = ?self.scan_run_id, stage = stage.as_str(), detail = %detail, "Scan progress");

        self.event_bus.emit_lossy(JobTrackerEvent::ScanProgress {
            scan_run_id: self.scan_run_id,
            stage: stage.as_str().to_string(),
            detail: detail.clone(),
            timestamp: Utc::now(),
        });

        if let Some(tx) = &self.progress {
            // A departed or stalled consumer never blocks a cancelled scan
            tokio::select! {
                _ = tx.send(ScanProgress::new(stage, detail)) => {}
                _ = self.cancel.cancelled() => {}
            }
        }
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<(), ScanError> {
    if cancel.is_cancelled() {
        Err(ScanError::Cancelled)
    } else {
        Ok(())
    }
}

pub struct ScanOrchestrator {
    db: SqlitePool,
    event_bus: EventBus,
    source: Arc<dyn MessageSource>,
    fetch_pool: Arc<FetchPool>,
    window: FetchWindow,
}

impl ScanOrchestrator {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        source: Arc<dyn MessageSource>,
        fetch_pool: Arc<FetchPool>,
        window: FetchWindow,
    ) -> Self {
        Self {
            db,
            event_bus,
            source,
            fetch_pool,
            window,
        }
    }

    /// Run one scan to `done` or `error`
    ///
    /// Exactly one terminal stage is reported. The audit row is best-effort:
    /// when it cannot be created the scan still runs.
    pub async fn execute(
        &self,
        progress: Option<ProgressSender>,
        cancel: CancellationToken,
    ) -> Result<ScanSummary, ScanError> {
        let start_time = Instant::now();

        let scan_run_id = match start_scan_run(&self.db).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(error = %e, "Could not record scan run start");
                None
            }
        };

        tracing::info!(scan_run_id = ?scan_run_id, "Starting email scan");
        self.event_bus.emit_lossy(JobTrackerEvent::ScanStarted {
            scan_run_id,
            timestamp: Utc::now(),
        });

        let reporter = ProgressReporter {
            progress,
            event_bus: self.event_bus.clone(),
            scan_run_id,
            cancel: cancel.clone(),
        };
        let mut tally = ScanTally::default();

        match self.run_stages(&reporter, &cancel, &mut tally).await {
            Ok((summary, emails_fetched)) => {
                reporter
                    .emit(
                        ScanStage::Done,
                        format!(
                            "Scan complete: {} emails, {} applications",
                            summary.inserted, summary.applications_created
                        ),
                    )
                    .await;

                let duration_ms = start_time.elapsed().as_millis() as u64;
                tracing::info!(
                    scan_run_id = ?scan_run_id,
                    fetched = emails_fetched,
                    inserted = summary.inserted,
                    apps_created = summary.applications_created,
                    duration_ms,
                    "Email scan completed"
                );
                self.event_bus.emit_lossy(JobTrackerEvent::ScanCompleted {
                    scan_run_id,
                    emails_fetched,
                    emails_inserted: summary.inserted,
                    applications_created: summary.applications_created,
                    duration_ms,
                    timestamp: Utc::now(),
                });

                Ok(summary)
            }
            Err(err) => {
                let message = err.to_string();
                if let Some(id) = scan_run_id {
                    if let Err(e) =
                        fail_scan_run(&self.db, id, &message, tally.emails_fetched, tally.emails_inserted)
                            .await
                    {
                        tracing::warn!(scan_run_id = id, error = %e, "Could not record scan run failure");
                    }
                }

                match &err {
                    ScanError::Cancelled => tracing::info!(scan_run_id = ?scan_run_id, "Email scan cancelled"),
                    _ => tracing::error!(scan_run_id = ?scan_run_id, error = %message, "Email scan failed"),
                }

                // Consumers may already be gone; the error stage goes to the bus regardless
                reporter.emit(ScanStage::Error, message.clone()).await;
                self.event_bus.emit_lossy(JobTrackerEvent::ScanFailed {
                    scan_run_id,
                    error: message,
                    timestamp: Utc::now(),
                });

                Err(err)
            }
        }
    }

    async fn run_stages(
        &self,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
        tally: &mut ScanTally,
    ) -> Result<(ScanSummary, usize), ScanError> {
        let fetched = self.phase_fetching(reporter, cancel).await?;
        let emails_fetched = fetched.len();
        tally.emails_fetched = Some(emails_fetched);
        ensure_not_cancelled(cancel)?;

        let relevant = self.phase_filtering(reporter, fetched).await;
        ensure_not_cancelled(cancel)?;

        let saved = self.phase_saving(reporter, &relevant).await?;
        tally.emails_inserted = Some(saved.inserted);
        ensure_not_cancelled(cancel)?;

        let mut tx = self.db.begin().await.map_err(jobtrack_common::Error::from)?;

        let applications = self.phase_matching(reporter, &mut tx).await?;
        ensure_not_cancelled(cancel)?;

        let applications_created = self.phase_creating(reporter, &mut tx, applications).await?;
        ensure_not_cancelled(cancel)?;

        if let Some(id) = reporter.scan_run_id {
            let counts = ScanCounts {
                emails_fetched,
                emails_inserted: saved.inserted,
                apps_created: applications_created.len(),
            };
            complete_scan_run(&mut tx, id, &counts).await?;
        }

        tx.commit().await.map_err(jobtrack_common::Error::from)?;

        for app in &applications_created {
            self.event_bus.emit_lossy(JobTrackerEvent::ApplicationCreated {
                application_id: app.id,
                company_name: app.company_name.clone(),
                role_title: app.role_title.clone(),
                timestamp: Utc::now(),
            });
        }

        let summary = ScanSummary {
            inserted: saved.inserted,
            applications_created: applications_created.len(),
        };
        Ok((summary, emails_fetched))
    }

    /// Fetch on the blocking pool; cancellation abandons the pending result
    async fn phase_fetching(
        &self,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawMessage>, ScanError> {
        reporter.emit(ScanStage::Fetching, "Connecting to mailbox…").await;

        let source = Arc::clone(&self.source);
        let window = self.window;
        let fetch = self.fetch_pool.run(move || source.fetch_recent(&window));

        let messages = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ScanError::Cancelled),
            result = fetch => result??,
        };

        reporter
            .emit(ScanStage::Fetching, format!("Fetched {} emails", messages.len()))
            .await;
        Ok(messages)
    }

    async fn phase_filtering(&self, reporter: &ProgressReporter, messages: Vec<RawMessage>) -> Vec<RawMessage> {
        reporter
            .emit(ScanStage::Filtering, "Filtering for job-related emails…")
            .await;

        let relevant: Vec<RawMessage> = messages
            .into_iter()
            .filter(|m| is_job_related(m.subject.as_deref(), m.snippet.as_deref()))
            .collect();

        reporter
            .emit(ScanStage::Filtering, format!("Found {} job-related emails", relevant.len()))
            .await;
        relevant
    }

    async fn phase_saving(
        &self,
        reporter: &ProgressReporter,
        messages: &[RawMessage],
    ) -> Result<UpsertOutcome, ScanError> {
        reporter
            .emit(ScanStage::Saving, format!("Saving {} emails…", messages.len()))
            .await;

        let outcome = upsert_batch(&self.db, messages).await?;

        reporter
            .emit(
                ScanStage::Saving,
                format!(
                    "Saved {} new emails ({} duplicates skipped)",
                    outcome.inserted, outcome.duplicates
                ),
            )
            .await;
        Ok(outcome)
    }

    /// Link unlinked references to existing applications
    ///
    /// Returns every stored application for the creating stage.
    async fn phase_matching(
        &self,
        reporter: &ProgressReporter,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<Application>, ScanError> {
        reporter
            .emit(ScanStage::Matching, "Matching emails to existing applications…")
            .await;

        let unlinked = list_unlinked(&mut *conn).await?;
        let applications = list_all_applications(&mut *conn).await?;

        let mut linked = 0;
        if !applications.is_empty() {
            for reference in &unlinked {
                let Some(app) = match_application(reference, &applications) else {
                    continue;
                };
                set_application(&mut *conn, reference.id, Some(app.id)).await?;
                if let Some(received_at) = &reference.received_at {
                    bump_last_email_at(&mut *conn, app.id, received_at).await?;
                }
                linked += 1;
            }
        }

        if linked > 0 {
            tracing::info!(linked, "Linked emails to existing applications");
        }
        reporter
            .emit(ScanStage::Matching, format!("Linked {} emails to existing applications", linked))
            .await;
        Ok(applications)
    }

    /// Infer applications from the remaining unlinked references
    ///
    /// A key created earlier in this scan is linked directly. A key that
    /// already existed before the scan is linked only when the matcher agrees.
    async fn phase_creating(
        &self,
        reporter: &ProgressReporter,
        conn: &mut SqliteConnection,
        mut applications: Vec<Application>,
    ) -> Result<Vec<Application>, ScanError> {
        reporter
            .emit(ScanStage::Creating, "Auto-creating applications…")
            .await;

        let still_unlinked = list_unlinked(&mut *conn).await?;
        let mut existing_keys: HashSet<(String, String)> =
            applications.iter().map(Application::dedup_key).collect();
        let mut created_this_scan: HashMap<(String, String), i64> = HashMap::new();
        let mut created: Vec<Application> = Vec::new();

        for (reference, inferred) in infer_batch(&still_unlinked) {
            let key = dedup_key(&inferred.company, inferred.role.as_deref());

            let target = if let Some(&app_id) = created_this_scan.get(&key) {
                Some(app_id)
            } else if existing_keys.contains(&key) {
                match_application(reference, &applications).map(|app| app.id)
            } else {
                let app = insert_application(&mut *conn, &inferred.to_new_application()).await?;
                tracing::debug!(
                    application_id = app.id,
                    company = %app.company_name,
                    role = ?app.role_title,
                    "Created application from email"
                );
                let app_id = app.id;
                existing_keys.insert(key.clone());
                created_this_scan.insert(key, app_id);
                created.push(app.clone());
                applications.push(app);
                Some(app_id)
            };

            let Some(app_id) = target else {
                continue;
            };
            set_application(&mut *conn, reference.id, Some(app_id)).await?;
            if let Some(received_at) = &reference.received_at {
                bump_last_email_at(&mut *conn, app_id, received_at).await?;
            }
        }

        if !created.is_empty() {
            tracing::info!(count = created.len(), "Auto-created applications from emails");
        }
        reporter
            .emit(ScanStage::Creating, format!("Created {} new applications", created.len()))
            .await;
        Ok(created)
    }
}
