//! End-to-end scan workflow tests
//!
//! Drive `ScanService::run_scan` against a scripted message source and an
//! in-memory database.

mod helpers;

use helpers::{create_test_pool, message, test_state, FakeSource};
use jobtrack_common::events::JobTrackerEvent;
use jobtrack_scan::db::applications::list_all_applications;
use jobtrack_scan::db::references::list_references;
use jobtrack_scan::db::scan_runs::list_recent;
use jobtrack_scan::models::{Application, ApplicationStatus, NewApplication, ScanRunStatus, ScanStage};
use jobtrack_scan::services::{ScanError, SourceError};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

async fn all_applications(pool: &SqlitePool) -> Vec<Application> {
    let mut conn = pool.acquire().await.unwrap();
    list_all_applications(&mut conn).await.unwrap()
}

#[tokio::test]
async fn test_scan_creates_application_and_skips_noise() {
    let pool = create_test_pool().await;
    let source = FakeSource::new().push(Ok(vec![
        message("m-0", "Jane Doe wants to connect with you", "LinkedIn <invitations@linkedin.com>", 5),
        message("m-1", "Your application to Backend Engineer at Acme Corp", "jobs@acme.com", 3),
        message("m-1", "Your application to Backend Engineer at Acme Corp", "jobs@acme.com", 3),
        message("m-2", "Weekly digest", "news@example.com", 1),
    ]));
    let state = test_state(pool.clone(), Arc::new(source), Duration::ZERO);

    let summary = state
        .scan_service
        .run_scan(None, CancellationToken::new())
        .await
        .expect("scan should succeed");

    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.applications_created, 1);

    let apps = all_applications(&pool).await;
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0].company_name, "Acme Corp");
    assert_eq!(apps[0].role_title.as_deref(), Some("Backend Engineer"));
    assert_eq!(apps[0].status, ApplicationStatus::Applied);
    assert_eq!(apps[0].source.as_deref(), Some("Gmail"));

    let (references, total) = list_references(&pool, 50, 0).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(references[0].provider_id, "m-1");
    assert_eq!(references[0].application_id, Some(apps[0].id));

    let runs = list_recent(&pool, 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, ScanRunStatus::Completed);
    assert_eq!(runs[0].emails_fetched, Some(4));
    assert_eq!(runs[0].emails_inserted, Some(1));
    assert_eq!(runs[0].apps_created, Some(1));
    assert!(runs[0].completed_at.is_some());
    assert!(runs[0].error.is_none());
}

#[tokio::test]
async fn test_same_company_in_one_scan_creates_one_application() {
    let pool = create_test_pool().await;
    let source = FakeSource::new().push(Ok(vec![
        message("m-1", "Your application to Backend Engineer at Acme Corp", "jobs@acme.com", 48),
        message("m-2", "Interview invitation - Acme Corp", "recruiting@acme.com", 2),
    ]));
    let state = test_state(pool.clone(), Arc::new(source), Duration::ZERO);

    let summary = state
        .scan_service
        .run_scan(None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.inserted, 2);
    assert_eq!(summary.applications_created, 1);

    let apps = all_applications(&pool).await;
    assert_eq!(apps.len(), 1);

    let detail = state.applications.get(apps[0].id).await.unwrap();
    assert_eq!(detail.emails.len(), 2);
    // Newest first
    assert_eq!(detail.emails[0].provider_id, "m-2");
}

#[tokio::test]
async fn test_existing_application_is_linked_not_duplicated() {
    let pool = create_test_pool().await;
    let source = FakeSource::new().push(Ok(vec![message(
        "m-1",
        "Your application to Backend Engineer at Acme Corp",
        "jobs@acme.com",
        1,
    )]));
    let state = test_state(pool.clone(), Arc::new(source), Duration::ZERO);

    let existing = state
        .applications
        .create(&NewApplication {
            company_name: "Acme Corp".to_string(),
            role_title: Some("Backend Engineer".to_string()),
            ..NewApplication::default()
        })
        .await
        .unwrap();
    assert!(existing.last_email_at.is_none());

    let summary = state
        .scan_service
        .run_scan(None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.applications_created, 0);

    let detail = state.applications.get(existing.id).await.unwrap();
    assert_eq!(detail.emails.len(), 1);
    assert_eq!(detail.application.last_email_at, detail.emails[0].received_at);
}

#[tokio::test]
async fn test_rescan_of_same_messages_is_idempotent() {
    let batch = vec![
        message("m-1", "Your application to Backend Engineer at Acme Corp", "jobs@acme.com", 3),
        message("m-2", "Thank you for applying to Globex", "talent@globex.com", 2),
    ];
    let pool = create_test_pool().await;
    let source = FakeSource::new().push(Ok(batch.clone())).push(Ok(batch));
    let state = test_state(pool.clone(), Arc::new(source), Duration::ZERO);

    let first = state
        .scan_service
        .run_scan(None, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.inserted, 2);
    assert_eq!(first.applications_created, 2);

    let second = state
        .scan_service
        .run_scan(None, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.applications_created, 0);

    assert_eq!(all_applications(&pool).await.len(), 2);
    assert_eq!(list_recent(&pool, 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_progress_stages_in_order() {
    let pool = create_test_pool().await;
    let source = FakeSource::new().push(Ok(vec![message(
        "m-1",
        "Your application to Backend Engineer at Acme Corp",
        "jobs@acme.com",
        1,
    )]));
    let state = test_state(pool, Arc::new(source), Duration::ZERO);

    let (tx, mut rx) = mpsc::channel(8);
    let service = Arc::clone(&state.scan_service);
    let scan = tokio::spawn(async move { service.run_scan(Some(tx), CancellationToken::new()).await });

    let mut updates = Vec::new();
    while let Some(progress) = rx.recv().await {
        updates.push(progress);
    }
    scan.await.unwrap().unwrap();

    let mut stages: Vec<ScanStage> = updates.iter().map(|p| p.stage).collect();
    stages.dedup();
    assert_eq!(
        stages,
        vec![
            ScanStage::Fetching,
            ScanStage::Filtering,
            ScanStage::Saving,
            ScanStage::Matching,
            ScanStage::Creating,
            ScanStage::Done,
        ]
    );
    assert_eq!(updates[0].detail, "Connecting to mailbox…");
    assert_eq!(updates[1].detail, "Fetched 1 emails");
    assert_eq!(
        updates.last().unwrap().detail,
        "Scan complete: 1 emails, 1 applications"
    );
}

#[tokio::test]
async fn test_scan_events_published_on_bus() {
    let pool = create_test_pool().await;
    let source = FakeSource::new().push(Ok(vec![message(
        "m-1",
        "Thank you for applying to Globex",
        "talent@globex.com",
        1,
    )]));
    let state = test_state(pool, Arc::new(source), Duration::ZERO);
    let mut rx = state.event_bus.subscribe();

    state
        .scan_service
        .run_scan(None, CancellationToken::new())
        .await
        .unwrap();

    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let JobTrackerEvent::ApplicationCreated { company_name, .. } = &event {
            assert_eq!(company_name, "Globex");
        }
        names.push(event.event_type().to_string());
    }

    assert_eq!(names.first().map(String::as_str), Some("ScanStarted"));
    assert_eq!(names.last().map(String::as_str), Some("ScanCompleted"));
    assert!(names.iter().any(|n| n == "ApplicationCreated"));
    assert!(names.iter().any(|n| n == "ScanProgress"));
}

#[tokio::test]
async fn test_provider_failure_marks_scan_run_failed() {
    let pool = create_test_pool().await;
    let source = FakeSource::new().push(Err(SourceError::Transport("connection reset".to_string())));
    let state = test_state(pool.clone(), Arc::new(source), Duration::ZERO);

    let err = state
        .scan_service
        .run_scan(None, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::Provider(_)));

    let runs = list_recent(&pool, 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, ScanRunStatus::Failed);
    assert!(runs[0].error.as_deref().unwrap().contains("connection reset"));
    assert!(runs[0].emails_fetched.is_none());
    assert!(runs[0].completed_at.is_some());
}

#[tokio::test]
async fn test_missing_configuration_creates_no_scan_run() {
    let pool = create_test_pool().await;
    let source = Arc::new(FakeSource::not_configured("token file not found"));
    let state = test_state(pool.clone(), source.clone(), Duration::ZERO);

    let err = state
        .scan_service
        .run_scan(None, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ScanError::Configuration(_)));
    assert_eq!(source.fetch_calls(), 0);
    assert!(list_recent(&pool, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_second_scan_inside_cooldown_is_rate_limited() {
    let pool = create_test_pool().await;
    let source = Arc::new(FakeSource::new());
    let state = test_state(pool.clone(), source.clone(), Duration::from_secs(60));

    state
        .scan_service
        .run_scan(None, CancellationToken::new())
        .await
        .unwrap();

    let err = state
        .scan_service
        .run_scan(None, CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        ScanError::RateLimited { retry_after } => {
            assert!(retry_after > Duration::ZERO);
            assert!(retry_after <= Duration::from_secs(60));
        }
        other => panic!("expected RateLimited, got {:?}", other),
    }

    assert_eq!(source.fetch_calls(), 1);
    assert_eq!(list_recent(&pool, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancelled_during_fetch() {
    let pool = create_test_pool().await;
    let source = FakeSource::new()
        .with_delay(Duration::from_millis(300))
        .push(Ok(vec![message(
            "m-1",
            "Your application to Backend Engineer at Acme Corp",
            "jobs@acme.com",
            1,
        )]));
    let state = test_state(pool.clone(), Arc::new(source), Duration::ZERO);

    let cancel = CancellationToken::new();
    let service = Arc::clone(&state.scan_service);
    let scan_cancel = cancel.clone();
    let scan = tokio::spawn(async move { service.run_scan(None, scan_cancel).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let err = scan.await.unwrap().unwrap_err();
    assert!(matches!(err, ScanError::Cancelled));

    let runs = list_recent(&pool, 10).await.unwrap();
    assert_eq!(runs[0].status, ScanRunStatus::Failed);
    assert_eq!(runs[0].error.as_deref(), Some("Scan cancelled"));

    let (_, total) = list_references(&pool, 50, 0).await.unwrap();
    assert_eq!(total, 0);
}

#[tokio::test]
async fn test_overlong_company_saves_reference_without_application() {
    let pool = create_test_pool().await;
    let subject = format!("Thank you for applying to {}", "Acme ".repeat(30).trim());
    let source = FakeSource::new().push(Ok(vec![message("m-1", &subject, "jobs@acme.com", 1)]));
    let state = test_state(pool.clone(), Arc::new(source), Duration::ZERO);

    let summary = state
        .scan_service
        .run_scan(None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.applications_created, 0);
    assert!(all_applications(&pool).await.is_empty());

    let (references, total) = list_references(&pool, 50, 0).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(references[0].provider_id, "m-1");
    assert!(references[0].application_id.is_none());
}
