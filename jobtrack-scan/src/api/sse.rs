//! Server-Sent Events for scan progress and the shared event bus

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::models::{ScanProgress, ScanSummary};
use crate::services::ScanError;
use crate::AppState;

/// Progress reports buffered between the scan and a slow client
const PROGRESS_CHANNEL_CAPACITY: usize = 32;

/// GET /events
///
/// Every `JobTrackerEvent` published on the bus.
pub async fn event_stream(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    jobtrack_common::sse::create_event_bus_sse_stream(state.event_bus.clone(), "jobtrack-scan")
}

/// GET /job-tracker/scan/progress
///
/// Starts a scan and streams `progress` events (`{stage, detail}`), then one
/// final `result` or `error` event. The scan is cancelled when the client
/// disconnects or no progress arrives within the idle timeout.
pub async fn scan_progress_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("SSE client connected to scan progress");

    let (tx, mut rx) = mpsc::channel::<ScanProgress>(PROGRESS_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();
    let idle_timeout = state.progress_idle_timeout;

    let scan_state = state.clone();
    let scan_cancel = cancel.clone();
    let scan = tokio::spawn(async move {
        let result = scan_state.scan_service.run_scan(Some(tx), scan_cancel).await;
        scan_state.record_scan_result(&result).await;
        result
    });

    // Owned by the generator, so dropping the stream cancels the scan even
    // if it was never polled
    let idle_cancel = cancel.clone();
    let cancel_on_drop = cancel.drop_guard();

    let stream = async_stream::stream! {
        let _cancel_on_drop = cancel_on_drop;

        loop {
            match tokio::time::timeout(idle_timeout, rx.recv()).await {
                Ok(Some(progress)) => {
                    debug!(stage = progress.stage.as_str(), "SSE: scan progress");
                    yield Ok(progress_event(&progress));
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(timeout_secs = idle_timeout.as_secs(), "SSE: no scan progress, cancelling scan");
                    idle_cancel.cancel();
                    break;
                }
            }
        }

        let result = match scan.await {
            Ok(result) => result,
            Err(e) => Err(ScanError::Internal(format!("Scan task failed: {}", e))),
        };
        yield Ok(final_event(result));
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}

fn progress_event(progress: &ScanProgress) -> Event {
    Event::default().event("progress").data(
        json!({
            "stage": progress.stage,
            "detail": progress.detail,
        })
        .to_string(),
    )
}

fn final_event(result: Result<ScanSummary, ScanError>) -> Event {
    match result {
        Ok(summary) => Event::default().event("result").data(
            json!({
                "stage": "result",
                "inserted": summary.inserted,
                "applicationsCreated": summary.applications_created,
            })
            .to_string(),
        ),
        Err(err) => {
            let detail = err.to_string();
            let api_error = ApiError::from(err);
            let mut body = json!({
                "stage": "error",
                "code": api_error.code(),
                "detail": detail,
            });
            if let ApiError::RateLimited { retry_after_secs } = api_error {
                body["retryAfter"] = json!(retry_after_secs);
            }
            Event::default().event("error").data(body.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScanStage;

    #[test]
    fn test_final_event_for_rate_limit_carries_retry_after() {
        let event = final_event(Err(ScanError::RateLimited {
            retry_after: Duration::from_secs(30),
        }));
        let rendered = format!("{:?}", event);
        assert!(rendered.contains("retryAfter"));
        assert!(rendered.contains("RATE_LIMITED"));
    }

    #[test]
    fn test_progress_event_payload() {
        let event = progress_event(&ScanProgress::new(ScanStage::Saving, "Saving 2 emails…"));
        let rendered = format!("{:?}", event);
        assert!(rendered.contains("saving"));
    }
}
