//! Event types for the job tracker event system
//!
//! Provides the shared event definitions and the broadcast `EventBus` used to
//! fan scan activity out to any number of SSE subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Job tracker event types
///
/// Events are broadcast via `EventBus` and serialized for SSE transmission.
/// Delivery is lossy: a slow subscriber that falls behind the channel capacity
/// misses events rather than stalling the scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JobTrackerEvent {
    /// A scan passed admission and is about to fetch
    ScanStarted {
        /// Audit row id, `None` when the audit row could not be created
        scan_run_id: Option<i64>,
        timestamp: DateTime<Utc>,
    },

    /// A scan stage reported progress
    ///
    /// The same stage may be reported several times with different details.
    ScanProgress {
        scan_run_id: Option<i64>,
        /// Stage name (`fetching`, `filtering`, `saving`, `matching`, `creating`, `done`, `error`)
        stage: String,
        /// Human-readable detail line
        detail: String,
        timestamp: DateTime<Utc>,
    },

    /// A scan reached its `done` state
    ScanCompleted {
        scan_run_id: Option<i64>,
        emails_fetched: usize,
        emails_inserted: usize,
        applications_created: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A scan reached its `error` state
    ScanFailed {
        scan_run_id: Option<i64>,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// The inference engine created a new application
    ApplicationCreated {
        application_id: i64,
        company_name: String,
        role_title: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl JobTrackerEvent {
    /// SSE event name for this event
    pub fn event_type(&self) -> &str {
        match self {
            JobTrackerEvent::ScanStarted { .. } => "ScanStarted",
            JobTrackerEvent::ScanProgress { .. } => "ScanProgress",
            JobTrackerEvent::ScanCompleted { .. } => "ScanCompleted",
            JobTrackerEvent::ScanFailed { .. } => "ScanFailed",
            JobTrackerEvent::ApplicationCreated { .. } => "ApplicationCreated",
        }
    }
}

/// Broadcast bus for `JobTrackerEvent`
///
/// Cloning the bus is cheap and every clone publishes to the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<JobTrackerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events buffered per subscriber before the oldest are dropped
    ///
    /// # Examples
    ///
    /// ```
    /// use jobtrack_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<JobTrackerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: JobTrackerEvent,
    ) -> Result<usize, broadcast::error::SendError<JobTrackerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: JobTrackerEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Channel capacity this bus was created with
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
