//! Scan admission gate
//!
//! Single-flight cooldown shared by every scan trigger in the process. A
//! request inside the cooldown window is rejected with the remaining wait; it
//! is never queued.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default cooldown between admitted scans
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

pub struct AdmissionGate {
    last_admitted: Mutex<Option<Instant>>,
    cooldown: Duration,
}

impl AdmissionGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            last_admitted: Mutex::new(None),
            cooldown,
        }
    }

    /// Admit a scan, or return the time left until the next admission
    ///
    /// Check and set happen under one lock, so of two concurrent callers at
    /// most one is admitted.
    pub async fn try_admit(&self) -> Result<(), Duration> {
        let mut last = self.last_admitted.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.cooldown {
                let retry_after = self.cooldown - elapsed;
                tracing::debug!(retry_after_ms = retry_after.as_millis() as u64, "Scan admission rejected");
                return Err(retry_after);
            }
        }

        *last = Some(Instant::now());
        Ok(())
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

/// Whole seconds for a `Retry-After` header, never zero
pub fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs();
    if wait.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}
