//! Scan audit records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Maximum stored length of a scan failure message
pub const MAX_SCAN_ERROR_LEN: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanRunStatus {
    Running,
    Completed,
    Failed,
}

impl ScanRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanRunStatus::Running => "running",
            ScanRunStatus::Completed => "completed",
            ScanRunStatus::Failed => "failed",
        }
    }
}

impl FromStr for ScanRunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ScanRunStatus::Running),
            "completed" => Ok(ScanRunStatus::Completed),
            "failed" => Ok(ScanRunStatus::Failed),
            other => Err(format!("Unknown scan run status: {}", other)),
        }
    }
}

/// One row of the scan audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRun {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: ScanRunStatus,
    pub emails_fetched: Option<i64>,
    pub emails_inserted: Option<i64>,
    pub apps_created: Option<i64>,
    pub error: Option<String>,
}

/// Truncate a failure message to at most `MAX_SCAN_ERROR_LEN` characters
pub fn bounded_error(message: &str) -> String {
    message.chars().take(MAX_SCAN_ERROR_LEN).collect()
}
