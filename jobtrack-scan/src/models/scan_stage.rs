//! Scan state machine stages and progress reports
//!
//! idle → fetching → filtering → saving → matching → creating → done,
//! with `error` reachable from any in-progress stage.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStage {
    Fetching,
    Filtering,
    Saving,
    Matching,
    Creating,
    Done,
    Error,
}

impl ScanStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStage::Fetching => "fetching",
            ScanStage::Filtering => "filtering",
            ScanStage::Saving => "saving",
            ScanStage::Matching => "matching",
            ScanStage::Creating => "creating",
            ScanStage::Done => "done",
            ScanStage::Error => "error",
        }
    }
}

/// A single progress report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanProgress {
    pub stage: ScanStage,
    pub detail: String,
}

impl ScanProgress {
    pub fn new(stage: ScanStage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            detail: detail.into(),
        }
    }
}

/// Result of a completed scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub inserted: usize,
    pub applications_created: usize,
}
