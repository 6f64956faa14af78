//! Data models for the job tracker scan service

pub mod application;
pub mod message;
pub mod scan_run;
pub mod scan_stage;

pub use application::{
    Application, ApplicationDetail, ApplicationStatus, ApplicationUpdate, NewApplication,
};
pub use message::{MessageReference, RawMessage};
pub use scan_run::{ScanRun, ScanRunStatus};
pub use scan_stage::{ScanProgress, ScanStage, ScanSummary};
