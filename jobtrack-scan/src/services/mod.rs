//! Scan pipeline and application management services
//!
//! Pure scan logic (relevance filter, matcher, extraction rules, inference)
//! sits beside the stateful pieces that drive it: the admission gate, the
//! fetch pool, message sources and the orchestrator.

pub mod admission;
pub mod application_inference;
pub mod application_matcher;
pub mod application_service;
pub mod extraction_rules;
pub mod fetch_pool;
pub mod gmail_client;
pub mod message_source;
pub mod relevance_filter;
pub mod scan_orchestrator;
pub mod scan_service;

pub use admission::AdmissionGate;
pub use application_inference::{infer, infer_batch, InferredApplication};
pub use application_matcher::{match_application, MATCH_THRESHOLD};
pub use application_service::ApplicationService;
pub use fetch_pool::{FetchPool, PoolError};
pub use gmail_client::GmailClient;
pub use message_source::{FetchWindow, MessageSource, SourceError};
pub use relevance_filter::is_job_related;
pub use scan_orchestrator::{ProgressSender, ScanOrchestrator};
pub use scan_service::{ScanError, ScanService, ScanSettings};
