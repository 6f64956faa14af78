//! HTTP API handlers for jobtrack-scan
//!
//! Job tracker routes live under `/job-tracker`; `/health` and `/events` sit
//! at the root.

pub mod applications;
pub mod emails;
pub mod health;
pub mod scan;
pub mod sse;

pub use applications::application_routes;
pub use emails::email_routes;
pub use health::health_routes;
pub use scan::scan_routes;
pub use sse::{event_stream, scan_progress_stream};

use serde::{Deserialize, Serialize};

use crate::config::PaginationDefaults;
use crate::error::{ApiError, ApiResult};

/// Largest page a list endpoint returns
pub const MAX_PAGE_LIMIT: i64 = 500;

/// `?limit=&offset=` query parameters
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    /// Apply defaults and validate: `limit` in `1..=500`, `offset >= 0`
    pub fn resolve(&self, defaults: &PaginationDefaults) -> ApiResult<(i64, i64)> {
        let limit = self.limit.unwrap_or(defaults.limit);
        let offset = self.offset.unwrap_or(defaults.offset);

        if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            return Err(ApiError::BadRequest(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_LIMIT
            )));
        }
        if offset < 0 {
            return Err(ApiError::BadRequest("offset must not be negative".to_string()));
        }
        Ok((limit, offset))
    }
}

/// One page of results with the total count
#[derive(Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub total: i64,
    pub items: Vec<T>,
}
