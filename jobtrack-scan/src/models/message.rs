//! Email messages as fetched from the provider and as persisted

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message record returned by a `MessageSource`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Provider message id, stable across fetches
    pub provider_id: String,
    pub subject: Option<String>,
    pub sender: Option<String>,
    pub received_at: DateTime<Utc>,
    pub snippet: Option<String>,
}

/// Persisted message reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageReference {
    pub id: i64,
    pub provider_id: String,
    pub subject: Option<String>,
    pub sender: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
    pub snippet: Option<String>,
    /// `None` while unlinked
    pub application_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl MessageReference {
    pub fn is_linked(&self) -> bool {
        self.application_id.is_some()
    }
}
