//! Job application records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::MessageReference;

/// Pipeline status of an application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    New,
    #[default]
    Applied,
    Interviewing,
    Offer,
    Rejected,
    Hired,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 6] = [
        ApplicationStatus::New,
        ApplicationStatus::Applied,
        ApplicationStatus::Interviewing,
        ApplicationStatus::Offer,
        ApplicationStatus::Rejected,
        ApplicationStatus::Hired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::New => "new",
            ApplicationStatus::Applied => "applied",
            ApplicationStatus::Interviewing => "interviewing",
            ApplicationStatus::Offer => "offer",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Hired => "hired",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ApplicationStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Unknown application status: {}", s))
    }
}

/// Persisted application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub company_name: String,
    /// `None` when no role was ever known
    pub role_title: Option<String>,
    pub status: ApplicationStatus,
    pub source: Option<String>,
    pub applied_at: Option<DateTime<Utc>>,
    /// Latest `received_at` over linked emails
    pub last_email_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub job_url: Option<String>,
    pub next_action_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    /// Case-insensitive dedup key: `(lower(company), lower(role) or "")`
    pub fn dedup_key(&self) -> (String, String) {
        dedup_key(&self.company_name, self.role_title.as_deref())
    }
}

/// Dedup key for a company/role pair
///
/// An absent role and an empty role produce the same key.
pub fn dedup_key(company: &str, role: Option<&str>) -> (String, String) {
    (
        company.trim().to_lowercase(),
        role.map(|r| r.trim().to_lowercase()).unwrap_or_default(),
    )
}

/// Fields for a new application
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewApplication {
    pub company_name: String,
    #[serde(default)]
    pub role_title: Option<String>,
    #[serde(default)]
    pub status: ApplicationStatus,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub applied_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_email_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub job_url: Option<String>,
    #[serde(default)]
    pub next_action_at: Option<DateTime<Utc>>,
}

/// Partial update; absent fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationUpdate {
    pub company_name: Option<String>,
    pub role_title: Option<String>,
    pub status: Option<ApplicationStatus>,
    pub source: Option<String>,
    pub applied_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub job_url: Option<String>,
    pub next_action_at: Option<DateTime<Utc>>,
}

impl ApplicationUpdate {
    pub fn is_empty(&self) -> bool {
        self.company_name.is_none()
            && self.role_title.is_none()
            && self.status.is_none()
            && self.source.is_none()
            && self.applied_at.is_none()
            && self.notes.is_none()
            && self.job_url.is_none()
            && self.next_action_at.is_none()
    }
}

/// Application together with its linked emails, newest first
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationDetail {
    #[serde(flatten)]
    pub application: Application,
    pub emails: Vec<MessageReference>,
}
