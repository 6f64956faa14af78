//! Gmail message source
//!
//! Reads an OAuth authorized-user token file, refreshes the access token when
//! it has expired (writing the refreshed token back), then lists message ids
//! for the window and fetches Subject/From/Date headers plus the snippet for
//! each. All calls are blocking and must run on the fetch pool.

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::message_source::{FetchWindow, MessageSource, SourceError};
use crate::models::RawMessage;

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const USER_AGENT: &str = concat!("jobtrack-scan/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Tokens this close to expiry are refreshed first
const EXPIRY_SKEW_SECS: i64 = 60;

/// Social-network noise excluded server-side
const QUERY_EXCLUSIONS: &[&str] = &[
    r#"-subject:"wants to connect""#,
    r#"-subject:"accepted your invitation""#,
    r#"-subject:"joined your network""#,
    r#"-subject:"now following you""#,
    r#"-subject:"You have a new message""#,
    "-from:connected@linkedin.com",
    "-from:invitations@linkedin.com",
];

static TRAILING_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+\([^)]+\)$").expect("comment pattern must compile"));
static TRAILING_GMT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+GMT$").expect("GMT pattern must compile"));
static TRAILING_UT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bUT$").expect("UT pattern must compile"));

/// Authorized-user credentials as written by the OAuth consent flow
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AuthorizedUserToken {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiry: Option<String>,
    /// Fields this client does not use, preserved on rewrite
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl AuthorizedUserToken {
    fn expires_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.expiry.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if self.token.as_deref().map_or(true, str::is_empty) {
            return true;
        }
        match self.expires_at() {
            Some(expires_at) => (expires_at - now).num_seconds() <= EXPIRY_SKEW_SECS,
            None => false,
        }
    }

    fn can_refresh(&self) -> bool {
        [&self.refresh_token, &self.client_id, &self.client_secret]
            .iter()
            .all(|field| field.as_deref().is_some_and(|v| !v.is_empty()))
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageId>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessageDetail {
    #[serde(default)]
    id: String,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    payload: Payload,
}

#[derive(Debug, Default, Deserialize)]
struct Payload {
    #[serde(default)]
    headers: Vec<Header>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    #[serde(default)]
    value: Option<String>,
}

impl MessageDetail {
    fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .and_then(|h| h.value.as_deref())
    }

    fn into_raw(self) -> RawMessage {
        let subject = self.header("Subject").map(str::to_string);
        let sender = self.header("From").map(str::to_string);
        let received_at = parse_message_date(self.header("Date"));
        RawMessage {
            provider_id: self.id,
            subject,
            sender,
            received_at,
            snippet: self.snippet,
        }
    }
}

/// Gmail REST client over a blocking `reqwest` client
pub struct GmailClient {
    token_file: Option<PathBuf>,
    user_id: String,
}

impl GmailClient {
    /// `delegated_user` selects the mailbox; `me` otherwise
    pub fn new(token_file: Option<PathBuf>, delegated_user: Option<String>) -> Self {
        let user_id = delegated_user
            .filter(|user| !user.trim().is_empty())
            .unwrap_or_else(|| "me".to_string());
        Self {
            token_file: token_file.filter(|path| !path.as_os_str().is_empty()),
            user_id,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn token_path(&self) -> Result<&Path, SourceError> {
        let path = self.token_file.as_deref().ok_or_else(|| {
            SourceError::NotConfigured("Gmail token file is not configured".to_string())
        })?;
        if !path.exists() {
            return Err(SourceError::NotConfigured(format!(
                "Gmail token file {} does not exist",
                path.display()
            )));
        }
        Ok(path)
    }

    fn load_token(&self) -> Result<AuthorizedUserToken, SourceError> {
        let path = self.token_path()?;
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SourceError::NotConfigured(format!("Cannot read Gmail token file {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            SourceError::NotConfigured(format!("Invalid Gmail token file {}: {}", path.display(), e))
        })
    }

    fn persist_token(&self, token: &AuthorizedUserToken) {
        let Ok(path) = self.token_path() else {
            return;
        };
        let written = serde_json::to_string_pretty(token)
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(path, json).map_err(|e| e.to_string()));
        match written {
            Ok(()) => tracing::info!(path = %path.display(), "Gmail OAuth token refreshed and saved"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to save refreshed Gmail token"),
        }
    }

    fn refresh(&self, http: &Client, token: &mut AuthorizedUserToken) -> Result<(), SourceError> {
        let token_uri = token.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", token.refresh_token.as_deref().unwrap_or_default()),
            ("client_id", token.client_id.as_deref().unwrap_or_default()),
            ("client_secret", token.client_secret.as_deref().unwrap_or_default()),
        ];

        let refreshed: RefreshResponse = send_json(http.post(token_uri).form(&params))?;

        token.token = Some(refreshed.access_token);
        token.expiry = refreshed.expires_in.map(|secs| {
            (Utc::now() + chrono::Duration::seconds(secs)).to_rfc3339_opts(SecondsFormat::Micros, true)
        });
        self.persist_token(token);
        Ok(())
    }

    fn access_token(&self, http: &Client) -> Result<String, SourceError> {
        let mut token = self.load_token()?;
        if token.is_expired(Utc::now()) {
            if !token.can_refresh() {
                return Err(SourceError::NotConfigured(
                    "Gmail credentials are expired and cannot be refreshed".to_string(),
                ));
            }
            self.refresh(http, &mut token)?;
        }
        token
            .token
            .ok_or_else(|| SourceError::NotConfigured("Gmail token file has no access token".to_string()))
    }

    fn list_message_ids(
        &self,
        http: &Client,
        access_token: &str,
        window: &FetchWindow,
    ) -> Result<Vec<String>, SourceError> {
        let url = format!("{}/users/{}/messages", GMAIL_API_BASE, self.user_id);
        let query = date_query(window.window_days, Utc::now().date_naive());

        let mut ids: Vec<String> = Vec::new();
        let mut page_token: Option<String> = None;
        while ids.len() < window.max_messages {
            let page_size = window.page_size.min(window.max_messages - ids.len()).to_string();
            let mut request = http
                .get(&url)
                .bearer_auth(access_token)
                .query(&[("q", query.as_str()), ("maxResults", page_size.as_str())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: ListResponse = send_json(request)?;
            ids.extend(page.messages.into_iter().map(|m| m.id));

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        ids.truncate(window.max_messages);
        Ok(ids)
    }

    fn get_message(&self, http: &Client, access_token: &str, id: &str) -> Result<RawMessage, SourceError> {
        let url = format!("{}/users/{}/messages/{}", GMAIL_API_BASE, self.user_id, id);
        let request = http.get(&url).bearer_auth(access_token).query(&[
            ("format", "metadata"),
            ("metadataHeaders", "Subject"),
            ("metadataHeaders", "From"),
            ("metadataHeaders", "Date"),
            ("fields", "id,payload/headers,snippet"),
        ]);

        let detail: MessageDetail = send_json(request)?;
        Ok(detail.into_raw())
    }
}

impl MessageSource for GmailClient {
    fn ensure_ready(&self) -> Result<(), SourceError> {
        let token = self.load_token()?;
        if token.is_expired(Utc::now()) && !token.can_refresh() {
            return Err(SourceError::NotConfigured(
                "Gmail credentials are expired and cannot be refreshed".to_string(),
            ));
        }
        Ok(())
    }

    fn fetch_recent(&self, window: &FetchWindow) -> Result<Vec<RawMessage>, SourceError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SourceError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        let access_token = self.access_token(&http)?;
        let ids = self.list_message_ids(&http, &access_token, window)?;
        tracing::debug!(count = ids.len(), user_id = %self.user_id, "Listed Gmail message ids");

        let messages = ids
            .iter()
            .map(|id| self.get_message(&http, &access_token, id))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(count = messages.len(), "Fetched Gmail messages");
        Ok(messages)
    }
}

fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, SourceError> {
    let response = request
        .send()
        .map_err(|e| SourceError::Transport(format!("Gmail request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        let body: String = body.chars().take(200).collect();
        return Err(SourceError::Transport(format!("Gmail API returned {}: {}", status, body)));
    }

    response
        .json::<T>()
        .map_err(|e| SourceError::Transport(format!("Invalid Gmail response: {}", e)))
}

/// Gmail search query for the trailing window, minus social notifications
pub fn date_query(window_days: u32, today: NaiveDate) -> String {
    let after = today
        .checked_sub_days(Days::new(u64::from(window_days)))
        .unwrap_or(today);

    let mut query = format!("after:{}", after.format("%Y-%m-%d"));
    for exclusion in QUERY_EXCLUSIONS {
        query.push(' ');
        query.push_str(exclusion);
    }
    query
}

/// Parse a `Date` header, falling back to the current time
pub fn parse_message_date(raw: Option<&str>) -> DateTime<Utc> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Utc::now();
    };

    let cleaned = TRAILING_COMMENT.replace(raw.trim(), "");
    let cleaned = TRAILING_GMT.replace(&cleaned, " +0000");
    let cleaned = TRAILING_UT.replace(&cleaned, "+0000");

    DateTime::parse_from_rfc2822(&cleaned)
        .or_else(|_| DateTime::parse_from_rfc3339(&cleaned))
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            tracing::warn!(date = %raw, "Could not parse message date, using current time");
            Utc::now()
        })
}
