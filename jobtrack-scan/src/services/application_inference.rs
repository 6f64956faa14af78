//! Application inference
//!
//! Turns an unlinked message into a `(company, role?, status)` guess using the
//! extraction rule table, with the sender's domain as the company fallback.
//! Inference is pure; deduplication against stored applications happens in
//! the orchestrator's creating stage.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use super::extraction_rules::{extract, extract_role, infer_status};
use crate::models::{ApplicationStatus, MessageReference, NewApplication};

/// Longest company or role accepted from a capture
pub const MAX_CAPTURE_LEN: usize = 120;

/// `source` recorded on inferred applications
pub const INFERRED_SOURCE: &str = "Gmail";

static SENDER_DOMAIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@([\w.\-]+)").expect("sender domain pattern must compile"));

/// Domain labels that never name the hiring company
const NON_COMPANY_LABELS: &[&str] = &[
    "mail", "email", "notification", "notifications", "noreply", "no-reply", "careers", "jobs",
    "comeet", "greenhouse", "lever", "workday", "bamboohr", "smartrecruiters", "taleo", "icims",
    "jobvite", "ashbyhq", "ashby", "rippling", "gusto", "myworkday", "successfactors", "oracle",
    "peoplesoft", "ultipro", "adp", "paychex", "zenefits", "breezy", "jazz", "applytojob", "hire",
    "recruiting", "workable", "pinpoint", "recruitee",
];

/// Application guessed from one message
#[derive(Debug, Clone, PartialEq)]
pub struct InferredApplication {
    pub company: String,
    pub role: Option<String>,
    pub status: ApplicationStatus,
    pub source: String,
    pub applied_at: Option<DateTime<Utc>>,
}

impl InferredApplication {
    pub fn to_new_application(&self) -> NewApplication {
        NewApplication {
            company_name: self.company.clone(),
            role_title: self.role.clone(),
            status: self.status,
            source: Some(self.source.clone()),
            applied_at: self.applied_at,
            ..NewApplication::default()
        }
    }
}

/// Company name from the sender address
///
/// `noreply@careers.acme.com` gives `Acme`: the TLD and known ATS or
/// notification labels are dropped and the last remaining label is used.
pub fn sender_company(sender: Option<&str>) -> Option<String> {
    let caps = SENDER_DOMAIN.captures(sender?)?;
    let domain = caps.get(1)?.as_str().to_lowercase();
    let labels: Vec<&str> = domain.split('.').filter(|l| !l.is_empty()).collect();
    let (_, without_tld) = labels.split_last()?;

    let meaningful = without_tld
        .iter()
        .copied()
        .rev()
        .find(|label| !NON_COMPANY_LABELS.contains(label));
    if let Some(label) = meaningful {
        return Some(capitalize(label));
    }

    labels
        .first()
        .copied()
        .filter(|label| !NON_COMPANY_LABELS.contains(label))
        .map(capitalize)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Infer an application from one message
///
/// Subject is tried before snippet. Returns `None` when no rule matches, when
/// no company can be determined, or when a capture exceeds `MAX_CAPTURE_LEN`
/// (logged as a data error; captures are never truncated).
pub fn infer(reference: &MessageReference) -> Option<InferredApplication> {
    let subject = reference.subject.as_deref().unwrap_or("");
    let snippet = reference.snippet.as_deref().unwrap_or("");

    let extraction = [subject, snippet]
        .into_iter()
        .filter(|text| !text.is_empty())
        .find_map(extract)?;

    let Some(company) = extraction
        .company
        .or_else(|| sender_company(reference.sender.as_deref()))
    else {
        tracing::debug!(
            reference_id = reference.id,
            rule = extraction.rule,
            "No company in message or sender, skipping"
        );
        return None;
    };

    if company.chars().count() > MAX_CAPTURE_LEN {
        tracing::warn!(
            reference_id = reference.id,
            len = company.chars().count(),
            "Company name exceeds {} chars, skipping message",
            MAX_CAPTURE_LEN
        );
        return None;
    }
    if let Some(role) = &extraction.role {
        if role.chars().count() > MAX_CAPTURE_LEN {
            tracing::warn!(
                reference_id = reference.id,
                len = role.chars().count(),
                "Role title exceeds {} chars, skipping message",
                MAX_CAPTURE_LEN
            );
            return None;
        }
    }

    Some(InferredApplication {
        company,
        role: extraction.role,
        status: infer_status(&format!("{} {}", subject, snippet)),
        source: INFERRED_SOURCE.to_string(),
        applied_at: reference.received_at,
    })
}

/// Infer every reference and back-fill missing roles from siblings
///
/// A company-only inference borrows the role of another reference in the same
/// batch that resolved to the same company and whose subject yields a role.
/// Input order is preserved; references that infer nothing are left out.
pub fn infer_batch(references: &[MessageReference]) -> Vec<(&MessageReference, InferredApplication)> {
    let mut inferred: Vec<(&MessageReference, InferredApplication)> = references
        .iter()
        .filter_map(|reference| infer(reference).map(|app| (reference, app)))
        .collect();

    let mut siblings: HashMap<String, Vec<(i64, Option<&str>)>> = HashMap::new();
    for &(reference, ref app) in &inferred {
        siblings
            .entry(app.company.to_lowercase())
            .or_default()
            .push((reference.id, reference.subject.as_deref()));
    }

    for (reference, app) in inferred.iter_mut() {
        if app.role.is_some() {
            continue;
        }
        let Some(candidates) = siblings.get(&app.company.to_lowercase()) else {
            continue;
        };

        app.role = candidates
            .iter()
            .filter(|(id, _)| *id != reference.id)
            .filter_map(|(_, subject)| subject.and_then(extract_role))
            .find(|role| role.chars().count() <= MAX_CAPTURE_LEN);

        if let Some(role) = &app.role {
            tracing::debug!(reference_id = reference.id, role = %role, "Role back-filled from sibling message");
        }
    }

    inferred
}
