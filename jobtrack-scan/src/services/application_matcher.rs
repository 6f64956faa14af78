//! Application matcher
//!
//! Scores a message against known applications using the company and role
//! names found in its subject and sender. Pure and deterministic: it never
//! touches storage and always returns the same answer for the same inputs.

use std::collections::HashSet;

use crate::models::{Application, MessageReference};

/// Minimum score for a match
pub const MATCH_THRESHOLD: u32 = 5;

const COMPANY_SUBSTRING_SCORE: u32 = 10;
const ROLE_SUBSTRING_SCORE: u32 = 8;
const COMPANY_KEYWORD_SCORE: u32 = 3;
const ROLE_KEYWORD_SCORE: u32 = 2;

/// Filler words ignored when comparing keywords
const FILLER_WORDS: &[&str] = &[
    "re", "fw", "fwd", "your", "application", "for", "at", "to", "the", "a", "an", "and", "or",
    "of", "in", "on", "is", "was", "has", "thank", "you", "update", "status", "interview",
    "position", "role", "opportunity", "offer", "letter", "regarding", "following", "up",
];

/// Lowercased alphanumeric tokens longer than two chars that are not filler
pub fn extract_keywords(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| word.len() > 2 && !FILLER_WORDS.contains(word))
        .map(str::to_string)
        .collect()
}

/// Lowercased `subject + " " + sender`
fn haystack(reference: &MessageReference) -> String {
    format!(
        "{} {}",
        reference.subject.as_deref().unwrap_or(""),
        reference.sender.as_deref().unwrap_or("")
    )
    .to_lowercase()
}

/// Score one candidate against a prepared haystack
pub fn score_candidate(haystack: &str, haystack_keywords: &HashSet<String>, app: &Application) -> u32 {
    let company = app.company_name.to_lowercase();
    let role = app.role_title.as_deref().unwrap_or("").to_lowercase();

    let mut score = 0;
    if haystack.contains(&company) {
        score += COMPANY_SUBSTRING_SCORE;
    }
    if !role.is_empty() && haystack.contains(&role) {
        score += ROLE_SUBSTRING_SCORE;
    }

    let company_overlap = extract_keywords(&company).intersection(haystack_keywords).count() as u32;
    score += company_overlap * COMPANY_KEYWORD_SCORE;

    if !role.is_empty() {
        let role_overlap = extract_keywords(&role).intersection(haystack_keywords).count() as u32;
        score += role_overlap * ROLE_KEYWORD_SCORE;
    }

    score
}

/// Best-scoring candidate at or above `MATCH_THRESHOLD`
///
/// A later candidate replaces the current best only with a strictly higher
/// score, so ties keep the earlier candidate.
pub fn match_application<'a>(
    reference: &MessageReference,
    candidates: &'a [Application],
) -> Option<&'a Application> {
    if candidates.is_empty() {
        return None;
    }

    let haystack = haystack(reference);
    let haystack_keywords = extract_keywords(&haystack);

    let mut best: Option<&Application> = None;
    let mut best_score = 0;
    for app in candidates {
        let score = score_candidate(&haystack, &haystack_keywords, app);
        if score > best_score {
            best_score = score;
            best = Some(app);
        }
    }

    best.filter(|_| best_score >= MATCH_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApplicationStatus;
    use chrono::Utc;

    fn app(id: i64, company: &str, role: Option<&str>) -> Application {
        Application {
            id,
            company_name: company.to_string(),
            role_title: role.map(str::to_string),
            status: ApplicationStatus::Applied,
            source: None,
            applied_at: None,
            last_email_at: None,
            notes: None,
            job_url: None,
            next_action_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn reference(subject: &str, sender: &str) -> MessageReference {
        MessageReference {
            id: 1,
            provider_id: "m-1".to_string(),
            subject: Some(subject.to_string()),
            sender: Some(sender.to_string()),
            received_at: None,
            snippet: None,
            application_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_exact_company_substring_wins() {
        let candidates = vec![
            app(1, "Globex", Some("Analyst")),
            app(2, "Acme Corp", Some("Backend Engineer")),
        ];
        let msg = reference("Interview with Acme Corp", "talent@acme.com");

        let matched = match_application(&msg, &candidates).unwrap();
        assert_eq!(matched.id, 2);
    }

    #[test]
    fn test_low_score_is_no_match() {
        // One shared company keyword only: 3 points
        let candidates = vec![app(1, "Acme Widgets", None)];
        let msg = reference("Widgets catalogue", "news@example.com");

        assert!(match_application(&msg, &candidates).is_none());
    }

    #[test]
    fn test_empty_candidates() {
        let msg = reference("Interview with Acme", "jobs@acme.com");
        assert!(match_application(&msg, &[]).is_none());
    }

    #[test]
    fn test_tie_keeps_first_candidate() {
        let candidates = vec![app(1, "Acme", None), app(2, "Acme", None)];
        let msg = reference("Update from Acme", "jobs@example.com");

        assert_eq!(match_application(&msg, &candidates).unwrap().id, 1);
    }

    #[test]
    fn test_role_substring_adds_confidence() {
        let candidates = vec![
            app(1, "Acme", Some("Designer")),
            app(2, "Acme", Some("Data Scientist")),
        ];
        let msg = reference("Acme: Data Scientist next steps", "hr@acme.io");

        assert_eq!(match_application(&msg, &candidates).unwrap().id, 2);
    }

    #[test]
    fn test_keywords_skip_filler_and_short_words() {
        let keywords = extract_keywords("Re: Your application for the Senior Rust role at Acme");
        let mut sorted: Vec<&str> = keywords.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        assert_eq!(sorted, vec!["acme", "rust", "senior"]);
    }
}
