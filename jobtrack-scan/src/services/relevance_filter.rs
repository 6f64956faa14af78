//! Relevance filter
//!
//! Keyword allow-list minus a deny-list of social-network notification phrases.
//! Matching is plain case-insensitive substring search over subject and snippet.

/// Phrases that mark a message as job-related
pub const JOB_KEYWORDS: &[&str] = &[
    "interview",
    "application",
    "thank you for applying",
    "applied",
    "recruiter",
    "recruiting",
    "hr",
    "human resources",
    "job offer",
    "offer letter",
    "unfortunately",
    "regret to inform",
    "pleased to inform",
    "moving forward",
    "next steps",
    "hiring",
    "position",
    "candidate",
    "background check",
    "onboarding",
    "start date",
];

/// Phrases that disqualify a message regardless of keywords
pub const EXCLUDE_PHRASES: &[&str] = &[
    "wants to connect",
    "accepted your invitation",
    "joined your network",
    "now following you",
    "invitation to connect",
    "connect with",
    "people you may know",
    "grow your network",
    "new connection",
];

/// True when the message looks like part of a job application thread
///
/// Both fields absent yields `false`.
pub fn is_job_related(subject: Option<&str>, snippet: Option<&str>) -> bool {
    let text = match (subject, snippet) {
        (None, None) => return false,
        (Some(s), None) | (None, Some(s)) => s.to_lowercase(),
        (Some(subject), Some(snippet)) => format!("{} {}", subject, snippet).to_lowercase(),
    };

    if EXCLUDE_PHRASES.iter().any(|phrase| text.contains(phrase)) {
        return false;
    }

    JOB_KEYWORDS.iter().any(|keyword| text.contains(keyword))
}
