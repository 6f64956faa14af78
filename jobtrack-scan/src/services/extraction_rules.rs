//! Extraction rules
//!
//! Ordered table of case-insensitive patterns that pull a company and/or role
//! out of a subject or snippet line. Precedence is table order: the first rule
//! that matches a text wins.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::ApplicationStatus;

/// Company capture (lazy, stops at the line end or a `| , !` separator)
const COMPANY: &str = r"[A-Za-z0-9][A-Za-z0-9\s&.,'\-]+?";
/// Role character class (also allows `/`)
const ROLE_CHARS: &str = r"[A-Za-z0-9][A-Za-z0-9\s&.,'\-/]";
/// End of a capture
const END: &str = r"(?:\s*[|,!]|$)";

/// One entry of the rule table
pub struct ExtractionRule {
    pub name: &'static str,
    pub regex: Regex,
}

fn rule(name: &'static str, pattern: String) -> ExtractionRule {
    ExtractionRule {
        name,
        regex: Regex::new(&format!("(?i){}", pattern)).expect("extraction rule must compile"),
    }
}

/// The rule table, highest precedence first
pub static EXTRACTION_RULES: Lazy<Vec<ExtractionRule>> = Lazy::new(|| {
    vec![
        rule(
            "application_to_role_at_company",
            format!(r"(?:your\s+)?application\s+(?:to|for)\s+(?P<role>.+?)\s+at\s+(?P<company>{COMPANY}){END}"),
        ),
        rule(
            "thanks_for_applying_role_at_company",
            format!(
                r"(?:thank(?:s|\s+you)\s+for\s+apply(?:ing)?(?:\s+for)?)\s+(?:the\s+)?(?P<role>.+?)\s+(?:position\s+)?at\s+(?P<company>{COMPANY}){END}"
            ),
        ),
        rule(
            "thank_you_for_applying_to_company",
            format!(r"thank(?:s|\s+you)\s+for\s+applying\s+to\s+(?P<company>{COMPANY}){END}"),
        ),
        rule(
            "thanks_for_applying_to_company",
            format!(r"thanks?\s+for\s+applying\s+to\s+(?P<company>{COMPANY}){END}"),
        ),
        rule(
            "application_sent_to_company",
            format!(r"application\s+was\s+sent\s+to\s+(?P<company>{COMPANY})(?:\s*\([^)]*\))?{END}"),
        ),
        rule(
            "application_viewed_by_company",
            format!(r"application\s+was\s+viewed\s+by\s+(?P<company>{COMPANY}){END}"),
        ),
        rule(
            "application_update_from_company",
            format!(r"application\s+update\s+from\s+(?P<company>{COMPANY}){END}"),
        ),
        rule(
            "application_to_company",
            format!(r"(?:re:\s*)?(?:your\s+)?application\s+to\s+(?P<company>{COMPANY}){END}"),
        ),
        rule(
            "company_thank_you_for_your_application_role",
            format!(
                r"^(?P<company>[A-Za-z0-9][A-Za-z0-9\s&.,'\-]{{1,50}}?)\s*[\-–—]\s*thank\s+you\s+for\s+your\s+application\s*[\-–—]\s*(?P<role>{ROLE_CHARS}+?){END}"
            ),
        ),
        rule(
            "thanks_for_applying_for_role",
            format!(r"(?:we\s+got\s+it[:\s]+)?thanks?\s+for\s+applying\s+for\s+(?P<role>{ROLE_CHARS}+?){END}"),
        ),
        rule(
            "role_opportunity_at_company",
            format!(r"(?P<role>{ROLE_CHARS}{{2,60}}?)\s+opportunity\s+at\s+(?P<company>{COMPANY}){END}"),
        ),
        rule(
            "application_dash_role",
            format!(r"(?:your\s+)?application\s*[\-–—]\s*(?P<role>{ROLE_CHARS}{{3,80}}?)(?:\s*[\-–—]|$)"),
        ),
        rule(
            "interest_in_joining_company",
            format!(r"interest\s+in\s+joining\s+(?:us\s+)?at\s+(?P<company>{COMPANY}){END}"),
        ),
        rule(
            "application_for_role",
            format!(r"(?:your\s+)?application\s+for\s+(?P<role>{ROLE_CHARS}+?)(?:\s+has\s+been|\s+was|\s*[|,!]|$)"),
        ),
        rule(
            "received_application_at_company",
            format!(
                r"(?:we\s+)?received\s+your\s+application\s+(?:for\s+(?P<role>.+?)\s+)?at\s+(?P<company>{COMPANY}){END}"
            ),
        ),
        rule(
            "next_steps_at_company",
            format!(
                r"next\s+steps?\s+(?:for\s+your\s+(?:application|candidacy)\s+)?at\s+(?P<company>{COMPANY}){END}"
            ),
        ),
        rule(
            "interview_invitation_company",
            format!(r"interview\s+invitation[\s\-–—]+(?P<company>{COMPANY}){END}"),
        ),
        rule(
            "company_dash_interview",
            r"^(?P<company>[A-Za-z0-9][A-Za-z0-9\s&.,'\-]+?)\s*[\-–—]+\s*(?:interview|phone\s+screen|technical\s+screen)".to_string(),
        ),
        rule(
            "company_role_dash_application",
            format!(
                r"^(?P<company>[A-Za-z0-9][A-Za-z0-9\s&.,'\-]{{2,40}})\s*[\-–—:]\s*(?P<role>{ROLE_CHARS}{{2,80}})\s*[\-–—]\s*application"
            ),
        ),
    ]
});

/// Status hints, checked in order against subject + snippet
static STATUS_HINTS: Lazy<Vec<(Regex, ApplicationStatus)>> = Lazy::new(|| {
    [
        (r"\b(offer|congratulations|pleased to inform|job offer)\b", ApplicationStatus::Offer),
        (r"\b(interview|assessment|screening|schedule)\b", ApplicationStatus::Interviewing),
        (
            r"\b(unfortunately|regret|not moving forward|not selected|declined)\b",
            ApplicationStatus::Rejected,
        ),
    ]
    .into_iter()
    .map(|(pattern, status)| {
        let regex = Regex::new(&format!("(?i){}", pattern)).expect("status hint must compile");
        (regex, status)
    })
    .collect()
});

/// Captures from the first matching rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub rule: &'static str,
    /// Cleaned company capture, `None` if the rule has none or it cleaned to ""
    pub company: Option<String>,
    pub role: Option<String>,
}

/// Trim and strip trailing `.`, `,` and `!`
pub fn clean_capture(raw: &str) -> String {
    raw.trim().trim_end_matches(['.', ',', '!']).to_string()
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

/// Run the rule table over `text`; the first matching rule wins
pub fn extract(text: &str) -> Option<Extraction> {
    EXTRACTION_RULES.iter().find_map(|rule| {
        let caps = rule.regex.captures(text)?;
        Some(Extraction {
            rule: rule.name,
            company: caps.name("company").map(|m| clean_capture(m.as_str())).and_then(non_empty),
            role: caps.name("role").map(|m| clean_capture(m.as_str())).and_then(non_empty),
        })
    })
}

/// First non-empty role any rule yields for `text`
///
/// Unlike `extract`, a matching rule without a role does not stop the search.
pub fn extract_role(text: &str) -> Option<String> {
    EXTRACTION_RULES.iter().find_map(|rule| {
        let caps = rule.regex.captures(text)?;
        caps.name("role").map(|m| clean_capture(m.as_str())).and_then(non_empty)
    })
}

/// Status implied by the text; the first hint found wins, default `applied`
pub fn infer_status(text: &str) -> ApplicationStatus {
    STATUS_HINTS
        .iter()
        .find(|(regex, _)| regex.is_match(text))
        .map(|(_, status)| *status)
        .unwrap_or(ApplicationStatus::Applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Canonical example per rule, in table order, with expected (company, role)
    const CANONICAL: &[(&str, &str, Option<&str>, Option<&str>)] = &[
        (
            "application_to_role_at_company",
            "Your application to Backend Engineer at Acme Corp",
            Some("Acme Corp"),
            Some("Backend Engineer"),
        ),
        (
            "thanks_for_applying_role_at_company",
            "Thank you for applying for the Data Analyst position at Globex",
            Some("Globex"),
            Some("Data Analyst"),
        ),
        (
            "thank_you_for_applying_to_company",
            "Thank you for applying to Initech",
            Some("Initech"),
            None,
        ),
        ("thanks_for_applying_to_company", "Thank for applying to Hooli!", Some("Hooli"), None),
        (
            "application_sent_to_company",
            "Your application was sent to Umbrella (via LinkedIn)",
            Some("Umbrella"),
            None,
        ),
        (
            "application_viewed_by_company",
            "Your application was viewed by Vandelay Industries",
            Some("Vandelay Industries"),
            None,
        ),
        (
            "application_update_from_company",
            "Application update from Stark Industries",
            Some("Stark Industries"),
            None,
        ),
        (
            "application_to_company",
            "Re: Your application to Wayne Enterprises",
            Some("Wayne Enterprises"),
            None,
        ),
        (
            "company_thank_you_for_your_application_role",
            "Cyberdyne - Thank you for your application - Robotics Engineer",
            Some("Cyberdyne"),
            Some("Robotics Engineer"),
        ),
        (
            "thanks_for_applying_for_role",
            "We got it: Thanks for applying for Product Manager",
            None,
            Some("Product Manager"),
        ),
        (
            "role_opportunity_at_company",
            "Senior Designer opportunity at Soylent",
            Some("Soylent"),
            Some("Senior Designer"),
        ),
        (
            "application_dash_role",
            "Your application - Site Reliability Engineer",
            None,
            Some("Site Reliability Engineer"),
        ),
        (
            "interest_in_joining_company",
            "Thanks for your interest in joining us at Massive Dynamic",
            Some("Massive Dynamic"),
            None,
        ),
        (
            "application_for_role",
            "Your application for Staff Engineer has been received",
            None,
            Some("Staff Engineer"),
        ),
        (
            "received_application_at_company",
            "We received your application at Oscorp",
            Some("Oscorp"),
            None,
        ),
        (
            "next_steps_at_company",
            "Next steps for your candidacy at Tyrell Corp",
            Some("Tyrell Corp"),
            None,
        ),
        (
            "interview_invitation_company",
            "Interview invitation - Aperture Science",
            Some("Aperture Science"),
            None,
        ),
        ("company_dash_interview", "Black Mesa - Phone Screen", Some("Black Mesa"), None),
        (
            "company_role_dash_application",
            "Hooli: Software Engineer - Application",
            Some("Hooli"),
            Some("Software Engineer"),
        ),
    ];

    fn rule_index(name: &str) -> usize {
        EXTRACTION_RULES
            .iter()
            .position(|r| r.name == name)
            .unwrap_or_else(|| panic!("no rule named {}", name))
    }

    fn assert_canonical(name: &str) {
        let index = rule_index(name);
        let (expected_name, text, company, role) = CANONICAL[index];
        assert_eq!(expected_name, name, "canonical table out of order");

        assert!(EXTRACTION_RULES[index].regex.is_match(text), "{} does not fire on {:?}", name, text);

        // No lower-precedence example is claimed by this rule
        for (later_name, later_text, _, _) in &CANONICAL[index + 1..] {
            assert!(
                !EXTRACTION_RULES[index].regex.is_match(later_text),
                "{} also fires on the {} example {:?}",
                name,
                later_name,
                later_text
            );
        }

        let extraction = extract(text).unwrap();
        assert_eq!(extraction.rule, name);
        assert_eq!(extraction.company.as_deref(), company);
        assert_eq!(extraction.role.as_deref(), role);
    }

    #[test]
    fn test_rule_table_matches_canonical_list() {
        assert_eq!(EXTRACTION_RULES.len(), CANONICAL.len());
    }

    #[test]
    fn test_application_to_role_at_company() {
        assert_canonical("application_to_role_at_company");
    }

    #[test]
    fn test_thanks_for_applying_role_at_company() {
        assert_canonical("thanks_for_applying_role_at_company");
    }

    #[test]
    fn test_thank_you_for_applying_to_company() {
        assert_canonical("thank_you_for_applying_to_company");
    }

    #[test]
    fn test_thanks_for_applying_to_company() {
        assert_canonical("thanks_for_applying_to_company");
    }

    #[test]
    fn test_application_sent_to_company() {
        assert_canonical("application_sent_to_company");
    }

    #[test]
    fn test_application_viewed_by_company() {
        assert_canonical("application_viewed_by_company");
    }

    #[test]
    fn test_application_update_from_company() {
        assert_canonical("application_update_from_company");
    }

    #[test]
    fn test_application_to_company() {
        assert_canonical("application_to_company");
    }

    #[test]
    fn test_company_thank_you_for_your_application_role() {
        assert_canonical("company_thank_you_for_your_application_role");
    }

    #[test]
    fn test_thanks_for_applying_for_role() {
        assert_canonical("thanks_for_applying_for_role");
    }

    #[test]
    fn test_role_opportunity_at_company() {
        assert_canonical("role_opportunity_at_company");
    }

    #[test]
    fn test_application_dash_role() {
        assert_canonical("application_dash_role");
    }

    #[test]
    fn test_interest_in_joining_company() {
        assert_canonical("interest_in_joining_company");
    }

    #[test]
    fn test_application_for_role() {
        assert_canonical("application_for_role");
    }

    #[test]
    fn test_received_application_at_company() {
        assert_canonical("received_application_at_company");
    }

    #[test]
    fn test_next_steps_at_company() {
        assert_canonical("next_steps_at_company");
    }

    #[test]
    fn test_interview_invitation_company() {
        assert_canonical("interview_invitation_company");
    }

    #[test]
    fn test_company_dash_interview() {
        assert_canonical("company_dash_interview");
    }

    #[test]
    fn test_company_role_dash_application() {
        assert_canonical("company_role_dash_application");
    }

    #[test]
    fn test_capture_cleanup() {
        assert_eq!(clean_capture("  Acme Corp.!  "), "Acme Corp");
        assert_eq!(clean_capture("Acme, Inc"), "Acme, Inc");
    }

    #[test]
    fn test_separator_ends_company() {
        let extraction = extract("Your application to Engineer at Acme | LinkedIn").unwrap();
        assert_eq!(extraction.company.as_deref(), Some("Acme"));
    }

    #[test]
    fn test_extract_role_skips_role_less_rules() {
        assert_eq!(extract_role("Thank you for applying to Acme"), None);
        assert_eq!(
            extract_role("Your application to Engineer at Acme").as_deref(),
            Some("Engineer")
        );
    }

    #[test]
    fn test_no_rule_matches_plain_text() {
        assert!(extract("Lunch on Friday?").is_none());
    }

    #[test]
    fn test_status_hints_precedence() {
        assert_eq!(infer_status("Congratulations! Offer letter inside"), ApplicationStatus::Offer);
        assert_eq!(infer_status("Please schedule your interview"), ApplicationStatus::Interviewing);
        assert_eq!(
            infer_status("Unfortunately we are not moving forward"),
            ApplicationStatus::Rejected
        );
        // Offer outranks rejection wording
        assert_eq!(infer_status("We regret the delay on your offer"), ApplicationStatus::Offer);
        assert_eq!(infer_status("Thank you for applying"), ApplicationStatus::Applied);
    }
}
