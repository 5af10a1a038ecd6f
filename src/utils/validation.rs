use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::handlers::lead_dtos::{LeadInput, ValidationOutcome};

/// Returned for every schema failure, honeypot hits included. Deliberately
/// non-specific so a probing client can't learn which check tripped.
pub const GENERIC_REJECTION: &str = "Invalid form.";

pub const FREE_MAIL_WARNING: &str = "Using a personal email may reduce deliverability.";

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("invalid email regex"));

static FREE_MAIL: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "gmail.com",
        "yahoo.com",
        "hotmail.com",
        "outlook.com",
        "icloud.com",
        "aol.com",
        "proton.me",
        "protonmail.com",
        "mail.com",
        "zoho.com",
        "yandex.com",
        "live.com",
        "msn.com",
        "pm.me",
    ]
    .into_iter()
    .collect()
});

/// Projects the raw form fields into a `LeadInput`. Total function: missing
/// required fields become empty strings, missing or empty optional fields
/// become `None`. No validation happens here.
pub fn parse_form_data(fields: &HashMap<String, String>) -> LeadInput {
    let required = |key: &str| fields.get(key).cloned().unwrap_or_default();
    let optional = |key: &str| fields.get(key).cloned().filter(|v| !v.is_empty());
    LeadInput {
        name: required("name"),
        email: required("email"),
        company: required("company"),
        whatsapp: optional("whatsapp"),
        website: optional("website"),
        t0: optional("t0"),
    }
}

pub fn is_free_mail(email: &str) -> bool {
    match email.rsplit('@').next() {
        Some(domain) if !domain.is_empty() => FREE_MAIL.contains(domain.to_lowercase().as_str()),
        _ => false,
    }
}

fn schema_ok(input: &LeadInput) -> bool {
    if input.name.is_empty() || input.company.is_empty() {
        return false;
    }
    if input.email.is_empty() || !EMAIL_RE.is_match(&input.email) {
        return false;
    }
    // Honeypot: any value at all is a bot signal
    if input.website.as_deref().is_some_and(|w| !w.is_empty()) {
        return false;
    }
    if let Some(t0) = input.t0.as_deref() {
        if t0.is_empty() || !t0.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
    }
    true
}

pub fn validate_lead(input: LeadInput) -> ValidationOutcome {
    if !schema_ok(&input) {
        return ValidationOutcome::Rejected {
            reason: GENERIC_REJECTION.to_string(),
        };
    }
    let soft_warning = is_free_mail(&input.email).then(|| FREE_MAIL_WARNING.to_string());
    ValidationOutcome::Accepted {
        data: input,
        soft_warning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn valid_input() -> LeadInput {
        LeadInput {
            name: "Jane".to_string(),
            email: "jane@company.com".to_string(),
            company: "ACME".to_string(),
            whatsapp: None,
            website: None,
            t0: None,
        }
    }

    #[test]
    fn parse_defaults_missing_required_fields_to_empty() {
        let input = parse_form_data(&fields(&[("email", "a@b.co")]));
        assert_eq!(input.name, "");
        assert_eq!(input.email, "a@b.co");
        assert_eq!(input.company, "");
        assert_eq!(input.whatsapp, None);
    }

    #[test]
    fn parse_treats_empty_optional_fields_as_absent() {
        let input = parse_form_data(&fields(&[
            ("name", "Jane"),
            ("website", ""),
            ("t0", ""),
            ("whatsapp", "+358401234567"),
        ]));
        assert_eq!(input.website, None);
        assert_eq!(input.t0, None);
        assert_eq!(input.whatsapp.as_deref(), Some("+358401234567"));
    }

    #[test]
    fn honeypot_always_rejects_with_generic_message() {
        let mut input = valid_input();
        input.website = Some("https://spam.example".to_string());
        match validate_lead(input) {
            ValidationOutcome::Rejected { reason } => assert_eq!(reason, GENERIC_REJECTION),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn schema_failure_uses_the_same_generic_message_as_honeypot() {
        let mut input = valid_input();
        input.email = "not-an-email".to_string();
        match validate_lead(input) {
            ValidationOutcome::Rejected { reason } => assert_eq!(reason, GENERIC_REJECTION),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn non_numeric_t0_rejects() {
        let mut input = valid_input();
        input.t0 = Some("12a4".to_string());
        assert!(matches!(
            validate_lead(input),
            ValidationOutcome::Rejected { .. }
        ));
    }

    #[test]
    fn free_mail_domains_set_the_soft_warning() {
        assert!(is_free_mail("a@gmail.com"));
        assert!(is_free_mail("a@GMAIL.COM"));
        assert!(!is_free_mail("b@company.com"));
        assert!(!is_free_mail("no-at-sign"));

        let mut input = valid_input();
        input.email = "jane@gmail.com".to_string();
        match validate_lead(input) {
            ValidationOutcome::Accepted { soft_warning, .. } => {
                assert_eq!(soft_warning.as_deref(), Some(FREE_MAIL_WARNING));
            }
            other => panic!("expected acceptance, got {:?}", other),
        }
    }

    #[test]
    fn company_email_has_no_soft_warning() {
        match validate_lead(valid_input()) {
            ValidationOutcome::Accepted { soft_warning, data } => {
                assert_eq!(soft_warning, None);
                assert_eq!(data.email, "jane@company.com");
            }
            other => panic!("expected acceptance, got {:?}", other),
        }
    }
}
