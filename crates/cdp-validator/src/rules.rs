//! Validation rules
//!
//! Rules are plain data (kind + parameters) and are evaluated by a single
//! dispatcher, [`ValidationRule::evaluate`]. A rule yields at most one
//! finding; errors make a candidate invalid, warnings make it uncertain.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use cdp_core::normalize::{email_domain, email_local, website_host};
use cdp_core::{CandidateContact, ContactType, ValidationConfig};

// ============================================================================
// Findings
// ============================================================================

/// Severity of a rule finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Fatal to validity
    Error,
    /// Downgrades to uncertain
    Warning,
}

/// One problem reported by a rule or a reality check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
}

impl Finding {
    pub fn error(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn warning(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

// ============================================================================
// Reference Lists
// ============================================================================

const DISPOSABLE_DOMAINS: &[&str] = &[
    "10minutemail.com",
    "discard.email",
    "dispostable.com",
    "emailondeck.com",
    "fakeinbox.com",
    "getnada.com",
    "guerrillamail.com",
    "guerrillamail.de",
    "maildrop.cc",
    "mailinator.com",
    "mailnesia.com",
    "mintemail.com",
    "mytemp.email",
    "sharklasers.com",
    "spambog.com",
    "spamgourmet.com",
    "temp-mail.org",
    "tempmail.de",
    "throwawaymail.com",
    "trashmail.com",
    "trashmail.de",
    "wegwerfmail.de",
    "wegwerfmail.net",
    "yopmail.com",
];

/// Mailboxes that never read replies
const NO_REPLY_LOCALS: &[&str] = &["noreply", "no-reply", "donotreply", "do-not-reply", "mailer-daemon"];

/// Technical role mailboxes unlikely to reach a landlord or agent
const TECHNICAL_LOCALS: &[&str] = &["postmaster", "hostmaster", "webmaster", "abuse", "root"];

const URL_SHORTENERS: &[&str] = &[
    "bit.ly", "buff.ly", "cutt.ly", "goo.gl", "is.gd", "ow.ly", "rebrand.ly", "t.co",
    "tiny.cc", "tinyurl.com",
];

const NAME_PLACEHOLDERS: &[&str] = &[
    "test",
    "name",
    "unknown",
    "unbekannt",
    "n/a",
    "john doe",
    "jane doe",
    "max mustermann",
    "erika mustermann",
    "vorname nachname",
    "lorem ipsum",
];

static EMAIL_SHAPE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"^[a-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}$",
    )
    .ok()
});

/// Domain lists consulted by the email rules
#[derive(Debug, Clone)]
pub struct DomainLists {
    disposable: HashSet<String>,
}

impl DomainLists {
    /// Built-in disposable domains plus `extra`
    pub fn new(extra: &[String]) -> Self {
        let disposable = DISPOSABLE_DOMAINS
            .iter()
            .map(|d| d.to_string())
            .chain(extra.iter().map(|d| d.trim().to_lowercase()))
            .filter(|d| !d.is_empty())
            .collect();
        Self { disposable }
    }

    pub fn is_disposable(&self, domain: &str) -> bool {
        self.disposable.contains(domain)
    }
}

impl Default for DomainLists {
    fn default() -> Self {
        Self::new(&[])
    }
}

// ============================================================================
// Rules
// ============================================================================

/// A validation rule: kind plus parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationRule {
    /// Digit count within the E.164 range
    PhoneLength { min_digits: usize, max_digits: usize },
    /// International prefix present and plausible
    PhoneCountryCode,
    /// No run of one digit longer than `max_run`
    RepeatedDigits { max_run: usize },
    /// Not a plain counting sequence such as 123456789
    SequentialDigits,
    EmailSyntax,
    DisposableDomain,
    RoleAccount,
    /// http(s) URL with a dotted host
    UrlScheme,
    UrlShortener,
    /// Letters, spaces and hyphens, at least `min_length` characters
    NameCharset { min_length: usize },
    NamePlaceholder,
    /// Extraction confidence at or above a per-type threshold
    MinConfidence {
        contact_type: ContactType,
        threshold: f32,
    },
}

impl ValidationRule {
    /// Stable rule name used in findings
    pub fn name(&self) -> &'static str {
        match self {
            Self::PhoneLength { .. } => "phone_length",
            Self::PhoneCountryCode => "phone_country_code",
            Self::RepeatedDigits { .. } => "repeated_digits",
            Self::SequentialDigits => "sequential_digits",
            Self::EmailSyntax => "email_syntax",
            Self::DisposableDomain => "disposable_domain",
            Self::RoleAccount => "role_account",
            Self::UrlScheme => "url_scheme",
            Self::UrlShortener => "url_shortener",
            Self::NameCharset { .. } => "name_charset",
            Self::NamePlaceholder => "name_placeholder",
            Self::MinConfidence { .. } => "min_confidence",
        }
    }

    /// Contact type the rule applies to
    pub fn contact_type(&self) -> ContactType {
        match self {
            Self::PhoneLength { .. }
            | Self::PhoneCountryCode
            | Self::RepeatedDigits { .. }
            | Self::SequentialDigits => ContactType::Phone,
            Self::EmailSyntax | Self::DisposableDomain | Self::RoleAccount => ContactType::Email,
            Self::UrlScheme | Self::UrlShortener => ContactType::Website,
            Self::NameCharset { .. } | Self::NamePlaceholder => ContactType::Name,
            Self::MinConfidence { contact_type, .. } => *contact_type,
        }
    }

    pub fn applies_to(&self, contact_type: ContactType) -> bool {
        self.contact_type() == contact_type
    }

    /// Evaluate the rule against a normalized candidate
    pub fn evaluate(&self, candidate: &CandidateContact, lists: &DomainLists) -> Option<Finding> {
        let value = candidate.normalized_value.as_str();
        let rule = self.name();

        match self {
            Self::PhoneLength {
                min_digits,
                max_digits,
            } => {
                let digits = value.chars().filter(|c| c.is_ascii_digit()).count();
                (digits < *min_digits || digits > *max_digits).then(|| {
                    Finding::error(
                        rule,
                        format!("{digits} digits, expected {min_digits}-{max_digits}"),
                    )
                })
            }

            Self::PhoneCountryCode => match value.strip_prefix('+') {
                Some(rest) if rest.starts_with('0') => {
                    Some(Finding::error(rule, "country code starts with 0"))
                }
                Some(_) => None,
                None => Some(Finding::warning(rule, "no country code")),
            },

            Self::RepeatedDigits { max_run } => {
                let run = longest_digit_run(value);
                (run > *max_run).then(|| Finding::error(rule, format!("{run} repeated digits")))
            }

            Self::SequentialDigits => {
                is_counting_sequence(value).then(|| Finding::warning(rule, "counting sequence"))
            }

            Self::EmailSyntax => {
                let shaped = EMAIL_SHAPE
                    .as_ref()
                    .map_or(value.contains('@'), |re| re.is_match(value));
                let local_ok = email_local(value).len() <= 64;

                if !shaped || !local_ok || value.len() > 254 {
                    Some(Finding::error(rule, "not an email address"))
                } else {
                    None
                }
            }

            Self::DisposableDomain => email_domain(value)
                .filter(|d| lists.is_disposable(d))
                .map(|d| Finding::error(rule, format!("disposable domain {d}"))),

            Self::RoleAccount => {
                let local = email_local(value);
                if NO_REPLY_LOCALS.contains(&local) {
                    Some(Finding::error(rule, format!("{local} does not accept replies")))
                } else if TECHNICAL_LOCALS.contains(&local) {
                    Some(Finding::warning(rule, format!("technical mailbox {local}")))
                } else {
                    None
                }
            }

            Self::UrlScheme => check_url(value).err(),

            Self::UrlShortener => website_host(value)
                .filter(|h| URL_SHORTENERS.contains(&h.as_str()))
                .map(|h| Finding::warning(rule, format!("link shortener {h}"))),

            Self::NameCharset { min_length } => {
                let length = value.chars().filter(|c| !c.is_whitespace()).count();
                if length < *min_length {
                    return Some(Finding::error(rule, format!("shorter than {min_length}")));
                }
                if !value.chars().any(char::is_alphabetic) {
                    return Some(Finding::error(rule, "no letters"));
                }

                let odd: Vec<char> = value
                    .chars()
                    .filter(|c| !(c.is_alphabetic() || c.is_whitespace() || *c == '-'))
                    .collect();
                if odd.is_empty() {
                    None
                } else if odd.iter().all(|c| *c == '.' || *c == '\'') {
                    // "dr. o'neill"
                    Some(Finding::warning(rule, "contains punctuation"))
                } else {
                    Some(Finding::error(rule, "contains characters other than letters"))
                }
            }

            Self::NamePlaceholder => NAME_PLACEHOLDERS
                .contains(&value)
                .then(|| Finding::warning(rule, format!("placeholder name {value:?}"))),

            Self::MinConfidence { threshold, .. } => (candidate.confidence < *threshold).then(|| {
                Finding::warning(
                    rule,
                    format!("confidence {:.2} below {threshold:.2}", candidate.confidence),
                )
            }),
        }
    }
}

/// Rule table for a validation configuration
pub fn default_rules(config: &ValidationConfig) -> Vec<ValidationRule> {
    let mut rules = vec![
        ValidationRule::PhoneLength {
            min_digits: 7,
            max_digits: 15,
        },
        ValidationRule::PhoneCountryCode,
        ValidationRule::RepeatedDigits { max_run: 6 },
        ValidationRule::SequentialDigits,
        ValidationRule::EmailSyntax,
        ValidationRule::DisposableDomain,
        ValidationRule::RoleAccount,
        ValidationRule::UrlScheme,
        ValidationRule::UrlShortener,
        ValidationRule::NameCharset {
            min_length: config.name_min_length,
        },
        ValidationRule::NamePlaceholder,
    ];

    for contact_type in ContactType::ALL {
        let threshold = config.min_confidence(contact_type);
        if threshold > 0.0 {
            rules.push(ValidationRule::MinConfidence {
                contact_type,
                threshold,
            });
        }
    }

    rules
}

fn longest_digit_run(value: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous = None;

    for c in value.chars().filter(|c| c.is_ascii_digit()) {
        current = if previous == Some(c) { current + 1 } else { 1 };
        previous = Some(c);
        longest = longest.max(current);
    }

    longest
}

/// Whether every digit follows its predecessor by +1 or every one by -1
fn is_counting_sequence(value: &str) -> bool {
    let digits: Vec<i8> = value
        .chars()
        .filter_map(|c| c.to_digit(10))
        .map(|d| d as i8)
        .collect();
    if digits.len() < 7 {
        return false;
    }

    let steps: Vec<i8> = digits
        .windows(2)
        .map(|w| (w[1] - w[0]).rem_euclid(10))
        .collect();
    steps.iter().all(|s| *s == 1) || steps.iter().all(|s| *s == 9)
}

fn check_url(value: &str) -> std::result::Result<(), Finding> {
    let (candidate, had_scheme) = if value.contains("://") {
        (value.to_string(), true)
    } else {
        (format!("http://{value}"), false)
    };

    let url = url::Url::parse(&candidate)
        .map_err(|e| Finding::error("url_scheme", format!("unparsable URL: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Finding::error(
            "url_scheme",
            format!("unsupported scheme {}", url.scheme()),
        ));
    }

    match url.host_str() {
        Some(host) if host.contains('.') => {}
        _ => return Err(Finding::error("url_scheme", "no public host")),
    }

    if had_scheme {
        Ok(())
    } else {
        Err(Finding::warning("url_scheme", "missing scheme"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_core::{ExtractionMethod, Normalizer};

    fn candidate(contact_type: ContactType, raw: &str) -> CandidateContact {
        let mut c = CandidateContact::new(contact_type, raw, ExtractionMethod::FreeText, 0.6, "l-1");
        Normalizer::default().apply(&mut c);
        c
    }

    fn eval(rule: ValidationRule, contact_type: ContactType, raw: &str) -> Option<Finding> {
        rule.evaluate(&candidate(contact_type, raw), &DomainLists::default())
    }

    #[test]
    fn test_phone_length() {
        let rule = ValidationRule::PhoneLength {
            min_digits: 7,
            max_digits: 15,
        };
        assert!(eval(rule.clone(), ContactType::Phone, "0176 12345678").is_none());
        assert_eq!(
            eval(rule.clone(), ContactType::Phone, "12345").map(|f| f.severity),
            Some(Severity::Error)
        );
        assert!(eval(rule, ContactType::Phone, "+49 176 1234567890123").is_some());
    }

    #[test]
    fn test_phone_country_code() {
        let rule = ValidationRule::PhoneCountryCode;
        assert!(eval(rule.clone(), ContactType::Phone, "+49 30 1234567").is_none());

        let national = CandidateContact {
            normalized_value: "3012345678".to_string(),
            ..candidate(ContactType::Phone, "30 12345678")
        };
        assert_eq!(
            rule.evaluate(&national, &DomainLists::default()).map(|f| f.severity),
            Some(Severity::Warning)
        );
    }

    #[test]
    fn test_repeated_and_sequential_digits() {
        let repeated = ValidationRule::RepeatedDigits { max_run: 6 };
        assert!(eval(repeated.clone(), ContactType::Phone, "030 0000000").is_some());
        assert!(eval(repeated, ContactType::Phone, "030 1000001").is_none());

        assert_eq!(longest_digit_run("+49 111 2222"), 4);
        assert!(is_counting_sequence("123456789"));
        assert!(is_counting_sequence("9876543210"));
        assert!(!is_counting_sequence("+4917612345678"));
        assert!(eval(ValidationRule::SequentialDigits, ContactType::Phone, "0176 12345678").is_none());
    }

    #[test]
    fn test_email_rules() {
        let syntax = ValidationRule::EmailSyntax;
        assert!(eval(syntax.clone(), ContactType::Email, "Info@Example.de").is_none());
        assert!(eval(syntax.clone(), ContactType::Email, "info@example").is_some());
        assert!(eval(syntax.clone(), ContactType::Email, "info.example.de").is_some());
        assert!(eval(syntax, ContactType::Email, "a..b@example.de").is_some());

        let disposable = ValidationRule::DisposableDomain;
        assert!(eval(disposable.clone(), ContactType::Email, "x@mailinator.com").is_some());
        assert!(eval(disposable, ContactType::Email, "x@example.de").is_none());

        let role = ValidationRule::RoleAccount;
        assert_eq!(
            eval(role.clone(), ContactType::Email, "noreply@example.de").map(|f| f.severity),
            Some(Severity::Error)
        );
        assert_eq!(
            eval(role.clone(), ContactType::Email, "webmaster@example.de").map(|f| f.severity),
            Some(Severity::Warning)
        );
        assert!(eval(role, ContactType::Email, "info@example.de").is_none());
    }

    #[test]
    fn test_extra_disposable_domains() {
        let lists = DomainLists::new(&["Spam.Example".to_string()]);
        let c = candidate(ContactType::Email, "someone@spam.example");
        assert!(ValidationRule::DisposableDomain.evaluate(&c, &lists).is_some());
    }

    #[test]
    fn test_url_rules() {
        let scheme = ValidationRule::UrlScheme;
        assert!(eval(scheme.clone(), ContactType::Website, "https://www.example.de/expose").is_none());
        assert_eq!(
            eval(scheme.clone(), ContactType::Website, "www.example.de").map(|f| f.severity),
            Some(Severity::Warning)
        );
        assert_eq!(
            eval(scheme.clone(), ContactType::Website, "ftp://example.de").map(|f| f.severity),
            Some(Severity::Error)
        );
        assert!(eval(scheme, ContactType::Website, "http://localhost").is_some());

        let shortener = ValidationRule::UrlShortener;
        assert!(eval(shortener.clone(), ContactType::Website, "https://bit.ly/abc").is_some());
        assert!(eval(shortener, ContactType::Website, "https://example.de").is_none());
    }

    #[test]
    fn test_name_rules() {
        let charset = ValidationRule::NameCharset { min_length: 2 };
        assert!(eval(charset.clone(), ContactType::Name, "Anna Schmidt-Weber").is_none());
        assert!(eval(charset.clone(), ContactType::Name, "A").is_some());
        assert_eq!(
            eval(charset.clone(), ContactType::Name, "Dr. Anna Schmidt").map(|f| f.severity),
            Some(Severity::Warning)
        );
        assert_eq!(
            eval(charset, ContactType::Name, "Anna 123").map(|f| f.severity),
            Some(Severity::Error)
        );

        assert!(eval(ValidationRule::NamePlaceholder, ContactType::Name, "Max  Mustermann").is_some());
        assert!(eval(ValidationRule::NamePlaceholder, ContactType::Name, "Anna Schmidt").is_none());
    }

    #[test]
    fn test_rule_type_binding() {
        assert!(ValidationRule::EmailSyntax.applies_to(ContactType::Email));
        assert!(!ValidationRule::EmailSyntax.applies_to(ContactType::Phone));

        let min = ValidationRule::MinConfidence {
            contact_type: ContactType::Name,
            threshold: 0.5,
        };
        assert!(min.applies_to(ContactType::Name));
        assert!(!min.applies_to(ContactType::Phone));
        assert!(eval(min, ContactType::Name, "Anna Schmidt").is_some());
    }

    #[test]
    fn test_default_rules_add_thresholds() {
        let config = ValidationConfig {
            email_min_confidence: 0.4,
            ..Default::default()
        };
        let rules = default_rules(&config);
        let thresholds: Vec<_> = rules
            .iter()
            .filter(|r| matches!(r, ValidationRule::MinConfidence { .. }))
            .collect();
        assert_eq!(
            thresholds,
            vec![&ValidationRule::MinConfidence {
                contact_type: ContactType::Email,
                threshold: 0.4,
            }]
        );
        assert_eq!(default_rules(&ValidationConfig::default()).len(), 11);
    }

    #[test]
    fn test_rules_serialize_as_tagged_variants() {
        let json = serde_json::to_string(&ValidationRule::RepeatedDigits { max_run: 6 }).unwrap();
        assert_eq!(json, r#"{"kind":"repeated_digits","max_run":6}"#);
    }
}
