//! Contact value normalization
//!
//! Canonicalizes a raw value into a comparison-stable form per contact type.
//! Every transform here is deterministic and idempotent:
//! `normalize(t, &normalize(t, v)) == normalize(t, v)`.
//!
//! Email provider rules:
//! - every domain: a `+tag` suffix of the local part is dropped
//! - Gmail family (`gmail.com`, `googlemail.com`): dots in the local part are
//!   dropped and `googlemail.com` is folded into `gmail.com`

use crate::config::NormalizationConfig;
use crate::{CandidateContact, ContactType};

/// Domains whose mailboxes ignore dots in the local part
const DOTLESS_DOMAINS: &[&str] = &["gmail.com"];

/// Domain aliases folded to their canonical domain
const DOMAIN_ALIASES: &[(&str, &str)] = &[("googlemail.com", "gmail.com")];

/// Normalizer carrying the country settings used for phone numbers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalizer {
    country_code: Option<String>,
    trunk_prefix: String,
}

impl Normalizer {
    /// Create a normalizer from configuration
    pub fn new(config: &NormalizationConfig) -> Self {
        Self {
            country_code: config.default_country_code.clone(),
            trunk_prefix: config.trunk_prefix.clone(),
        }
    }

    /// Normalizer that never infers a country
    pub fn without_country() -> Self {
        Self {
            country_code: None,
            trunk_prefix: String::new(),
        }
    }

    /// Normalize a raw value of the given type
    pub fn normalize(&self, contact_type: ContactType, raw: &str) -> String {
        match contact_type {
            ContactType::Phone => self.normalize_phone(raw),
            ContactType::Email => normalize_email(raw),
            ContactType::Website | ContactType::Name => collapse_lowercase(raw),
        }
    }

    /// Fill `normalized_value` from `raw_value`
    pub fn apply(&self, candidate: &mut CandidateContact) {
        candidate.normalized_value = self.normalize(candidate.contact_type, &candidate.raw_value);
    }

    fn normalize_phone(&self, raw: &str) -> String {
        // "+49 (0) 176 ..." carries an optional trunk digit in parentheses
        let cleaned = raw.replace("(0)", "");
        let trimmed = cleaned.trim();
        let has_plus = trimmed.starts_with('+');
        let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();

        if digits.is_empty() {
            return String::new();
        }
        if has_plus {
            return format!("+{digits}");
        }
        if let Some(rest) = digits.strip_prefix("00") {
            if !rest.is_empty() {
                return format!("+{rest}");
            }
            return digits;
        }
        if let Some(cc) = &self.country_code {
            if !self.trunk_prefix.is_empty() {
                if let Some(rest) = digits.strip_prefix(self.trunk_prefix.as_str()) {
                    if !rest.is_empty() {
                        return format!("+{cc}{rest}");
                    }
                }
            }
        }

        digits
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&NormalizationConfig::default())
    }
}

/// Normalize with the default country settings
pub fn normalize(contact_type: ContactType, raw: &str) -> String {
    Normalizer::default().normalize(contact_type, raw)
}

fn normalize_email(raw: &str) -> String {
    let mut value = raw.to_lowercase();
    value.retain(|c| !c.is_whitespace());

    while let Some(rest) = value.strip_prefix("mailto:") {
        value = rest.to_string();
    }
    // mailto links may carry ?subject=... parameters
    if let Some(idx) = value.find('?') {
        value.truncate(idx);
    }

    let Some((local, domain)) = value.rsplit_once('@') else {
        return value;
    };

    let mut local = local.to_string();
    if let Some(idx) = local.find('+') {
        if idx > 0 {
            local.truncate(idx);
        }
    }

    let domain = DOMAIN_ALIASES
        .iter()
        .find(|(alias, _)| *alias == domain)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(domain);

    if DOTLESS_DOMAINS.contains(&domain) {
        local.retain(|c| c != '.');
    }

    format!("{local}@{domain}")
}

fn collapse_lowercase(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Domain part of a normalized email
pub fn email_domain(normalized: &str) -> Option<&str> {
    normalized
        .rsplit_once('@')
        .map(|(_, d)| d)
        .filter(|d| !d.is_empty())
}

/// Local part of a normalized email
pub fn email_local(normalized: &str) -> &str {
    normalized
        .rsplit_once('@')
        .map(|(l, _)| l)
        .unwrap_or(normalized)
}

/// Host of a website value without scheme, `www.`, port or path
pub fn website_host(normalized: &str) -> Option<String> {
    let without_scheme = normalized
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(normalized);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host = host.rsplit_once('@').map(|(_, h)| h).unwrap_or(host);
    let host = host.split(':').next().unwrap_or_default();
    let host = host.strip_prefix("www.").unwrap_or(host);

    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_phone_trunk_prefix_rewritten() {
        assert_eq!(normalize(ContactType::Phone, "0176 12345678"), "+4917612345678");
        assert_eq!(normalize(ContactType::Phone, "+49 176 1234-5678"), "+4917612345678");
        assert_eq!(normalize(ContactType::Phone, "0049 176 12345678"), "+4917612345678");
        assert_eq!(
            normalize(ContactType::Phone, "+49 (0) 176 / 123 456 78"),
            "+4917612345678"
        );
    }

    #[test]
    fn test_phone_without_known_country() {
        let normalizer = Normalizer::without_country();
        assert_eq!(
            normalizer.normalize(ContactType::Phone, "0176 12345678"),
            "017612345678"
        );
        assert_eq!(
            normalizer.normalize(ContactType::Phone, "+33 1 23 45 67 89"),
            "+33123456789"
        );
    }

    #[test]
    fn test_phone_degenerate_inputs() {
        assert_eq!(normalize(ContactType::Phone, ""), "");
        assert_eq!(normalize(ContactType::Phone, "Tel."), "");
        assert_eq!(normalize(ContactType::Phone, "00"), "00");
        assert_eq!(normalize(ContactType::Phone, "0"), "0");
    }

    #[test]
    fn test_email_gmail_rules() {
        assert_eq!(
            normalize(ContactType::Email, "Max.Mustermann+flat@gmail.com"),
            "maxmustermann@gmail.com"
        );
        assert_eq!(
            normalize(ContactType::Email, "max.mustermann@GoogleMail.com"),
            "maxmustermann@gmail.com"
        );
    }

    #[test]
    fn test_email_other_providers_keep_dots() {
        assert_eq!(
            normalize(ContactType::Email, " Anna.Schmidt+wohnung@Web.DE "),
            "anna.schmidt@web.de"
        );
        assert_eq!(
            normalize(ContactType::Email, "mailto:info@example.org?subject=Wohnung"),
            "info@example.org"
        );
    }

    #[test]
    fn test_website_and_name_collapse() {
        assert_eq!(
            normalize(ContactType::Website, "  HTTPS://Example.com/Expose  "),
            "https://example.com/expose"
        );
        assert_eq!(
            normalize(ContactType::Name, "Max   \t Mustermann"),
            "max mustermann"
        );
    }

    #[test]
    fn test_helpers() {
        assert_eq!(email_domain("a@web.de"), Some("web.de"));
        assert_eq!(email_domain("nodomain"), None);
        assert_eq!(email_local("a.b@web.de"), "a.b");
        assert_eq!(
            website_host("https://www.immo-example.de:8080/listing/1?x=1").as_deref(),
            Some("immo-example.de")
        );
        assert_eq!(website_host("example.com").as_deref(), Some("example.com"));
        assert_eq!(website_host(""), None);
    }

    proptest! {
        #[test]
        fn prop_phone_idempotent(raw in "[0-9 +()/.-]{0,24}") {
            let once = normalize(ContactType::Phone, &raw);
            prop_assert_eq!(normalize(ContactType::Phone, &once), once);
        }

        #[test]
        fn prop_email_idempotent(raw in "[A-Za-z0-9.+_ -]{0,12}(@[A-Za-z0-9.-]{0,12})?(\\?[a-z=]{0,6})?") {
            let once = normalize(ContactType::Email, &raw);
            prop_assert_eq!(normalize(ContactType::Email, &once), once);
        }

        #[test]
        fn prop_gmail_idempotent(local in "[A-Za-z0-9.+]{1,12}") {
            let raw = format!("{local}@GoogleMail.com");
            let once = normalize(ContactType::Email, &raw);
            prop_assert_eq!(normalize(ContactType::Email, &once), once);
        }

        #[test]
        fn prop_text_idempotent(raw in "[A-Za-zÄÖÜäöüß0-9 .:/\t-]{0,32}") {
            for contact_type in [ContactType::Website, ContactType::Name] {
                let once = normalize(contact_type, &raw);
                prop_assert_eq!(normalize(contact_type, &once), once);
            }
        }
    }
}
