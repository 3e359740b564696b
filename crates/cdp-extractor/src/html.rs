//! `mailto:` / `tel:` link extractor

use once_cell::sync::Lazy;
use regex::Regex;

use cdp_core::{CandidateContact, ContactType, ExtractionMethod, ListingPayload};

use crate::patterns::{percent_decode, strip_html};
use crate::{ContactExtractor, Result};

const LINK_CONFIDENCE: f32 = 0.9;

static CONTACT_LINK: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<a\b[^>]*?\bhref\s*=\s*["']\s*(mailto|tel|callto):([^"']+)["'][^>]*>(.*?)</a\s*>"#,
    )
    .ok()
});

/// Extractor over contact links in the listing markup
#[derive(Debug, Default, Clone)]
pub struct HtmlLinkExtractor;

impl HtmlLinkExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl ContactExtractor for HtmlLinkExtractor {
    fn name(&self) -> &str {
        "html_link"
    }

    fn methods(&self) -> &[ExtractionMethod] {
        &[ExtractionMethod::HtmlLink]
    }

    fn extract(&self, listing: &ListingPayload) -> Result<Vec<CandidateContact>> {
        let (Some(html), Some(link)) = (&listing.html, CONTACT_LINK.as_ref()) else {
            return Ok(Vec::new());
        };

        let mut candidates = Vec::new();

        for caps in link.captures_iter(html) {
            let scheme = caps[1].to_lowercase();
            let target = percent_decode(&caps[2]);
            let anchor = strip_html(&caps[3]);
            let anchor = anchor.split_whitespace().collect::<Vec<_>>().join(" ");

            let (contact_type, values): (ContactType, Vec<String>) = match scheme.as_str() {
                "mailto" => {
                    // mailto:a@x.de,b@x.de?subject=...
                    let addresses = target.split('?').next().unwrap_or_default();
                    (
                        ContactType::Email,
                        addresses
                            .split(',')
                            .map(|a| a.trim().to_string())
                            .filter(|a| !a.is_empty())
                            .collect(),
                    )
                }
                _ => (ContactType::Phone, vec![target.trim().to_string()]),
            };

            for value in values {
                let context = if anchor.is_empty() || anchor == value {
                    format!("{scheme} link")
                } else {
                    anchor.clone()
                };

                candidates.push(
                    CandidateContact::new(
                        contact_type,
                        value,
                        ExtractionMethod::HtmlLink,
                        LINK_CONFIDENCE,
                        listing.listing_id.as_str(),
                    )
                    .with_context(context),
                );
            }
        }

        Ok(candidates)
    }
}
