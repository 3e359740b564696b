//! Free-text extractor
//!
//! Runs the shared contact patterns over the listing title, description and
//! the visible text of the page markup, after undoing common obfuscation.

use std::collections::HashSet;

use cdp_core::{CandidateContact, ContactType, ExtractionMethod, ListingPayload};

use crate::patterns::{context_window, deobfuscate, strip_html, ContactPatterns};
use crate::{ContactExtractor, Result};

/// Pattern-based extractor over running listing text
pub struct FreeTextExtractor {
    patterns: &'static ContactPatterns,
    context_window: usize,
}

impl FreeTextExtractor {
    pub fn new() -> Self {
        Self {
            patterns: ContactPatterns::shared(),
            context_window: 40,
        }
    }

    /// Characters of surrounding text kept as context
    pub fn with_context_window(mut self, chars: usize) -> Self {
        self.context_window = chars;
        self
    }

    fn sources(listing: &ListingPayload) -> Vec<String> {
        let mut sources = Vec::new();
        if let Some(title) = &listing.title {
            sources.push(title.clone());
        }
        if let Some(description) = &listing.description {
            sources.push(description.clone());
        }
        if let Some(html) = &listing.html {
            sources.push(strip_html(html));
        }
        sources
    }
}

impl Default for FreeTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContactExtractor for FreeTextExtractor {
    fn name(&self) -> &str {
        "free_text"
    }

    fn methods(&self) -> &[ExtractionMethod] {
        &[ExtractionMethod::FreeText]
    }

    fn extract(&self, listing: &ListingPayload) -> Result<Vec<CandidateContact>> {
        let mut candidates = Vec::new();
        // The description is often repeated inside the markup
        let mut seen: HashSet<(ContactType, String)> = HashSet::new();

        for source in Self::sources(listing) {
            let text = deobfuscate(&source);

            for m in self.patterns.find_matches(&text) {
                if !seen.insert((m.contact_type, m.value.clone())) {
                    continue;
                }

                let context = context_window(&text, m.start, m.end, self.context_window);
                candidates.push(
                    CandidateContact::new(
                        m.contact_type,
                        m.value,
                        ExtractionMethod::FreeText,
                        m.confidence,
                        listing.listing_id.as_str(),
                    )
                    .with_context(context),
                );
            }
        }

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_from_description() {
        let listing = ListingPayload::new("l-1")
            .with_title("Helle 2-Zimmer-Wohnung")
            .with_description(
                "Ansprechpartnerin: Frau Anna Schmidt. Besichtigung unter Tel. 0176 12345678 \
                 oder per Mail an anna.schmidt [at] web [dot] de",
            );

        let candidates = FreeTextExtractor::new().extract(&listing).unwrap();
        let found: Vec<(ContactType, &str)> = candidates
            .iter()
            .map(|c| (c.contact_type, c.raw_value.as_str()))
            .collect();

        assert_eq!(
            found,
            vec![
                (ContactType::Name, "Anna Schmidt"),
                (ContactType::Phone, "0176 12345678"),
                (ContactType::Email, "anna.schmidt@web.de"),
            ]
        );
        assert!(candidates
            .iter()
            .all(|c| c.extraction_method == ExtractionMethod::FreeText));
        assert!(candidates[1].context.contains("Besichtigung"));
    }

    #[test]
    fn test_repeated_text_yields_one_candidate() {
        let listing = ListingPayload::new("l-2")
            .with_description("Kontakt unter 030 1234567")
            .with_html("<p>Kontakt unter 030 1234567</p>");

        let candidates = FreeTextExtractor::new().extract(&listing).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].confidence, 0.6);
    }

    #[test]
    fn test_context_window_setting() {
        let listing = ListingPayload::new("l-3").with_description("Sehr schöne Lage, Tel 0301234567 bitte ab 18 Uhr");

        let candidates = FreeTextExtractor::new()
            .with_context_window(0)
            .extract(&listing)
            .unwrap();
        assert_eq!(candidates[0].context, "0301234567");
    }

    #[test]
    fn test_no_text() {
        let listing = ListingPayload::new("l-4");
        assert!(FreeTextExtractor::new().extract(&listing).unwrap().is_empty());
    }
}
