//! Document attachment extractor
//!
//! Parses PDF/DOCX/text attachments and produces two kinds of candidates:
//! labelled form fields (`document_form`) and pattern matches over the
//! remaining running text (`document_text`).

use std::collections::HashSet;

use cdp_core::{Attachment, CandidateContact, ContactType, ExtractionMethod, ListingPayload};
use cdp_parser::{FormField, ParsedDocument, ParserError, ParserRegistry};

use crate::patterns::{context_window, deobfuscate, ContactPatterns};
use crate::{ContactExtractor, ExtractorError, Result};

/// Confidence of a value taken from a labelled field
const FORM_FIELD_CONFIDENCE: f32 = 0.85;

/// Running-text matches in documents are slightly more trustworthy than
/// listing prose but less than labelled fields
const DOCUMENT_TEXT_FACTOR: f32 = 0.9;

const PHONE_LABELS: &[&str] = &[
    "tel", "telefon", "phone", "mobil", "handy", "fon", "rufnummer", "festnetz",
];
const EMAIL_LABELS: &[&str] = &["mail", "e-mail", "email"];
const WEBSITE_LABELS: &[&str] = &["web", "homepage", "internet", "website", "webseite", "url"];
const NAME_LABELS: &[&str] = &[
    "name",
    "ansprechpartner",
    "kontaktperson",
    "vermieter",
    "makler",
    "contact",
];

/// Extractor over document attachments
pub struct DocumentExtractor {
    parsers: ParserRegistry,
    patterns: &'static ContactPatterns,
    context_window: usize,
}

impl DocumentExtractor {
    pub fn new() -> Self {
        Self::with_registry(ParserRegistry::with_defaults())
    }

    pub fn with_registry(parsers: ParserRegistry) -> Self {
        Self {
            parsers,
            patterns: ContactPatterns::shared(),
            context_window: 40,
        }
    }

    /// Characters of surrounding text kept as context
    pub fn with_context_window(mut self, chars: usize) -> Self {
        self.context_window = chars;
        self
    }

    fn parse(&self, attachment: &Attachment) -> Result<Option<ParsedDocument>> {
        let bytes = attachment
            .read_bytes()
            .map_err(|source| ExtractorError::Attachment {
                name: attachment.name.clone(),
                source,
            })?;

        match self
            .parsers
            .parse_bytes(&attachment.name, attachment.mime_type.as_deref(), &bytes)
        {
            Ok(doc) => Ok(Some(doc)),
            Err(ParserError::UnsupportedFormat(format)) => {
                tracing::debug!("Skipping attachment {} ({})", attachment.name, format);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn form_candidates(
        &self,
        doc: &ParsedDocument,
        listing_id: &str,
        emitted: &mut HashSet<String>,
    ) -> Vec<CandidateContact> {
        let mut candidates = Vec::new();

        for field in &doc.form_fields {
            let Some(contact_type) = classify_label(&field.label) else {
                continue;
            };
            let Some(value) = self.field_value(field, contact_type) else {
                continue;
            };

            emitted.insert(value.clone());
            candidates.push(
                CandidateContact::new(
                    contact_type,
                    value,
                    ExtractionMethod::DocumentForm,
                    FORM_FIELD_CONFIDENCE,
                    listing_id,
                )
                .with_context(format!("{}: {}", doc.file_name, field.label)),
            );
        }

        candidates
    }

    /// The part of a field value that carries the contact
    ///
    /// "0176 1234567 (ab 18 Uhr)" keeps only the number. A name label whose
    /// value is really an address or number is left to the text patterns.
    fn field_value(&self, field: &FormField, contact_type: ContactType) -> Option<String> {
        let value = field.value.trim();

        match contact_type {
            ContactType::Name => {
                let looks_like_name = !value.contains('@')
                    && !value.chars().any(|c| c.is_ascii_digit())
                    && value.chars().any(char::is_alphabetic);
                looks_like_name.then(|| value.to_string())
            }
            _ => {
                let text = deobfuscate(value);
                let found = self
                    .patterns
                    .find_type(&text, contact_type)
                    .into_iter()
                    .next()
                    .map(|m| m.value);
                Some(found.unwrap_or_else(|| value.to_string()))
            }
        }
    }

    fn text_candidates(
        &self,
        doc: &ParsedDocument,
        listing_id: &str,
        emitted: &HashSet<String>,
    ) -> Vec<CandidateContact> {
        let text = deobfuscate(&doc.content);

        self.patterns
            .find_matches(&text)
            .into_iter()
            .filter(|m| !emitted.contains(&m.value))
            .map(|m| {
                let context = context_window(&text, m.start, m.end, self.context_window);
                CandidateContact::new(
                    m.contact_type,
                    m.value,
                    ExtractionMethod::DocumentText,
                    m.confidence * DOCUMENT_TEXT_FACTOR,
                    listing_id,
                )
                .with_context(context)
            })
            .collect()
    }
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContactExtractor for DocumentExtractor {
    fn name(&self) -> &str {
        "document"
    }

    fn methods(&self) -> &[ExtractionMethod] {
        &[ExtractionMethod::DocumentForm, ExtractionMethod::DocumentText]
    }

    fn extract(&self, listing: &ListingPayload) -> Result<Vec<CandidateContact>> {
        let mut candidates = Vec::new();

        for attachment in &listing.documents {
            let Some(doc) = self.parse(attachment)? else {
                continue;
            };

            let mut emitted = HashSet::new();
            candidates.extend(self.form_candidates(&doc, &listing.listing_id, &mut emitted));
            candidates.extend(self.text_candidates(&doc, &listing.listing_id, &emitted));

            tracing::debug!(
                "Document {} of listing {}: {} form fields",
                doc.file_name,
                listing.listing_id,
                doc.form_fields.len()
            );
        }

        Ok(candidates)
    }
}

fn classify_label(label: &str) -> Option<ContactType> {
    let label = label.to_lowercase();
    let has = |keys: &[&str]| keys.iter().any(|k| label.contains(k));

    // Order matters: "E-Mail-Kontakt" is an email, "Telefon Vermieter" a phone
    if has(PHONE_LABELS) {
        Some(ContactType::Phone)
    } else if has(EMAIL_LABELS) {
        Some(ContactType::Email)
    } else if has(WEBSITE_LABELS) {
        Some(ContactType::Website)
    } else if has(NAME_LABELS) {
        Some(ContactType::Name)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing_with(name: &str, body: &str) -> ListingPayload {
        ListingPayload::new("doc-1")
            .with_document(Attachment::inline(name, body.as_bytes().to_vec()))
    }

    #[test]
    fn test_label_classification() {
        assert_eq!(classify_label("Telefon"), Some(ContactType::Phone));
        assert_eq!(classify_label("Mobilnummer"), Some(ContactType::Phone));
        assert_eq!(classify_label("E-Mail-Adresse"), Some(ContactType::Email));
        assert_eq!(classify_label("Homepage"), Some(ContactType::Website));
        assert_eq!(classify_label("Ansprechpartner"), Some(ContactType::Name));
        assert_eq!(classify_label("Kaltmiete"), None);
    }

    #[test]
    fn test_form_fields_and_running_text() {
        let listing = listing_with(
            "expose.txt",
            "Exposé Gartenstraße\n\
             Ansprechpartner: Max Mustermann\n\
             Telefon: 0176 12345678 (ab 18 Uhr)\n\
             Kaltmiete: 850 EUR\n\
             Rückfragen gerne auch an hausverwaltung@example.de.\n",
        );

        let candidates = DocumentExtractor::new().extract(&listing).unwrap();

        let form: Vec<_> = candidates
            .iter()
            .filter(|c| c.extraction_method == ExtractionMethod::DocumentForm)
            .collect();
        assert_eq!(form.len(), 2);
        assert_eq!(form[0].raw_value, "Max Mustermann");
        assert_eq!(form[1].raw_value, "0176 12345678");
        assert_eq!(form[1].context, "expose.txt: Telefon");
        assert_eq!(form[1].confidence, FORM_FIELD_CONFIDENCE);

        let text: Vec<_> = candidates
            .iter()
            .filter(|c| c.extraction_method == ExtractionMethod::DocumentText)
            .collect();
        assert_eq!(text.len(), 1);
        assert_eq!(text[0].raw_value, "hausverwaltung@example.de");
        assert!((text[0].confidence - 0.7 * DOCUMENT_TEXT_FACTOR).abs() < 1e-6);
    }

    #[test]
    fn test_name_label_with_address_value() {
        let listing = listing_with("info.txt", "Kontaktperson: mail@example.de\n");
        let candidates = DocumentExtractor::new().extract(&listing).unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].contact_type, ContactType::Email);
        assert_eq!(candidates[0].extraction_method, ExtractionMethod::DocumentText);
    }

    #[test]
    fn test_unsupported_attachment_is_skipped() {
        let listing = listing_with("grundriss.dwg", "binary");
        assert!(DocumentExtractor::new().extract(&listing).unwrap().is_empty());
    }

    #[test]
    fn test_broken_document_fails_extractor() {
        let listing = listing_with("expose.pdf", "not really a pdf");
        let result = DocumentExtractor::new().extract(&listing);
        assert!(matches!(result, Err(ExtractorError::Parser(_))));
    }

    #[test]
    fn test_missing_file_fails_extractor() {
        let listing = ListingPayload::new("doc-2")
            .with_document(Attachment::path("gone.pdf", "/nonexistent/gone.pdf"));
        let result = DocumentExtractor::new().extract(&listing);
        assert!(matches!(result, Err(ExtractorError::Attachment { .. })));
    }
}
