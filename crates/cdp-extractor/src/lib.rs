//! CDP Extractor - Contact extraction from listing payloads
//!
//! Every extractor implements one contract: listing payload in, candidate
//! contacts out. Extractors are independent; a failing extractor yields no
//! candidates and an [`ExtractionFailure`] record, never an aborted batch.

pub mod document;
pub mod free_text;
pub mod html;
pub mod image;
pub mod patterns;
pub mod structured;

use std::sync::Arc;

use thiserror::Error;

use cdp_core::{
    CandidateContact, ExtractionConfig, ExtractionFailure, ExtractionMethod, ListingPayload,
};
use cdp_ocr::{OcrError, OcrManager};
use cdp_parser::ParserError;

pub use document::DocumentExtractor;
pub use free_text::FreeTextExtractor;
pub use html::HtmlLinkExtractor;
pub use image::ImageExtractor;
pub use patterns::{ContactPatterns, PatternMatch};
pub use structured::StructuredPayloadExtractor;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by a single extractor invocation
#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("Failed to read attachment {name}")]
    Attachment {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parser(#[from] ParserError),

    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

pub type Result<T> = std::result::Result<T, ExtractorError>;

// ============================================================================
// Extractor Trait
// ============================================================================

/// Trait for contact extractors
///
/// Implementations only read the payload. They run on blocking worker
/// threads, so synchronous IO (document parsing, OCR processes) is fine.
pub trait ContactExtractor: Send + Sync {
    /// Stable name used in logs and failure records
    fn name(&self) -> &str;

    /// Extraction methods this extractor tags candidates with
    fn methods(&self) -> &[ExtractionMethod];

    /// Extract candidate contacts from a listing
    fn extract(&self, listing: &ListingPayload) -> Result<Vec<CandidateContact>>;

    /// Whether this extractor calls into the OCR capability
    fn uses_ocr(&self) -> bool {
        self.methods().contains(&ExtractionMethod::Ocr)
    }
}

/// Candidates and failures of one or more extractor runs
#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    pub candidates: Vec<CandidateContact>,
    pub failures: Vec<ExtractionFailure>,
}

impl ExtractionOutcome {
    pub fn merge(&mut self, other: ExtractionOutcome) {
        self.candidates.extend(other.candidates);
        self.failures.extend(other.failures);
    }
}

/// Run one extractor over one listing, turning an error into a failure record
pub fn run_extractor(
    extractor: &dyn ContactExtractor,
    listing: &ListingPayload,
    enabled: &[ExtractionMethod],
) -> ExtractionOutcome {
    match extractor.extract(listing) {
        Ok(candidates) => {
            let candidates: Vec<_> = candidates
                .into_iter()
                .filter(|c| enabled.contains(&c.extraction_method))
                .collect();

            tracing::debug!(
                "Extractor {} found {} candidates in listing {}",
                extractor.name(),
                candidates.len(),
                listing.listing_id
            );

            ExtractionOutcome {
                candidates,
                failures: Vec::new(),
            }
        }
        Err(e) => {
            tracing::warn!(
                "Extractor {} failed on listing {}: {}",
                extractor.name(),
                listing.listing_id,
                e
            );

            ExtractionOutcome {
                candidates: Vec::new(),
                failures: vec![ExtractionFailure {
                    extractor: extractor.name().to_string(),
                    listing_id: listing.listing_id.clone(),
                    message: e.to_string(),
                }],
            }
        }
    }
}

// ============================================================================
// Extractor Set
// ============================================================================

/// The configured set of extractors
pub struct ExtractorSet {
    extractors: Vec<Arc<dyn ContactExtractor>>,
    enabled: Vec<ExtractionMethod>,
}

impl ExtractorSet {
    /// Create an empty set accepting every method
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
            enabled: ExtractionMethod::ALL.to_vec(),
        }
    }

    /// Build the default extractors for the enabled methods
    ///
    /// The image extractor is only registered when an OCR engine is present.
    pub fn from_config(config: &ExtractionConfig, ocr: Arc<OcrManager>) -> Self {
        let mut set = Self {
            extractors: Vec::new(),
            enabled: config.enabled_methods.clone(),
        };
        let window = config.context_window;

        set.register_if_enabled(StructuredPayloadExtractor::new());
        set.register_if_enabled(HtmlLinkExtractor::new());
        set.register_if_enabled(DocumentExtractor::new().with_context_window(window));
        set.register_if_enabled(FreeTextExtractor::new().with_context_window(window));

        if ocr.is_available() {
            set.register_if_enabled(ImageExtractor::new(ocr).with_context_window(window));
        } else if config.is_enabled(ExtractionMethod::Ocr) {
            tracing::info!("No OCR engine available; image attachments are not read");
        }

        set
    }

    /// Register an extractor
    pub fn register<E: ContactExtractor + 'static>(&mut self, extractor: E) {
        self.extractors.push(Arc::new(extractor));
    }

    fn register_if_enabled<E: ContactExtractor + 'static>(&mut self, extractor: E) {
        if extractor.methods().iter().any(|m| self.enabled.contains(m)) {
            self.register(extractor);
        }
    }

    /// Registered extractors
    pub fn extractors(&self) -> &[Arc<dyn ContactExtractor>] {
        &self.extractors
    }

    /// Methods whose candidates are kept
    pub fn enabled_methods(&self) -> &[ExtractionMethod] {
        &self.enabled
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    /// Run every extractor over a listing sequentially
    pub fn extract_all(&self, listing: &ListingPayload) -> ExtractionOutcome {
        let mut outcome = ExtractionOutcome::default();
        for extractor in &self.extractors {
            outcome.merge(run_extractor(extractor.as_ref(), listing, &self.enabled));
        }
        outcome
    }
}

impl Default for ExtractorSet {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_core::ContactType;
    use serde_json::json;

    struct FailingExtractor;

    impl ContactExtractor for FailingExtractor {
        fn name(&self) -> &str {
            "failing"
        }

        fn methods(&self) -> &[ExtractionMethod] {
            &[ExtractionMethod::FreeText]
        }

        fn extract(&self, _listing: &ListingPayload) -> Result<Vec<CandidateContact>> {
            Err(ExtractorError::InvalidPayload("boom".to_string()))
        }
    }

    fn sample_listing() -> ListingPayload {
        ListingPayload::new("l-1")
            .with_description("Rufen Sie an: 030 1234567")
            .with_html(r#"<a href="mailto:info@example.de">Mail</a>"#)
            .with_structured(json!({ "contact": { "phone": "030 1234567" } }))
    }

    #[test]
    fn test_failure_is_isolated() {
        let mut set = ExtractorSet::new();
        set.register(FailingExtractor);
        set.register(FreeTextExtractor::new());

        let outcome = set.extract_all(&sample_listing());

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].extractor, "failing");
        assert_eq!(outcome.failures[0].listing_id, "l-1");
        assert!(!outcome.candidates.is_empty());
    }

    #[test]
    fn test_from_config_respects_enabled_methods() {
        let config = ExtractionConfig {
            enabled_methods: vec![ExtractionMethod::StructuredApi, ExtractionMethod::HtmlLink],
            ..Default::default()
        };
        let set = ExtractorSet::from_config(&config, Arc::new(OcrManager::new()));

        let names: Vec<_> = set.extractors().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["structured_payload", "html_link"]);

        let outcome = set.extract_all(&sample_listing());
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.candidates.len(), 2);
        assert!(outcome
            .candidates
            .iter()
            .any(|c| c.contact_type == ContactType::Email));
    }

    #[test]
    fn test_disabled_method_candidates_are_dropped() {
        let mut set = ExtractorSet::from_config(
            &ExtractionConfig {
                enabled_methods: vec![ExtractionMethod::DocumentText],
                ..Default::default()
            },
            Arc::new(OcrManager::new()),
        );
        set.register(HtmlLinkExtractor::new());

        let outcome = set.extract_all(&sample_listing());
        assert!(outcome.candidates.is_empty());
    }

    #[test]
    fn test_default_set_without_ocr() {
        let set = ExtractorSet::from_config(&ExtractionConfig::default(), Arc::new(OcrManager::new()));
        assert_eq!(set.len(), 4);
        assert!(!set.extractors().iter().any(|e| e.uses_ocr()));
    }
}
