//! Image attachment extractor (OCR)

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use cdp_core::{CandidateContact, ExtractionMethod, ListingPayload};
use cdp_ocr::OcrManager;

use crate::patterns::{context_window, deobfuscate, ContactPatterns};
use crate::{ContactExtractor, ExtractorError, Result};

/// Penalty for recognized text relative to typed text
const OCR_FACTOR: f32 = 0.9;

/// Digit-like runs that may contain misread digits; the word boundary keeps
/// the run from starting inside a word such as "Tel"
static PHONE_SHAPED: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"[+(]?\b[0-9OoIlSB][0-9OoIlSB ()/.-]{5,}[0-9OoIlSB]\b").ok());

/// Extractor running OCR over image attachments
pub struct ImageExtractor {
    ocr: Arc<OcrManager>,
    patterns: &'static ContactPatterns,
    context_window: usize,
}

impl ImageExtractor {
    pub fn new(ocr: Arc<OcrManager>) -> Self {
        Self {
            ocr,
            patterns: ContactPatterns::shared(),
            context_window: 40,
        }
    }

    /// Characters of surrounding text kept as context
    pub fn with_context_window(mut self, chars: usize) -> Self {
        self.context_window = chars;
        self
    }
}

impl ContactExtractor for ImageExtractor {
    fn name(&self) -> &str {
        "image_ocr"
    }

    fn methods(&self) -> &[ExtractionMethod] {
        &[ExtractionMethod::Ocr]
    }

    fn extract(&self, listing: &ListingPayload) -> Result<Vec<CandidateContact>> {
        let mut candidates = Vec::new();

        for image in &listing.images {
            let bytes = image
                .read_bytes()
                .map_err(|source| ExtractorError::Attachment {
                    name: image.name.clone(),
                    source,
                })?;

            let recognized = self.ocr.recognize(&image.name, &bytes)?;
            let text = deobfuscate(&repair_digits(&recognized.text));

            for m in self.patterns.find_matches(&text) {
                let confidence = m.confidence * recognized.confidence * OCR_FACTOR;
                let context = context_window(&text, m.start, m.end, self.context_window);

                candidates.push(
                    CandidateContact::new(
                        m.contact_type,
                        m.value,
                        ExtractionMethod::Ocr,
                        confidence,
                        listing.listing_id.as_str(),
                    )
                    .with_context(context),
                );
            }
        }

        Ok(candidates)
    }
}

/// Fix letters OCR commonly reads in place of digits inside number runs
///
/// Only runs that are already mostly digits are touched, so words and
/// email addresses stay intact.
pub fn repair_digits(text: &str) -> String {
    let Some(shape) = PHONE_SHAPED.as_ref() else {
        return text.to_string();
    };

    shape
        .replace_all(text, |caps: &regex::Captures| {
            let run = &caps[0];
            let digits = run.chars().filter(|c| c.is_ascii_digit()).count();
            let confusable = run.chars().filter(|c| "OoIlSB".contains(*c)).count();

            if confusable == 0 || digits < 5 || confusable * 2 > digits {
                return run.to_string();
            }

            run.chars()
                .map(|c| match c {
                    'O' | 'o' => '0',
                    'I' | 'l' => '1',
                    'S' => '5',
                    'B' => '8',
                    other => other,
                })
                .collect()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_core::{Attachment, ContactType};
    use cdp_ocr::{OcrEngine, OcrError, OcrResult};

    struct ScriptedEngine {
        text: &'static str,
        confidence: f32,
    }

    impl OcrEngine for ScriptedEngine {
        fn recognize(&self, _name: &str, _image: &[u8]) -> cdp_ocr::Result<OcrResult> {
            Ok(OcrResult::new(self.text).with_confidence(self.confidence))
        }

        fn is_available(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn manager(text: &'static str, confidence: f32) -> Arc<OcrManager> {
        let mut manager = OcrManager::new();
        manager.register(ScriptedEngine { text, confidence });
        Arc::new(manager)
    }

    #[test]
    fn test_repair_digits() {
        assert_eq!(repair_digits("Tel. O176 l234S678"), "Tel. 0176 12345678");
        assert_eq!(repair_digits("+49 3O 12B4567"), "+49 30 1284567");
        assert_eq!(repair_digits("Info: SOBO"), "Info: SOBO");
        assert_eq!(repair_digits("mail@BOSS.de"), "mail@BOSS.de");
    }

    #[test]
    fn test_ocr_candidates() {
        let extractor = ImageExtractor::new(manager("Vermiete Wohnung\nTel O176 12345678", 0.8));
        let listing = ListingPayload::new("img-1")
            .with_image(Attachment::inline("flyer.png", vec![1, 2, 3]));

        let candidates = extractor.extract(&listing).unwrap();
        assert_eq!(candidates.len(), 1);

        let phone = &candidates[0];
        assert_eq!(phone.contact_type, ContactType::Phone);
        assert_eq!(phone.raw_value, "0176 12345678");
        assert_eq!(phone.extraction_method, ExtractionMethod::Ocr);
        assert!((phone.confidence - 0.7 * 0.8 * OCR_FACTOR).abs() < 1e-6);
    }

    #[test]
    fn test_no_engine_fails_extractor() {
        let extractor = ImageExtractor::new(Arc::new(OcrManager::new()));
        let listing = ListingPayload::new("img-2")
            .with_image(Attachment::inline("flyer.png", vec![1]));

        let result = extractor.extract(&listing);
        assert!(matches!(
            result,
            Err(ExtractorError::Ocr(OcrError::EngineNotAvailable(_)))
        ));
    }

    #[test]
    fn test_listing_without_images() {
        let extractor = ImageExtractor::new(Arc::new(OcrManager::new()));
        assert!(extractor
            .extract(&ListingPayload::new("img-3"))
            .unwrap()
            .is_empty());
    }
}
