//! PDF document parser using pdf-extract
//!
//! Exposés and flyers are mostly single-column text; contact blocks show up
//! as "Label: value" lines which are lifted into form fields.

use crate::{detect_form_fields, DocumentParser, FileType, ParsedDocument, ParserError, Result};

/// PDF document parser
pub struct PdfParser {
    /// Whether to lift "Label: value" lines into form fields
    pub detect_fields: bool,
}

impl PdfParser {
    /// Create a new PDF parser with default settings
    pub fn new() -> Self {
        Self {
            detect_fields: true,
        }
    }

    /// Enable or disable form field detection
    pub fn with_field_detection(mut self, enabled: bool) -> Self {
        self.detect_fields = enabled;
        self
    }

    /// Extract text and an estimated page count
    fn extract_text(&self, bytes: &[u8]) -> Result<(String, Option<u32>)> {
        let text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ParserError::PdfError(e.to_string()))?;

        // pdf-extract separates pages with form feeds
        let breaks = text.matches('\x0C').count() as u32;
        let page_count = if breaks > 0 { Some(breaks + 1) } else { None };

        Ok((text, page_count))
    }
}

impl Default for PdfParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser for PdfParser {
    fn parse_bytes(&self, name: &str, bytes: &[u8]) -> Result<ParsedDocument> {
        if !bytes.starts_with(b"%PDF") {
            return Err(ParserError::PdfError(format!("{name}: missing PDF header")));
        }

        let (text, page_count) = self.extract_text(bytes)?;

        let mut doc = ParsedDocument::new(name, FileType::Pdf);
        if self.detect_fields {
            doc.form_fields = detect_form_fields(&text);
        }
        doc.page_count = page_count;
        doc.content = text;

        tracing::debug!(
            "Parsed PDF {}: {} words, {} form fields",
            name,
            doc.word_count(),
            doc.form_fields.len()
        );

        Ok(doc)
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::Pdf]
    }
}
