//! CDP Parser - Attachment parsing for listing documents
//!
//! Supports parsing of:
//! - PDF documents (exposés, flyers)
//! - Microsoft Word (DOCX) forms
//! - Plain text files
//!
//! Each parser implements the `DocumentParser` trait and produces a
//! `ParsedDocument` carrying the text content plus any "label: value"
//! form fields found along the way. Form fields are what the document
//! extractor treats as higher-reliability contact sources.

pub mod docx;
pub mod pdf;

use std::path::Path;

use thiserror::Error;

pub use docx::DocxParser;
pub use pdf::PdfParser;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during document parsing
#[derive(Error, Debug)]
pub enum ParserError {
    /// File format is not supported
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// IO error while reading the file
    #[error("IO error reading file: {path}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// PDF parsing error
    #[error("PDF parsing error: {0}")]
    PdfError(String),

    /// DOCX parsing error
    #[error("DOCX parsing error: {0}")]
    DocxError(String),

    /// Encoding error
    #[error("Text encoding error: {0}")]
    EncodingError(String),
}

pub type Result<T> = std::result::Result<T, ParserError>;

// ============================================================================
// Parsed Document Types
// ============================================================================

/// A parsed document with extracted content
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    /// Attachment name
    pub file_name: String,

    /// Detected file type
    pub file_type: FileType,

    /// Extracted text content
    pub content: String,

    /// Label/value pairs found in form layouts
    pub form_fields: Vec<FormField>,

    /// Number of pages, when the format exposes it
    pub page_count: Option<u32>,
}

impl ParsedDocument {
    /// Create a new parsed document
    pub fn new(file_name: impl Into<String>, file_type: FileType) -> Self {
        Self {
            file_name: file_name.into(),
            file_type,
            content: String::new(),
            form_fields: Vec::new(),
            page_count: None,
        }
    }

    /// Set content
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Add a form field
    pub fn add_form_field(&mut self, field: FormField) {
        self.form_fields.push(field);
    }

    /// Get total word count (approximate)
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }
}

/// A "label: value" pair from a form or a two-column table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub label: String,
    pub value: String,
    pub page: Option<u32>,
}

impl FormField {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            page: None,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }
}

/// Supported file types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Pdf,
    Docx,
    PlainText,
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "txt" | "text" => Self::PlainText,
            _ => Self::Unknown,
        }
    }

    /// Detect file type from a MIME type
    pub fn from_mime(mime: &str) -> Self {
        match mime.split(';').next().unwrap_or_default().trim() {
            "application/pdf" => Self::Pdf,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Self::Docx
            }
            "text/plain" => Self::PlainText,
            _ => Self::Unknown,
        }
    }

    /// Detect file type from a file name
    pub fn from_name(name: &str) -> Self {
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }

    /// Detect from MIME type first, then from the file name
    pub fn detect(name: &str, mime: Option<&str>) -> Self {
        match mime.map(Self::from_mime) {
            Some(file_type) if file_type != Self::Unknown => file_type,
            _ => Self::from_name(name),
        }
    }

    /// Get MIME type
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            Self::PlainText => "text/plain",
            Self::Unknown => "application/octet-stream",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pdf => write!(f, "pdf"),
            Self::Docx => write!(f, "docx"),
            Self::PlainText => write!(f, "text"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ============================================================================
// Parser Trait
// ============================================================================

/// Trait for document parsers
pub trait DocumentParser: Send + Sync {
    /// Parse a document already loaded into memory
    fn parse_bytes(&self, name: &str, bytes: &[u8]) -> Result<ParsedDocument>;

    /// Get supported file types
    fn supported_types(&self) -> &[FileType];

    /// Parse a document from a file path
    fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let bytes = std::fs::read(path).map_err(|e| ParserError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        self.parse_bytes(name, &bytes)
    }

    /// Check if this parser can handle a file type
    fn can_parse(&self, file_type: FileType) -> bool {
        self.supported_types().contains(&file_type)
    }
}

// ============================================================================
// Form Field Detection
// ============================================================================

const MAX_LABEL_CHARS: usize = 40;

/// Find "Label: value" lines in free-flowing document text
///
/// Pages are counted by form feed characters, which is how pdf-extract
/// separates pages.
pub fn detect_form_fields(text: &str) -> Vec<FormField> {
    let mut fields = Vec::new();
    let mut page = 1u32;

    for line in text.lines() {
        page += line.matches('\x0C').count() as u32;
        let line = line.trim_matches(|c: char| c.is_whitespace() || c == '\x0C');

        if let Some((label, value)) = split_label_value(line) {
            fields.push(FormField::new(label, value).with_page(page));
        }
    }

    fields
}

fn split_label_value(line: &str) -> Option<(&str, &str)> {
    let (label, value) = line.split_once(':')?;
    let label = label.trim();
    let value = value.trim();

    // "https://..." is a URL, not a label
    if value.is_empty() || value.starts_with("//") {
        return None;
    }
    if label.is_empty() || label.chars().count() > MAX_LABEL_CHARS {
        return None;
    }
    if !label.starts_with(|c: char| c.is_alphabetic()) || label.contains('@') {
        return None;
    }
    if label.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    Some((label, value))
}

// ============================================================================
// Parser Registry
// ============================================================================

/// Registry of available parsers
pub struct ParserRegistry {
    parsers: Vec<Box<dyn DocumentParser>>,
}

impl ParserRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// Registry with the PDF, DOCX and plain-text parsers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(PdfParser::new());
        registry.register(DocxParser::new());
        registry.register(PlainTextParser);
        registry
    }

    /// Register a parser
    pub fn register<P: DocumentParser + 'static>(&mut self, parser: P) {
        self.parsers.push(Box::new(parser));
    }

    /// Find a parser for a file type
    pub fn find_parser(&self, file_type: FileType) -> Option<&dyn DocumentParser> {
        self.parsers
            .iter()
            .find(|p| p.can_parse(file_type))
            .map(|p| p.as_ref())
    }

    /// Parse an in-memory attachment using the appropriate parser
    pub fn parse_bytes(
        &self,
        name: &str,
        mime: Option<&str>,
        bytes: &[u8],
    ) -> Result<ParsedDocument> {
        let file_type = FileType::detect(name, mime);

        if file_type == FileType::Unknown {
            return Err(ParserError::UnsupportedFormat(
                mime.map(str::to_string).unwrap_or_else(|| name.to_string()),
            ));
        }

        let parser = self
            .find_parser(file_type)
            .ok_or_else(|| ParserError::UnsupportedFormat(file_type.to_string()))?;

        tracing::debug!("Parsing {} as {}", name, file_type);
        parser.parse_bytes(name, bytes)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ============================================================================
// Plain Text Parser
// ============================================================================

/// Plain text parser
pub struct PlainTextParser;

impl DocumentParser for PlainTextParser {
    fn parse_bytes(&self, name: &str, bytes: &[u8]) -> Result<ParsedDocument> {
        let content = std::str::from_utf8(bytes)
            .map_err(|e| ParserError::EncodingError(format!("{name}: {e}")))?;

        let mut doc = ParsedDocument::new(name, FileType::PlainText).with_content(content);
        doc.form_fields = detect_form_fields(content);
        Ok(doc)
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::PlainText]
    }
}

// ============================================================================
// Tests
// ============================================================================
