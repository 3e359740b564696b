//! CDP OCR - Optical Character Recognition capability
//!
//! The pipeline treats recognition as an external capability behind the
//! narrow [`OcrEngine`] interface. A Tesseract command-line backend is
//! provided; other backends plug in by implementing the trait.

use std::io::Write;
use std::process::{Command, Stdio};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("OCR engine not available: {0}")]
    EngineNotAvailable(String),

    #[error("Image is empty: {0}")]
    EmptyImage(String),

    #[error("OCR execution failed: {0}")]
    ExecutionFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OcrError>;

/// OCR result for a single image
#[derive(Debug, Clone, PartialEq)]
pub struct OcrResult {
    /// Recognized text, one line per recognized line
    pub text: String,
    /// Mean word confidence (0.0 - 1.0)
    pub confidence: f32,
    /// Language codes used for recognition
    pub language: Option<String>,
}

impl OcrResult {
    /// Create a new OCR result
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: 1.0,
            language: None,
        }
    }

    /// Set confidence score
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Set language
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Trait for OCR engines
pub trait OcrEngine: Send + Sync {
    /// Recognize text in an encoded image (PNG, JPEG, TIFF, ...)
    fn recognize(&self, name: &str, image: &[u8]) -> Result<OcrResult>;

    /// Check if the engine is available on the system
    fn is_available(&self) -> bool;

    /// Get the engine name
    fn name(&self) -> &str;
}

// ============================================================================
// Tesseract OCR Engine
// ============================================================================

/// Tesseract OCR engine configuration
#[derive(Debug, Clone)]
pub struct TesseractConfig {
    /// Language code(s) for OCR (e.g., "eng", "deu", "deu+eng")
    pub language: String,
    /// Page segmentation mode (PSM)
    pub psm: Option<u8>,
    /// Path to tesseract executable
    pub executable_path: Option<String>,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            language: "deu+eng".to_string(),
            // Sparse text: flyers and screenshots rarely have page layout
            psm: Some(11),
            executable_path: None,
        }
    }
}

impl TesseractConfig {
    /// Set language
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Set page segmentation mode
    pub fn with_psm(mut self, psm: u8) -> Self {
        self.psm = Some(psm);
        self
    }

    /// Set executable path
    pub fn with_executable(mut self, path: impl Into<String>) -> Self {
        self.executable_path = Some(path.into());
        self
    }
}

/// Tesseract OCR engine wrapper
///
/// Feeds the image through stdin and reads word-level TSV from stdout so
/// that a real mean confidence can be reported.
pub struct TesseractEngine {
    config: TesseractConfig,
}

impl TesseractEngine {
    /// Create a new Tesseract engine with default config
    pub fn new() -> Self {
        Self {
            config: TesseractConfig::default(),
        }
    }

    /// Create with custom config
    pub fn with_config(config: TesseractConfig) -> Self {
        Self { config }
    }

    fn executable(&self) -> &str {
        self.config
            .executable_path
            .as_deref()
            .unwrap_or("tesseract")
    }

    fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.config.language.clone(),
        ];

        if let Some(psm) = self.config.psm {
            args.push("--psm".to_string());
            args.push(psm.to_string());
        }

        args.push("tsv".to_string());
        args
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, name: &str, image: &[u8]) -> Result<OcrResult> {
        if image.is_empty() {
            return Err(OcrError::EmptyImage(name.to_string()));
        }

        let mut child = Command::new(self.executable())
            .args(self.build_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| OcrError::EngineNotAvailable(format!("{}: {e}", self.executable())))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(image)?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::ExecutionFailed(format!(
                "Tesseract failed on {name}: {}",
                stderr.trim()
            )));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let (text, confidence) = parse_tsv(&tsv);
        tracing::debug!(
            "Tesseract recognized {} chars in {} (confidence {:.2})",
            text.len(),
            name,
            confidence
        );

        Ok(OcrResult::new(text)
            .with_confidence(confidence)
            .with_language(self.config.language.clone()))
    }

    fn is_available(&self) -> bool {
        Command::new(self.executable())
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

/// Rebuild text lines and the mean word confidence from Tesseract TSV
///
/// Columns: level page block par line word left top width height conf text.
/// Rows with `conf < 0` are layout rows, not words.
fn parse_tsv(tsv: &str) -> (String, f32) {
    let mut lines: Vec<String> = Vec::new();
    let mut current_key: Option<(u32, u32, u32, u32)> = None;
    let mut conf_sum = 0.0f32;
    let mut word_count = 0usize;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }

        let conf: f32 = cols[10].trim().parse().unwrap_or(-1.0);
        let word = cols[11].trim();
        if conf < 0.0 || word.is_empty() {
            continue;
        }

        let num = |i: usize| cols[i].trim().parse::<u32>().unwrap_or(0);
        let key = (num(1), num(2), num(3), num(4));

        if current_key != Some(key) {
            lines.push(String::new());
            current_key = Some(key);
        }
        if let Some(line) = lines.last_mut() {
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }

        conf_sum += conf;
        word_count += 1;
    }

    let confidence = if word_count == 0 {
        0.0
    } else {
        (conf_sum / word_count as f32 / 100.0).clamp(0.0, 1.0)
    };

    (lines.join("\n"), confidence)
}

// ============================================================================
// OCR Manager
// ============================================================================

/// OCR manager that handles multiple engines
pub struct OcrManager {
    engines: Vec<Box<dyn OcrEngine>>,
}

impl OcrManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self {
            engines: Vec::new(),
        }
    }

    /// Create a manager with Tesseract registered when it is installed
    pub fn detect(config: TesseractConfig) -> Self {
        let mut manager = Self::new();

        let tesseract = TesseractEngine::with_config(config);
        if tesseract.is_available() {
            manager.register(tesseract);
        } else {
            tracing::warn!("Tesseract not found; image extraction disabled");
        }

        manager
    }

    /// Register an OCR engine
    pub fn register<E: OcrEngine + 'static>(&mut self, engine: E) {
        self.engines.push(Box::new(engine));
    }

    /// Check if any OCR engine is available
    pub fn is_available(&self) -> bool {
        !self.engines.is_empty()
    }

    /// Get available engines
    pub fn available_engines(&self) -> Vec<&str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    /// Recognize text using the first engine that succeeds
    pub fn recognize(&self, name: &str, image: &[u8]) -> Result<OcrResult> {
        let mut last_error = None;

        for engine in &self.engines {
            match engine.recognize(name, image) {
                Ok(result) => return Ok(result),
                Err(e) => {
                    tracing::warn!("OCR engine {} failed on {}: {}", engine.name(), name, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            OcrError::EngineNotAvailable("No OCR engines available".to_string())
        }))
    }
}

impl Default for OcrManager {
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

    struct FixedEngine(&'static str);

    impl OcrEngine for FixedEngine {
        fn recognize(&self, _name: &str, _image: &[u8]) -> Result<OcrResult> {
            Ok(OcrResult::new(self.0).with_confidence(0.8))
        }

        fn is_available(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct BrokenEngine;

    impl OcrEngine for BrokenEngine {
        fn recognize(&self, _name: &str, _image: &[u8]) -> Result<OcrResult> {
            Err(OcrError::ExecutionFailed("boom".to_string()))
        }

        fn is_available(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    #[test]
    fn test_ocr_result_builder() {
        let result = OcrResult::new("Tel 0176")
            .with_confidence(1.4)
            .with_language("deu");

        assert_eq!(result.text, "Tel 0176");
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.language, Some("deu".to_string()));
    }

    #[test]
    fn test_tesseract_args() {
        let engine = TesseractEngine::with_config(
            TesseractConfig::default().with_language("eng").with_psm(6),
        );
        assert_eq!(
            engine.build_args(),
            vec!["stdin", "stdout", "-l", "eng", "--psm", "6", "tsv"]
        );
        assert_eq!(engine.name(), "tesseract");
    }

    #[test]
    fn test_parse_tsv() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
                   1\t1\t0\t0\t0\t0\t0\t0\t100\t100\t-1\t\n\
                   5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t90\tTel.\n\
                   5\t1\t1\t1\t1\t2\t0\t0\t10\t10\t80\t0176\n\
                   5\t1\t1\t1\t2\t1\t0\t0\t10\t10\t70\tinfo@example.de\n";

        let (text, confidence) = parse_tsv(tsv);
        assert_eq!(text, "Tel. 0176\ninfo@example.de");
        assert!((confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_parse_tsv_empty() {
        let (text, confidence) = parse_tsv("");
        assert!(text.is_empty());
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn test_manager_falls_through_failing_engine() {
        let mut manager = OcrManager::new();
        manager.register(BrokenEngine);
        manager.register(FixedEngine("Kontakt: 030 1234567"));

        assert_eq!(manager.available_engines(), vec!["broken", "fixed"]);
        let result = manager.recognize("flyer.png", b"png").unwrap();
        assert_eq!(result.text, "Kontakt: 030 1234567");
    }

    #[test]
    fn test_empty_manager_errors() {
        let manager = OcrManager::new();
        assert!(!manager.is_available());
        assert!(matches!(
            manager.recognize("flyer.png", b"png"),
            Err(OcrError::EngineNotAvailable(_))
        ));
    }
}
