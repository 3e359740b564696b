//! CDP Configuration Management
//!
//! Every pipeline option is a plain key/value setting with a documented
//! default. Settings can come from a TOML file, from `CDP_*` environment
//! variables, or from individual `section.key=value` overrides.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ContactType, ExtractionMethod, ResolutionStrategy};

/// Main pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Extractor selection and worker pool sizing
    pub extraction: ExtractionConfig,

    /// Country settings for phone normalization
    pub normalization: NormalizationConfig,

    /// Validity thresholds and reality checks
    pub validation: ValidationConfig,

    /// Quality dimension weights
    pub quality: QualityConfig,

    /// Blocking and similarity thresholds
    pub dedup: DedupConfig,

    /// Cluster resolution policy
    pub resolution: ResolutionConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Environment variable prefix for all settings
const ENV_PREFIX: &str = "CDP_";

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// `CDP_DEDUP_SIMILARITY_THRESHOLD=0.85` maps to `dedup.similarity_threshold`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        let mut vars: Vec<(String, String)> = std::env::vars()
            .filter(|(k, _)| k.starts_with(ENV_PREFIX))
            .collect();
        vars.sort();

        for (name, value) in vars {
            if let Some(key) = env_to_key(&name) {
                self.apply_setting(&key, &value)?;
            }
        }
        self.validate()
    }

    /// Apply one `section.key` setting
    pub fn apply_setting(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        let float = || value.trim().parse::<f32>().map_err(|_| invalid());
        let uint = || value.trim().parse::<u64>().map_err(|_| invalid());
        let flag = || parse_bool(value).ok_or_else(invalid);

        match key {
            "extraction.enabled_methods" => {
                self.extraction.enabled_methods = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::parse::<ExtractionMethod>)
                    .collect::<Result<Vec<_>, _>>()?;
            }
            "extraction.max_concurrency" => self.extraction.max_concurrency = uint()? as usize,
            "extraction.ocr_max_concurrency" => {
                self.extraction.ocr_max_concurrency = uint()? as usize
            }
            "extraction.context_window" => self.extraction.context_window = uint()? as usize,
            "extraction.ocr_language" => self.extraction.ocr_language = value.trim().to_string(),

            "normalization.default_country_code" => {
                let code = value.trim().trim_start_matches('+');
                self.normalization.default_country_code = if code.is_empty() {
                    None
                } else if code.chars().all(|c| c.is_ascii_digit()) {
                    Some(code.to_string())
                } else {
                    return Err(invalid());
                };
            }
            "normalization.trunk_prefix" => {
                self.normalization.trunk_prefix = value.trim().to_string()
            }

            "validation.phone_min_confidence" => self.validation.phone_min_confidence = float()?,
            "validation.email_min_confidence" => self.validation.email_min_confidence = float()?,
            "validation.website_min_confidence" => {
                self.validation.website_min_confidence = float()?
            }
            "validation.name_min_confidence" => self.validation.name_min_confidence = float()?,
            "validation.name_min_length" => self.validation.name_min_length = uint()? as usize,
            "validation.reality_checks_enabled" => {
                self.validation.reality_checks_enabled = flag()?
            }
            "validation.dns_check_enabled" => self.validation.dns_check_enabled = flag()?,
            "validation.http_check_enabled" => self.validation.http_check_enabled = flag()?,
            "validation.dns_timeout_ms" => self.validation.dns_timeout_ms = uint()?,
            "validation.http_timeout_ms" => self.validation.http_timeout_ms = uint()?,
            "validation.max_concurrent_checks" => {
                self.validation.max_concurrent_checks = uint()? as usize
            }
            "validation.extra_disposable_domains" => {
                self.validation.extra_disposable_domains = value
                    .split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect();
            }

            "quality.weight_completeness" => self.quality.weights.completeness = float()?,
            "quality.weight_accuracy" => self.quality.weights.accuracy = float()?,
            "quality.weight_confidence" => self.quality.weights.confidence = float()?,
            "quality.weight_freshness" => self.quality.weights.freshness = float()?,
            "quality.weight_relevance" => self.quality.weights.relevance = float()?,
            "quality.review_threshold" => self.quality.review_threshold = float()?,

            "dedup.similarity_threshold" => self.dedup.similarity_threshold = float()?,
            "dedup.high_similarity_threshold" => self.dedup.high_similarity_threshold = float()?,
            "dedup.phone_prefix_len" => self.dedup.phone_prefix_len = uint()? as usize,
            "dedup.max_block_size" => self.dedup.max_block_size = uint()? as usize,
            "dedup.exclude_invalid" => self.dedup.exclude_invalid = flag()?,

            "resolution.strategy" => self.resolution.strategy = value.parse()?,
            "resolution.max_conflicts" => self.resolution.max_conflicts = uint()? as usize,

            "logging.level" => self.logging.level = value.trim().to_string(),
            "logging.json_format" => self.logging.json_format = flag()?,
            "logging.include_location" => self.logging.include_location = flag()?,

            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }

        Ok(())
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = |key: &str, v: f32| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: v.to_string(),
                })
            }
        };

        unit("validation.phone_min_confidence", self.validation.phone_min_confidence)?;
        unit("validation.email_min_confidence", self.validation.email_min_confidence)?;
        unit("validation.website_min_confidence", self.validation.website_min_confidence)?;
        unit("validation.name_min_confidence", self.validation.name_min_confidence)?;
        unit("quality.review_threshold", self.quality.review_threshold)?;
        unit("dedup.similarity_threshold", self.dedup.similarity_threshold)?;
        unit("dedup.high_similarity_threshold", self.dedup.high_similarity_threshold)?;

        let w = &self.quality.weights;
        for (key, v) in [
            ("quality.weight_completeness", w.completeness),
            ("quality.weight_accuracy", w.accuracy),
            ("quality.weight_confidence", w.confidence),
            ("quality.weight_freshness", w.freshness),
            ("quality.weight_relevance", w.relevance),
        ] {
            unit(key, v)?;
        }

        if self.dedup.high_similarity_threshold < self.dedup.similarity_threshold {
            return Err(ConfigError::InvalidValue {
                key: "dedup.high_similarity_threshold".to_string(),
                value: format!(
                    "{} (below similarity_threshold {})",
                    self.dedup.high_similarity_threshold, self.dedup.similarity_threshold
                ),
            });
        }

        if self.extraction.max_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "extraction.max_concurrency".to_string(),
                value: "0".to_string(),
            });
        }
        if self.extraction.ocr_max_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "extraction.ocr_max_concurrency".to_string(),
                value: "0".to_string(),
            });
        }
        if self.validation.max_concurrent_checks == 0 {
            return Err(ConfigError::InvalidValue {
                key: "validation.max_concurrent_checks".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(())
    }
}

/// `CDP_DEDUP_MAX_BLOCK_SIZE` -> `dedup.max_block_size`
fn env_to_key(name: &str) -> Option<String> {
    let rest = name.strip_prefix(ENV_PREFIX)?.to_lowercase();
    let (section, key) = rest.split_once('_')?;
    Some(format!("{section}.{key}"))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Extraction methods allowed to produce candidates
    pub enabled_methods: Vec<ExtractionMethod>,

    /// Maximum extractor invocations running at once
    pub max_concurrency: usize,

    /// Maximum concurrent OCR invocations (backend rate limit)
    pub ocr_max_concurrency: usize,

    /// Characters of surrounding text kept as context
    pub context_window: usize,

    /// Language code(s) handed to the OCR backend
    pub ocr_language: String,
}

impl ExtractionConfig {
    pub fn is_enabled(&self, method: ExtractionMethod) -> bool {
        self.enabled_methods.contains(&method)
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled_methods: ExtractionMethod::ALL.to_vec(),
            max_concurrency: 8,
            ocr_max_concurrency: 2,
            context_window: 40,
            ocr_language: "deu+eng".to_string(),
        }
    }
}

/// Phone normalization configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Country calling code assumed for national numbers (digits only)
    pub default_country_code: Option<String>,

    /// National trunk prefix rewritten to the international form
    pub trunk_prefix: String,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            default_country_code: Some("49".to_string()),
            trunk_prefix: "0".to_string(),
        }
    }
}

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Minimum extraction confidence for a phone to count as valid
    pub phone_min_confidence: f32,

    /// Minimum extraction confidence for an email to count as valid
    pub email_min_confidence: f32,

    /// Minimum extraction confidence for a website to count as valid
    pub website_min_confidence: f32,

    /// Minimum extraction confidence for a name to count as valid
    pub name_min_confidence: f32,

    /// Minimum name length in characters
    pub name_min_length: usize,

    /// Run external reality checks at all
    pub reality_checks_enabled: bool,

    /// Email domain resolvability check
    pub dns_check_enabled: bool,

    /// Website reachability check
    pub http_check_enabled: bool,

    /// Timeout for one DNS lookup
    pub dns_timeout_ms: u64,

    /// Timeout for one HTTP probe
    pub http_timeout_ms: u64,

    /// Maximum reality checks in flight
    pub max_concurrent_checks: usize,

    /// Disposable mail domains in addition to the built-in list
    pub extra_disposable_domains: Vec<String>,
}

impl ValidationConfig {
    /// Per-type validity threshold
    pub fn min_confidence(&self, contact_type: ContactType) -> f32 {
        match contact_type {
            ContactType::Phone => self.phone_min_confidence,
            ContactType::Email => self.email_min_confidence,
            ContactType::Website => self.website_min_confidence,
            ContactType::Name => self.name_min_confidence,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            phone_min_confidence: 0.0,
            email_min_confidence: 0.0,
            website_min_confidence: 0.0,
            name_min_confidence: 0.0,
            name_min_length: 2,
            reality_checks_enabled: false,
            dns_check_enabled: true,
            http_check_enabled: true,
            dns_timeout_ms: 2000,
            http_timeout_ms: 3000,
            max_concurrent_checks: 16,
            extra_disposable_domains: Vec::new(),
        }
    }
}

/// Quality scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualityConfig {
    pub weights: QualityWeights,

    /// Batches with a mean score below this are flagged for review
    pub review_threshold: f32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            weights: QualityWeights::default(),
            review_threshold: 0.5,
        }
    }
}

/// Weights of the five quality dimensions in the overall score
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualityWeights {
    pub completeness: f32,
    pub accuracy: f32,
    pub confidence: f32,
    pub freshness: f32,
    pub relevance: f32,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            completeness: 0.3,
            accuracy: 0.3,
            confidence: 0.2,
            freshness: 0.1,
            relevance: 0.1,
        }
    }
}

/// Duplicate detection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DedupConfig {
    /// Minimum similarity for a pair to match
    pub similarity_threshold: f32,

    /// Minimum similarity for a high-similarity match
    pub high_similarity_threshold: f32,

    /// Digits after `+` used for the phone prefix blocking key
    pub phone_prefix_len: usize,

    /// Fuzzy blocks larger than this are not compared pairwise
    pub max_block_size: usize,

    /// Also keep candidates that failed a business rule out of clustering;
    /// malformed candidates are always kept out
    pub exclude_invalid: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
            high_similarity_threshold: 0.9,
            phone_prefix_len: 5,
            max_block_size: 500,
            exclude_invalid: false,
        }
    }
}

/// Resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResolutionConfig {
    pub strategy: ResolutionStrategy,

    /// Merge conflicts tolerated before a cluster is escalated
    pub max_conflicts: usize,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            strategy: ResolutionStrategy::KeepBest,
            max_conflicts: 2,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.dedup.similarity_threshold, 0.8);
        assert_eq!(config.resolution.max_conflicts, 2);
        assert_eq!(config.resolution.strategy, ResolutionStrategy::KeepBest);
        assert_eq!(config.extraction.enabled_methods.len(), 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_setting() {
        let mut config = PipelineConfig::default();
        config.apply_setting("dedup.similarity_threshold", "0.85").unwrap();
        config.apply_setting("resolution.strategy", "merge").unwrap();
        config
            .apply_setting("extraction.enabled_methods", "ocr, free_text")
            .unwrap();
        config
            .apply_setting("validation.reality_checks_enabled", "yes")
            .unwrap();

        assert_eq!(config.dedup.similarity_threshold, 0.85);
        assert_eq!(config.resolution.strategy, ResolutionStrategy::Merge);
        assert_eq!(
            config.extraction.enabled_methods,
            vec![ExtractionMethod::Ocr, ExtractionMethod::FreeText]
        );
        assert!(config.validation.reality_checks_enabled);
    }

    #[test]
    fn test_apply_setting_rejects_bad_input() {
        let mut config = PipelineConfig::default();
        assert!(config.apply_setting("dedup.similarity_threshold", "high").is_err());
        assert!(matches!(
            config.apply_setting("dedup.nonsense", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(config
            .apply_setting("normalization.default_country_code", "de")
            .is_err());
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = PipelineConfig::default();
        config.dedup.similarity_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.dedup.high_similarity_threshold = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_key_mapping() {
        assert_eq!(
            env_to_key("CDP_DEDUP_MAX_BLOCK_SIZE").as_deref(),
            Some("dedup.max_block_size")
        );
        assert_eq!(env_to_key("PATH"), None);
    }

    #[test]
    fn test_toml_roundtrip() {
        let toml_text = r#"
            [dedup]
            similarity_threshold = 0.75

            [resolution]
            strategy = "keep_newest"
        "#;
        let config: PipelineConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(config.dedup.similarity_threshold, 0.75);
        assert_eq!(config.dedup.max_block_size, 500);
        assert_eq!(config.resolution.strategy, ResolutionStrategy::KeepNewest);

        let rendered = toml::to_string(&config).unwrap();
        let back: PipelineConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(back, config);
    }
}
