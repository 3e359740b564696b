//! CDP Core - Domain models, errors, and shared types
//!
//! This crate defines the core abstractions used throughout the contact
//! discovery pipeline:
//! - Listing payloads handed over by the crawler
//! - Candidate contacts and their lifecycle fields
//! - Duplicate matches, clusters, and resolution results
//! - Common error types
//! - Configuration management
//! - The contact value normalizer

pub mod config;
pub mod normalize;

pub use config::{
    ConfigError, DedupConfig, ExtractionConfig, LoggingConfig, NormalizationConfig,
    PipelineConfig, QualityConfig, QualityWeights, ResolutionConfig, ValidationConfig,
};
pub use normalize::{normalize, Normalizer};

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for pipeline operations
#[derive(Error, Debug)]
pub enum CdpError {
    #[error("Extraction failed in {extractor} for listing {listing_id}: {message}")]
    ExtractionFailure {
        extractor: String,
        listing_id: String,
        message: String,
    },

    #[error("Validation degraded for candidate {candidate_id}: {reason}")]
    ValidationDegradation { candidate_id: Uuid, reason: String },

    #[error("Malformed candidate {0}: missing required value")]
    MalformedCandidate(Uuid),

    #[error("Cluster {cluster_id} has {conflicts} merge conflicts")]
    ClusterAmbiguity { cluster_id: Uuid, conflicts: usize },

    #[error("Contract violation: {0}")]
    ContractViolation(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Batch run cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ConfigError> for CdpError {
    fn from(e: ConfigError) -> Self {
        Self::ConfigError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CdpError>;

// ============================================================================
// Contact Classification
// ============================================================================

/// Kind of contact signal carried by a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactType {
    Phone,
    Email,
    Website,
    Name,
}

impl ContactType {
    pub const ALL: [ContactType; 4] = [Self::Phone, Self::Email, Self::Website, Self::Name];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::Email => "email",
            Self::Website => "website",
            Self::Name => "name",
        }
    }
}

impl std::fmt::Display for ContactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContactType {
    type Err = CdpError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "phone" => Ok(Self::Phone),
            "email" => Ok(Self::Email),
            "website" => Ok(Self::Website),
            "name" => Ok(Self::Name),
            other => Err(CdpError::ContractViolation(format!(
                "unknown contact type: {other}"
            ))),
        }
    }
}

/// Which extractor produced a candidate
///
/// Ordered from most to least reliable source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Field of a structured API payload
    StructuredApi,
    /// `mailto:` / `tel:` link in listing HTML
    HtmlLink,
    /// Labelled field of an attached document
    DocumentForm,
    /// Running text of an attached document
    DocumentText,
    /// Optical recognition over an attached image
    Ocr,
    /// Pattern match over free listing text
    FreeText,
}

impl ExtractionMethod {
    pub const ALL: [ExtractionMethod; 6] = [
        Self::StructuredApi,
        Self::HtmlLink,
        Self::DocumentForm,
        Self::DocumentText,
        Self::Ocr,
        Self::FreeText,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StructuredApi => "structured_api",
            Self::HtmlLink => "html_link",
            Self::DocumentForm => "document_form",
            Self::DocumentText => "document_text",
            Self::Ocr => "ocr",
            Self::FreeText => "free_text",
        }
    }

    /// Reliability multiplier applied to extraction confidence when scoring
    pub fn reliability(&self) -> f32 {
        match self {
            Self::StructuredApi => 1.0,
            Self::HtmlLink => 0.95,
            Self::DocumentForm => 0.9,
            Self::DocumentText => 0.8,
            Self::Ocr => 0.7,
            Self::FreeText => 0.6,
        }
    }
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExtractionMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "extraction.enabled_methods".to_string(),
                value: s.to_string(),
            })
    }
}

/// Outcome of the validator for a candidate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    #[default]
    Pending,
    Valid,
    Invalid,
    Uncertain,
}

impl ValidationStatus {
    /// Preference rank used when merging: valid > uncertain > invalid > pending
    pub fn rank(&self) -> u8 {
        match self {
            Self::Valid => 3,
            Self::Uncertain => 2,
            Self::Invalid => 1,
            Self::Pending => 0,
        }
    }
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Valid => write!(f, "valid"),
            Self::Invalid => write!(f, "invalid"),
            Self::Uncertain => write!(f, "uncertain"),
        }
    }
}

// ============================================================================
// Candidate Contacts
// ============================================================================

/// Stable identifier of a candidate, assigned at extraction time
pub type CandidateId = Uuid;

/// One extracted, not yet deduplicated contact signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateContact {
    pub id: CandidateId,

    /// Fixed at creation
    pub contact_type: ContactType,

    pub raw_value: String,

    /// Filled by the normalizer stage
    #[serde(default)]
    pub normalized_value: String,

    /// Extraction confidence in [0, 1]
    pub confidence: f32,

    pub extraction_method: ExtractionMethod,

    /// Surrounding snippet, field name, or form label
    #[serde(default)]
    pub context: String,

    /// Back-reference to the listing the signal was found on
    pub source_listing_id: String,

    #[serde(default)]
    pub validation_status: ValidationStatus,

    /// Absent only for records handed back by storage without one
    #[serde(default)]
    pub extraction_timestamp: Option<DateTime<Utc>>,
}

impl CandidateContact {
    /// Create a new candidate stamped with the current time
    pub fn new(
        contact_type: ContactType,
        raw_value: impl Into<String>,
        extraction_method: ExtractionMethod,
        confidence: f32,
        source_listing_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            contact_type,
            raw_value: raw_value.into(),
            normalized_value: String::new(),
            confidence: confidence.clamp(0.0, 1.0),
            extraction_method,
            context: String::new(),
            source_listing_id: source_listing_id.into(),
            validation_status: ValidationStatus::Pending,
            extraction_timestamp: Some(Utc::now()),
        }
    }

    /// Set context snippet
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Override the identifier
    pub fn with_id(mut self, id: CandidateId) -> Self {
        self.id = id;
        self
    }

    /// Override the extraction timestamp
    pub fn with_timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.extraction_timestamp = timestamp;
        self
    }

    /// A candidate without a primary value cannot be validated or clustered
    pub fn is_malformed(&self) -> bool {
        self.raw_value.trim().is_empty()
    }

    /// Apply a confidence delta, keeping the result within [0, 1]
    pub fn adjust_confidence(&mut self, delta: f32) {
        self.confidence = (self.confidence + delta).clamp(0.0, 1.0);
    }
}

/// An extractor invocation that produced no candidates because it failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionFailure {
    pub extractor: String,
    pub listing_id: String,
    pub message: String,
}

impl From<&ExtractionFailure> for CdpError {
    fn from(f: &ExtractionFailure) -> Self {
        CdpError::ExtractionFailure {
            extractor: f.extractor.clone(),
            listing_id: f.listing_id.clone(),
            message: f.message.clone(),
        }
    }
}

// ============================================================================
// Listing Payloads
// ============================================================================

/// Raw listing as supplied by the crawler collaborator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingPayload {
    pub listing_id: String,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Page markup, when the crawler kept it
    #[serde(default)]
    pub html: Option<String>,

    /// Structured payload from a listing API
    #[serde(default)]
    pub structured: Option<serde_json::Value>,

    #[serde(default)]
    pub images: Vec<Attachment>,

    #[serde(default)]
    pub documents: Vec<Attachment>,

    #[serde(default)]
    pub fetched_at: Option<DateTime<Utc>>,
}

impl ListingPayload {
    /// Create an empty listing payload
    pub fn new(listing_id: impl Into<String>) -> Self {
        Self {
            listing_id: listing_id.into(),
            ..Default::default()
        }
    }

    /// Set title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set free-text description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set page markup
    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Set structured payload
    pub fn with_structured(mut self, value: serde_json::Value) -> Self {
        self.structured = Some(value);
        self
    }

    /// Attach an image
    pub fn with_image(mut self, attachment: Attachment) -> Self {
        self.images.push(attachment);
        self
    }

    /// Attach a document
    pub fn with_document(mut self, attachment: Attachment) -> Self {
        self.documents.push(attachment);
        self
    }
}

/// Image or document fetched alongside a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// File name (used for type detection)
    pub name: String,

    #[serde(default)]
    pub mime_type: Option<String>,

    pub source: AttachmentSource,
}

impl Attachment {
    /// Attachment held in memory
    pub fn inline(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: None,
            source: AttachmentSource::Inline(bytes),
        }
    }

    /// Attachment stored on local disk
    pub fn path(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            mime_type: None,
            source: AttachmentSource::Path(path.into()),
        }
    }

    /// Read the attachment content
    pub fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        match &self.source {
            AttachmentSource::Inline(bytes) => Ok(bytes.clone()),
            AttachmentSource::Path(path) => std::fs::read(path),
        }
    }
}

/// Where attachment bytes live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentSource {
    Path(PathBuf),
    #[serde(with = "base64_bytes")]
    Inline(Vec<u8>),
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Duplicate Detection Types
// ============================================================================

/// Strength of a duplicate match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    HighSimilarity,
    MediumSimilarity,
}

/// Symmetric relation between two candidates
///
/// The pair is stored with `candidate_a_id < candidate_b_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateMatch {
    pub candidate_a_id: CandidateId,
    pub candidate_b_id: CandidateId,
    pub similarity_score: f32,
    pub match_type: MatchType,
}

impl DuplicateMatch {
    /// Create a match for an unordered pair; `None` for a self-match
    pub fn new(
        a: CandidateId,
        b: CandidateId,
        similarity_score: f32,
        match_type: MatchType,
    ) -> Option<Self> {
        if a == b {
            return None;
        }
        let (candidate_a_id, candidate_b_id) = if a < b { (a, b) } else { (b, a) };
        Some(Self {
            candidate_a_id,
            candidate_b_id,
            similarity_score: similarity_score.clamp(0.0, 1.0),
            match_type,
        })
    }

    /// Ordered key of the pair
    pub fn pair(&self) -> (CandidateId, CandidateId) {
        (self.candidate_a_id, self.candidate_b_id)
    }
}

/// Connected component of candidates linked by matches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCluster {
    /// Smallest member id
    pub id: CandidateId,

    /// Members in ascending id order
    pub members: Vec<CandidateId>,

    /// Matches whose endpoints both lie in this cluster
    pub matches: Vec<DuplicateMatch>,
}

impl DuplicateCluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }
}

// ============================================================================
// Resolution Types
// ============================================================================

/// Policy used to collapse a cluster into one canonical record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    #[default]
    KeepBest,
    Merge,
    KeepNewest,
    KeepOldest,
    ManualReview,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeepBest => "keep_best",
            Self::Merge => "merge",
            Self::KeepNewest => "keep_newest",
            Self::KeepOldest => "keep_oldest",
            Self::ManualReview => "manual_review",
        }
    }
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResolutionStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "keep_best" => Ok(Self::KeepBest),
            "merge" => Ok(Self::Merge),
            "keep_newest" => Ok(Self::KeepNewest),
            "keep_oldest" => Ok(Self::KeepOldest),
            "manual_review" => Ok(Self::ManualReview),
            _ => Err(ConfigError::InvalidValue {
                key: "resolution.strategy".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Candidate field compared when looking for conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictField {
    RawValue,
    NormalizedValue,
    Confidence,
    ExtractionMethod,
    Context,
    SourceListingId,
    ValidationStatus,
    ExtractionTimestamp,
}

impl ConflictField {
    pub const ALL: [ConflictField; 8] = [
        Self::RawValue,
        Self::NormalizedValue,
        Self::Confidence,
        Self::ExtractionMethod,
        Self::Context,
        Self::SourceListingId,
        Self::ValidationStatus,
        Self::ExtractionTimestamp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RawValue => "raw_value",
            Self::NormalizedValue => "normalized_value",
            Self::Confidence => "confidence",
            Self::ExtractionMethod => "extraction_method",
            Self::Context => "context",
            Self::SourceListingId => "source_listing_id",
            Self::ValidationStatus => "validation_status",
            Self::ExtractionTimestamp => "extraction_timestamp",
        }
    }

    /// Render this field of a candidate for comparison and reporting
    pub fn value_of(&self, candidate: &CandidateContact) -> String {
        match self {
            Self::RawValue => candidate.raw_value.clone(),
            Self::NormalizedValue => candidate.normalized_value.clone(),
            Self::Confidence => format!("{:.3}", candidate.confidence),
            Self::ExtractionMethod => candidate.extraction_method.to_string(),
            Self::Context => candidate.context.clone(),
            Self::SourceListingId => candidate.source_listing_id.clone(),
            Self::ValidationStatus => candidate.validation_status.to_string(),
            Self::ExtractionTimestamp => candidate
                .extraction_timestamp
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "none".to_string()),
        }
    }
}

impl std::fmt::Display for ConflictField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Disagreement between cluster members on one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConflict {
    pub field: ConflictField,

    /// Distinct values observed, in member order
    pub values: Vec<String>,

    /// Value carried by the resolved record, if any
    pub chosen: Option<String>,

    /// Whether folding the members overwrote a differing value here
    pub overwritten: bool,
}

impl std::fmt::Display for FieldConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} differs: {}", self.field, self.values.join(" | "))?;
        if let Some(chosen) = &self.chosen {
            write!(f, " (kept {chosen})")?;
        }
        if self.overwritten {
            write!(f, " [overwritten]")?;
        }
        Ok(())
    }
}

/// Terminal outcome of resolving one cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub cluster_id: CandidateId,

    /// Strategy that produced this result
    pub strategy: ResolutionStrategy,

    /// Strategy the caller asked for; differs from `strategy` after escalation
    pub requested_strategy: ResolutionStrategy,

    /// Canonical record; `None` under manual review
    pub resolved_record: Option<CandidateContact>,

    /// Automatic pick kept for reviewers when a cluster was escalated
    pub suggested_record: Option<CandidateContact>,

    pub conflicts: Vec<FieldConflict>,

    pub resolution_confidence: f32,

    pub requires_manual_review: bool,
}

impl ResolutionResult {
    /// Number of fields a merge of the members had to overwrite
    pub fn merge_conflicts(&self) -> usize {
        self.conflicts.iter().filter(|c| c.overwritten).count()
    }

    /// Whether this result was escalated away from the requested strategy
    pub fn was_escalated(&self) -> bool {
        self.strategy != self.requested_strategy
    }

    /// Human-readable conflict descriptions
    pub fn conflict_descriptions(&self) -> Vec<String> {
        self.conflicts.iter().map(|c| c.to_string()).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
