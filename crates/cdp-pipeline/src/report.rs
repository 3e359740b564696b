//! Batch run report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cdp_core::{
    CandidateContact, CandidateId, DuplicateCluster, ExtractionFailure, ResolutionResult,
    ValidationStatus,
};
use cdp_quality::BatchQualityReport;
use cdp_validator::ValidationReport;

/// A sink or observer that failed to accept the batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryFailure {
    pub collaborator: String,
    pub message: String,
}

/// Everything one batch run produced
///
/// Recoverable problems are recorded here instead of failing the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Every candidate after normalization and validation, prior ones included
    pub candidates: Vec<CandidateContact>,

    pub extraction_failures: Vec<ExtractionFailure>,

    pub validation: Vec<ValidationReport>,

    pub quality: BatchQualityReport,

    pub clusters: Vec<DuplicateCluster>,

    /// Candidates kept out of clustering
    pub excluded: Vec<CandidateId>,

    /// Fuzzy blocks skipped for size
    pub skipped_blocks: Vec<String>,

    pub resolutions: Vec<ResolutionResult>,

    pub delivery_failures: Vec<DeliveryFailure>,
}

impl PipelineReport {
    pub fn candidate(&self, id: CandidateId) -> Option<&CandidateContact> {
        self.candidates.iter().find(|c| c.id == id)
    }

    /// Number of candidates per validation status
    pub fn status_count(&self, status: ValidationStatus) -> usize {
        self.candidates
            .iter()
            .filter(|c| c.validation_status == status)
            .count()
    }

    /// Resolutions waiting for a reviewer
    pub fn manual_reviews(&self) -> impl Iterator<Item = &ResolutionResult> {
        self.resolutions.iter().filter(|r| r.requires_manual_review)
    }

    /// Canonical records of automatically resolved clusters
    pub fn resolved_records(&self) -> impl Iterator<Item = &CandidateContact> {
        self.resolutions
            .iter()
            .filter_map(|r| r.resolved_record.as_ref())
    }

    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// One-line summary for logs and the CLI
    pub fn summary(&self) -> String {
        format!(
            "{} candidates ({} valid, {} uncertain, {} invalid), {} clusters, {} resolved, {} for review, {} extraction failures",
            self.candidates.len(),
            self.status_count(ValidationStatus::Valid),
            self.status_count(ValidationStatus::Uncertain),
            self.status_count(ValidationStatus::Invalid),
            self.clusters.len(),
            self.resolved_records().count(),
            self.manual_reviews().count(),
            self.extraction_failures.len()
        )
    }
}
