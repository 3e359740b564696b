//! Output collaborators
//!
//! Storage and notification consume resolutions through [`ResolutionSink`];
//! observability consumes batch statistics through [`QualityObserver`].

use async_trait::async_trait;

use cdp_core::{ResolutionResult, Result};
use cdp_quality::BatchQualityReport;

/// Receives the resolutions of a finished batch
#[async_trait]
pub trait ResolutionSink: Send + Sync {
    /// Sink name for logging
    fn name(&self) -> &str;

    /// Deliver every resolution of one run
    async fn deliver(&self, run_id: &str, resolutions: &[ResolutionResult]) -> Result<()>;
}

/// Receives quality statistics of a finished batch
#[async_trait]
pub trait QualityObserver: Send + Sync {
    fn name(&self) -> &str;

    async fn observe(&self, run_id: &str, report: &BatchQualityReport) -> Result<()>;
}

/// Writes batch outcomes to the tracing subscriber
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl TracingSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ResolutionSink for TracingSink {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn deliver(&self, run_id: &str, resolutions: &[ResolutionResult]) -> Result<()> {
        for resolution in resolutions {
            if resolution.requires_manual_review {
                tracing::warn!(
                    run_id,
                    cluster_id = %resolution.cluster_id,
                    requested = %resolution.requested_strategy,
                    conflicts = resolution.conflicts.len(),
                    "Cluster needs manual review"
                );
            } else if let Some(record) = &resolution.resolved_record {
                tracing::debug!(
                    run_id,
                    cluster_id = %resolution.cluster_id,
                    contact_type = %record.contact_type,
                    value = %record.normalized_value,
                    confidence = resolution.resolution_confidence,
                    "Cluster resolved"
                );
            }
        }

        tracing::info!(run_id, resolutions = resolutions.len(), "Resolutions delivered");
        Ok(())
    }
}

#[async_trait]
impl QualityObserver for TracingSink {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn observe(&self, run_id: &str, report: &BatchQualityReport) -> Result<()> {
        tracing::info!(
            run_id,
            count = report.count,
            mean = report.mean,
            median = report.median,
            std_dev = report.std_dev,
            excellent = report.distribution.excellent,
            good = report.distribution.good,
            fair = report.distribution.fair,
            poor = report.distribution.poor,
            flagged = report.flagged_for_review,
            "Batch quality"
        );
        Ok(())
    }
}
