//! CDP Pipeline - Batch orchestration
//!
//! Runs one batch through every stage:
//! extraction → normalization → validation → quality scoring →
//! deduplication → resolution → delivery.
//!
//! A [`ContactPipeline`] holds no state between runs. Problems with single
//! listings, candidates or clusters are recorded in the [`PipelineReport`];
//! only contract violations and cancellation end a run early.

pub mod report;
pub mod sink;
pub mod worker;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use cdp_core::{
    CandidateContact, CdpError, ListingPayload, Normalizer, PipelineConfig, ResolutionResult,
    Result,
};
use cdp_dedup::{Deduplicator, Resolver};
use cdp_extractor::ExtractorSet;
use cdp_ocr::OcrManager;
use cdp_quality::{BatchQualityReport, FindingCounts, QualityScorer, SearchContext};
use cdp_validator::Validator;

pub use report::{DeliveryFailure, PipelineReport};
pub use sink::{QualityObserver, ResolutionSink, TracingSink};
pub use worker::WorkerPool;

// ============================================================================
// Pipeline
// ============================================================================

/// Contact discovery pipeline for one configuration
pub struct ContactPipeline {
    config: PipelineConfig,
    extractors: ExtractorSet,
    normalizer: Normalizer,
    validator: Validator,
    context: Option<SearchContext>,
    reference_time: Option<DateTime<Utc>>,
    sinks: Vec<Arc<dyn ResolutionSink>>,
    observers: Vec<Arc<dyn QualityObserver>>,
}

impl ContactPipeline {
    /// Create a pipeline without an OCR engine
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            extractors: ExtractorSet::from_config(&config.extraction, Arc::new(OcrManager::new())),
            normalizer: Normalizer::new(&config.normalization),
            validator: Validator::new(&config.validation),
            context: None,
            reference_time: None,
            sinks: Vec::new(),
            observers: Vec::new(),
            config,
        })
    }

    /// Read image attachments with this OCR capability
    pub fn with_ocr(mut self, ocr: OcrManager) -> Self {
        self.extractors = ExtractorSet::from_config(&self.config.extraction, Arc::new(ocr));
        self
    }

    /// Replace the configured extractors
    pub fn with_extractors(mut self, extractors: ExtractorSet) -> Self {
        self.extractors = extractors;
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// Score relevance against a search
    pub fn with_search_context(mut self, context: SearchContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Measure freshness against a fixed time instead of the clock
    pub fn at(mut self, reference_time: DateTime<Utc>) -> Self {
        self.reference_time = Some(reference_time);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResolutionSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn QualityObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn extractors(&self) -> &ExtractorSet {
        &self.extractors
    }

    fn scorer(&self) -> QualityScorer {
        let mut scorer = QualityScorer::new(&self.config.quality);
        if let Some(context) = &self.context {
            scorer = scorer.with_context(context.clone());
        }
        if let Some(now) = self.reference_time {
            scorer = scorer.at(now);
        }
        scorer
    }

    fn resolver(&self) -> Resolver {
        let resolver = Resolver::new(&self.config.resolution);
        match self.reference_time {
            Some(now) => resolver.at(now),
            None => resolver,
        }
    }

    /// Run one batch
    ///
    /// `prior` carries candidates from earlier runs so duplicates are found
    /// across runs; candidates already validated keep their status.
    pub async fn run(
        &self,
        listings: Vec<ListingPayload>,
        prior: Vec<CandidateContact>,
        cancel: &CancellationToken,
    ) -> Result<PipelineReport> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();

        tracing::info!(
            run_id = %run_id,
            listings = listings.len(),
            prior = prior.len(),
            extractors = self.extractors.len(),
            "Pipeline run started"
        );

        // 1. Extract
        let extracted = WorkerPool::new(&self.config.extraction)
            .extract(&self.extractors, listings, cancel)
            .await?;

        // 2. Normalize
        let mut candidates = extracted.candidates;
        candidates.extend(prior);
        for candidate in &mut candidates {
            self.normalizer.apply(candidate);
        }
        tracing::debug!("Normalized {} candidates", candidates.len());

        // 3. Validate
        let validation = self.validator.validate_batch(&mut candidates, cancel).await?;
        for candidate in candidates.iter().filter(|c| c.is_malformed()) {
            tracing::warn!("{}", CdpError::MalformedCandidate(candidate.id));
        }

        // 4. Score
        let findings: HashMap<_, _> = validation
            .iter()
            .map(|r| {
                (
                    r.candidate_id,
                    FindingCounts::new(r.errors.len(), r.warnings.len()),
                )
            })
            .collect();
        let quality = self.scorer().assess_batch(&candidates, &findings);

        if cancel.is_cancelled() {
            return Err(CdpError::Cancelled);
        }

        // 5. Deduplicate
        let dedup = Deduplicator::new(&self.config.dedup).deduplicate(&candidates)?;

        // 6. Resolve
        let resolutions = self.resolver().resolve_all(&dedup.clusters, &candidates)?;

        // 7. Deliver
        let delivery_failures = self.deliver(&run_id, &resolutions, &quality).await;

        let report = PipelineReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            candidates,
            extraction_failures: extracted.failures,
            validation,
            quality,
            clusters: dedup.clusters,
            excluded: dedup.excluded,
            skipped_blocks: dedup.skipped_blocks,
            resolutions,
            delivery_failures,
        };

        tracing::info!(
            run_id = %report.run_id,
            elapsed_ms = report.elapsed_ms(),
            "Pipeline run finished: {}",
            report.summary()
        );

        Ok(report)
    }

    async fn deliver(
        &self,
        run_id: &str,
        resolutions: &[ResolutionResult],
        quality: &BatchQualityReport,
    ) -> Vec<DeliveryFailure> {
        let mut failures = Vec::new();

        for sink in &self.sinks {
            if let Err(e) = sink.deliver(run_id, resolutions).await {
                tracing::warn!("Sink {} rejected run {}: {}", sink.name(), run_id, e);
                failures.push(DeliveryFailure {
                    collaborator: sink.name().to_string(),
                    message: e.to_string(),
                });
            }
        }

        for observer in &self.observers {
            if let Err(e) = observer.observe(run_id, quality).await {
                tracing::warn!("Observer {} rejected run {}: {}", observer.name(), run_id, e);
                failures.push(DeliveryFailure {
                    collaborator: observer.name().to_string(),
                    message: e.to_string(),
                });
            }
        }

        failures
    }
}

// ============================================================================
// Tests
// ============================================================================
