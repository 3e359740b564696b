//! Bounded extraction workers
//!
//! One unit of work is one extractor over one listing. Units run on the
//! blocking thread pool, at most `max_concurrency` at a time, and OCR units
//! additionally hold one of `ocr_max_concurrency` slots.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use cdp_core::{
    CdpError, ExtractionConfig, ExtractionFailure, ExtractionMethod, ListingPayload, Result,
};
use cdp_extractor::{run_extractor, ExtractionOutcome, ExtractorSet};

/// Permits held for the lifetime of one unit
struct UnitPermits {
    _ocr: Option<OwnedSemaphorePermit>,
    _worker: OwnedSemaphorePermit,
}

/// Worker limits for one batch
pub struct WorkerPool {
    workers: Arc<Semaphore>,
    ocr_slots: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            workers: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            ocr_slots: Arc::new(Semaphore::new(config.ocr_max_concurrency.max(1))),
        }
    }

    /// Wait for the permits of one unit; `None` once the run is cancelled
    async fn acquire(&self, uses_ocr: bool, cancel: &CancellationToken) -> Option<UnitPermits> {
        let ocr = if uses_ocr {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                permit = Arc::clone(&self.ocr_slots).acquire_owned() => Some(permit.ok()?),
            }
        } else {
            None
        };

        let worker = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            permit = Arc::clone(&self.workers).acquire_owned() => permit.ok()?,
        };

        Some(UnitPermits {
            _ocr: ocr,
            _worker: worker,
        })
    }

    /// Run every extractor over every listing
    ///
    /// Failures stay inside their unit. Results are merged in listing order,
    /// then extractor order, whatever order the units finish in. Cancellation
    /// stops new units from starting and yields `CdpError::Cancelled` once
    /// the running ones have finished.
    pub async fn extract(
        &self,
        extractors: &ExtractorSet,
        listings: Vec<ListingPayload>,
        cancel: &CancellationToken,
    ) -> Result<ExtractionOutcome> {
        let enabled: Arc<[ExtractionMethod]> = extractors.enabled_methods().into();
        let mut handles = Vec::new();

        'listings: for listing in listings.into_iter().map(Arc::new) {
            for extractor in extractors.extractors() {
                let Some(permits) = self.acquire(extractor.uses_ocr(), cancel).await else {
                    break 'listings;
                };

                let extractor = Arc::clone(extractor);
                let listing = Arc::clone(&listing);
                let enabled = Arc::clone(&enabled);
                let name = extractor.name().to_string();
                let listing_id = listing.listing_id.clone();

                let handle = tokio::task::spawn_blocking(move || {
                    let _permits = permits;
                    run_extractor(extractor.as_ref(), &listing, &enabled)
                });
                handles.push((name, listing_id, handle));
            }
        }

        let units = handles.len();
        let finished = join_all(
            handles
                .into_iter()
                .map(|(name, listing_id, handle)| async move { (name, listing_id, handle.await) }),
        )
        .await;

        let mut outcome = ExtractionOutcome::default();
        for (extractor, listing_id, result) in finished {
            match result {
                Ok(unit) => outcome.merge(unit),
                Err(e) => {
                    let message = format!("worker aborted: {e}");
                    tracing::warn!(
                        "{}",
                        CdpError::ExtractionFailure {
                            extractor: extractor.clone(),
                            listing_id: listing_id.clone(),
                            message: message.clone(),
                        }
                    );

                    outcome.failures.push(ExtractionFailure {
                        extractor,
                        listing_id,
                        message,
                    });
                }
            }
        }

        if cancel.is_cancelled() {
            tracing::info!("Extraction cancelled after {} units", units);
            return Err(CdpError::Cancelled);
        }

        tracing::info!(
            "Extracted {} candidates from {} units ({} failed)",
            outcome.candidates.len(),
            units,
            outcome.failures.len()
        );

        Ok(outcome)
    }
}
