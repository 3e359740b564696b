//! CDP Validator - Format, plausibility and reality checks for candidates
//!
//! The validator runs the rule table for a candidate's type, then the
//! optional reality checks, and settles on exactly one status:
//! - any error → `invalid`
//! - otherwise any warning or degraded reality check → `uncertain`
//! - otherwise → `valid`
//!
//! An empty value is `invalid` before any rule runs. Reality checks never
//! invalidate a candidate; a failed or slow check only makes it uncertain.

pub mod reality;
pub mod rules;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use cdp_core::{CandidateContact, CandidateId, CdpError, Result, ValidationConfig, ValidationStatus};

pub use reality::{
    CheckStatus, DnsResolvabilityCheck, HttpReachabilityCheck, RealityCheck, RealityChecker,
    RealityError, RealityOutcome,
};
pub use rules::{default_rules, DomainLists, Finding, Severity, ValidationRule};

// ============================================================================
// Confidence Deltas
// ============================================================================

/// Confidence adjustment applied once per validated candidate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceDeltas {
    pub valid: f32,
    pub uncertain: f32,
    pub invalid: f32,
}

impl ConfidenceDeltas {
    pub fn for_status(&self, status: ValidationStatus) -> f32 {
        match status {
            ValidationStatus::Valid => self.valid,
            ValidationStatus::Uncertain => self.uncertain,
            ValidationStatus::Invalid => self.invalid,
            ValidationStatus::Pending => 0.0,
        }
    }
}

impl Default for ConfidenceDeltas {
    fn default() -> Self {
        Self {
            valid: 0.1,
            uncertain: -0.05,
            invalid: -0.3,
        }
    }
}

// ============================================================================
// Validation Report
// ============================================================================

/// Outcome of validating one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub candidate_id: CandidateId,
    pub status: ValidationStatus,
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
    #[serde(default)]
    pub reality_checks: Vec<RealityOutcome>,
    pub confidence_delta: f32,
}

impl ValidationReport {
    fn settle(
        candidate_id: CandidateId,
        errors: Vec<Finding>,
        warnings: Vec<Finding>,
        reality_checks: Vec<RealityOutcome>,
        deltas: &ConfidenceDeltas,
    ) -> Self {
        let status = if !errors.is_empty() {
            ValidationStatus::Invalid
        } else if !warnings.is_empty() {
            ValidationStatus::Uncertain
        } else {
            ValidationStatus::Valid
        };

        Self {
            candidate_id,
            status,
            errors,
            warnings,
            reality_checks,
            confidence_delta: deltas.for_status(status),
        }
    }

    /// Number of accumulated findings of both severities
    pub fn finding_count(&self) -> usize {
        self.errors.len() + self.warnings.len()
    }

    /// Set the candidate's status and apply the confidence delta
    ///
    /// A candidate is settled only once: one that already carries a status
    /// is left untouched and `false` is returned.
    pub fn apply_to(&self, candidate: &mut CandidateContact) -> bool {
        if candidate.id != self.candidate_id
            || candidate.validation_status != ValidationStatus::Pending
        {
            return false;
        }

        candidate.validation_status = self.status;
        candidate.adjust_confidence(self.confidence_delta);
        true
    }
}

// ============================================================================
// Validator
// ============================================================================

/// Caller-owned validator; reuse it across a batch to share the check cache
#[derive(Clone)]
pub struct Validator {
    rules: Vec<ValidationRule>,
    lists: DomainLists,
    deltas: ConfidenceDeltas,
    reality: Option<RealityChecker>,
    max_concurrent_checks: usize,
}

impl Validator {
    /// Build the rule table and, when enabled, the reality checks
    pub fn new(config: &ValidationConfig) -> Self {
        let reality = config
            .reality_checks_enabled
            .then(|| RealityChecker::from_config(config))
            .filter(|checker| !checker.is_empty());

        Self {
            rules: default_rules(config),
            lists: DomainLists::new(&config.extra_disposable_domains),
            deltas: ConfidenceDeltas::default(),
            reality,
            max_concurrent_checks: config.max_concurrent_checks.max(1),
        }
    }

    /// Replace the rule table
    pub fn with_rules(mut self, rules: Vec<ValidationRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_deltas(mut self, deltas: ConfidenceDeltas) -> Self {
        self.deltas = deltas;
        self
    }

    /// Use a specific reality checker
    pub fn with_reality_checker(mut self, checker: RealityChecker) -> Self {
        self.reality = Some(checker);
        self
    }

    pub fn without_reality_checks(mut self) -> Self {
        self.reality = None;
        self
    }

    pub fn rules(&self) -> &[ValidationRule] {
        &self.rules
    }

    pub fn has_reality_checks(&self) -> bool {
        self.reality.is_some()
    }

    /// Run the rule table only
    pub fn check_format(&self, candidate: &CandidateContact) -> ValidationReport {
        let (errors, warnings) = self.run_rules(candidate);
        ValidationReport::settle(candidate.id, errors, warnings, Vec::new(), &self.deltas)
    }

    /// Run the rule table and, for candidates without errors, the reality checks
    pub async fn validate(&self, candidate: &CandidateContact) -> ValidationReport {
        let (errors, mut warnings) = self.run_rules(candidate);

        let mut outcomes = Vec::new();
        if let Some(reality) = self.reality.as_ref().filter(|_| errors.is_empty()) {
            outcomes = reality.run(candidate).await;

            for outcome in outcomes.iter().filter(|o| !o.passed()) {
                let reason = outcome
                    .detail
                    .clone()
                    .unwrap_or_else(|| format!("{:?}", outcome.status));
                let degradation = CdpError::ValidationDegradation {
                    candidate_id: candidate.id,
                    reason: reason.clone(),
                };
                tracing::warn!("{}", degradation);

                warnings.push(Finding::warning(format!("reality:{}", outcome.check), reason));
            }
        }

        ValidationReport::settle(candidate.id, errors, warnings, outcomes, &self.deltas)
    }

    fn run_rules(&self, candidate: &CandidateContact) -> (Vec<Finding>, Vec<Finding>) {
        if candidate.is_malformed() {
            return (vec![Finding::error("required_value", "empty value")], Vec::new());
        }

        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for rule in self
            .rules
            .iter()
            .filter(|r| r.applies_to(candidate.contact_type))
        {
            match rule.evaluate(candidate, &self.lists) {
                Some(finding) if finding.severity == Severity::Error => errors.push(finding),
                Some(finding) => warnings.push(finding),
                None => {}
            }
        }

        (errors, warnings)
    }

    /// Validate a batch with at most `max_concurrent_checks` in flight
    ///
    /// Statuses and confidence deltas are applied to the candidates. Once the
    /// token is cancelled no further candidate is started and the call returns
    /// [`CdpError::Cancelled`].
    pub async fn validate_batch(
        &self,
        candidates: &mut [CandidateContact],
        cancel: &CancellationToken,
    ) -> Result<Vec<ValidationReport>> {
        let pending: Vec<(usize, &CandidateContact)> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.validation_status == ValidationStatus::Pending)
            .collect();

        let mut reports: Vec<(usize, ValidationReport)> = stream::iter(pending)
            .map(|(index, candidate)| async move {
                if cancel.is_cancelled() {
                    return None;
                }
                Some((index, self.validate(candidate).await))
            })
            .buffer_unordered(self.max_concurrent_checks)
            .filter_map(|r| async move { r })
            .collect()
            .await;

        if cancel.is_cancelled() {
            return Err(CdpError::Cancelled);
        }

        reports.sort_by_key(|(index, _)| *index);
        for (index, report) in &reports {
            report.apply_to(&mut candidates[*index]);
        }

        let invalid = reports
            .iter()
            .filter(|(_, r)| r.status == ValidationStatus::Invalid)
            .count();
        tracing::info!(
            "Validated {} candidates ({} invalid)",
            reports.len(),
            invalid
        );

        Ok(reports.into_iter().map(|(_, r)| r).collect())
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(&ValidationConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================
