//! CDP Quality - Multi-dimension quality scoring
//!
//! Every candidate gets five dimension scores in [0, 1] (completeness,
//! accuracy, confidence, freshness, relevance). Their weighted sum is the
//! overall score, bucketed into a [`QualityLevel`]. Batch statistics tell
//! callers whether a batch needs manual review.

pub mod dimensions;
pub mod report;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cdp_core::{CandidateContact, CandidateId, QualityConfig, QualityWeights};

pub use dimensions::{FindingCounts, SearchContext};
pub use report::{BatchQualityReport, LevelDistribution};

// ============================================================================
// Scores
// ============================================================================

/// Quality bucket of an overall score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl QualityLevel {
    /// Bucket an overall score
    pub fn from_score(score: f32) -> Self {
        if score >= 0.9 {
            QualityLevel::Excellent
        } else if score >= 0.7 {
            QualityLevel::Good
        } else if score >= 0.5 {
            QualityLevel::Fair
        } else {
            QualityLevel::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLevel::Excellent => "excellent",
            QualityLevel::Good => "good",
            QualityLevel::Fair => "fair",
            QualityLevel::Poor => "poor",
        }
    }
}

impl std::fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five dimension scores of one candidate
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionScores {
    pub completeness: f32,
    pub accuracy: f32,
    pub confidence: f32,
    pub freshness: f32,
    pub relevance: f32,
}

impl DimensionScores {
    /// Weighted sum, clamped to [0, 1]
    pub fn weighted(&self, weights: &QualityWeights) -> f32 {
        let sum = self.completeness * weights.completeness
            + self.accuracy * weights.accuracy
            + self.confidence * weights.confidence
            + self.freshness * weights.freshness
            + self.relevance * weights.relevance;
        sum.clamp(0.0, 1.0)
    }

    pub(crate) fn add(&self, other: &DimensionScores) -> DimensionScores {
        DimensionScores {
            completeness: self.completeness + other.completeness,
            accuracy: self.accuracy + other.accuracy,
            confidence: self.confidence + other.confidence,
            freshness: self.freshness + other.freshness,
            relevance: self.relevance + other.relevance,
        }
    }

    pub(crate) fn scale(&self, factor: f32) -> DimensionScores {
        DimensionScores {
            completeness: self.completeness * factor,
            accuracy: self.accuracy * factor,
            confidence: self.confidence * factor,
            freshness: self.freshness * factor,
            relevance: self.relevance * factor,
        }
    }
}

/// Quality assessment of one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub candidate_id: CandidateId,
    pub dimensions: DimensionScores,
    pub overall: f32,
    pub level: QualityLevel,
}

// ============================================================================
// Scorer
// ============================================================================

/// Scores candidates against fixed weights and an optional search context
#[derive(Debug, Clone)]
pub struct QualityScorer {
    weights: QualityWeights,
    review_threshold: f32,
    context: Option<SearchContext>,
    reference_time: Option<DateTime<Utc>>,
}

impl QualityScorer {
    pub fn new(config: &QualityConfig) -> Self {
        Self {
            weights: config.weights,
            review_threshold: config.review_threshold,
            context: None,
            reference_time: None,
        }
    }

    /// Score relevance against a search context
    pub fn with_context(mut self, context: SearchContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Measure freshness against a fixed time instead of the clock
    pub fn at(mut self, reference_time: DateTime<Utc>) -> Self {
        self.reference_time = Some(reference_time);
        self
    }

    pub fn weights(&self) -> &QualityWeights {
        &self.weights
    }

    /// Score one candidate
    pub fn score(&self, candidate: &CandidateContact, findings: FindingCounts) -> QualityScore {
        let now = self.reference_time.unwrap_or_else(Utc::now);

        let dimensions = DimensionScores {
            completeness: dimensions::completeness(candidate),
            accuracy: dimensions::accuracy(candidate, findings),
            confidence: dimensions::confidence(candidate),
            freshness: dimensions::freshness(candidate, now),
            relevance: dimensions::relevance(candidate, self.context.as_ref()),
        };
        let overall = dimensions.weighted(&self.weights);

        QualityScore {
            candidate_id: candidate.id,
            dimensions,
            overall,
            level: QualityLevel::from_score(overall),
        }
    }

    /// Score a batch; candidates missing from `findings` count as clean
    pub fn assess_batch(
        &self,
        candidates: &[CandidateContact],
        findings: &HashMap<CandidateId, FindingCounts>,
    ) -> BatchQualityReport {
        let scores: Vec<QualityScore> = candidates
            .iter()
            .map(|c| self.score(c, findings.get(&c.id).copied().unwrap_or_default()))
            .collect();

        let report = BatchQualityReport::from_scores(scores, self.review_threshold);
        tracing::info!(
            "Quality of {} candidates: mean {:.3}, median {:.3}, {} poor{}",
            report.count,
            report.mean,
            report.median,
            report.distribution.poor,
            if report.flagged_for_review {
                ", flagged for review"
            } else {
                ""
            }
        );
        report
    }
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new(&QualityConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_core::{ContactType, ExtractionMethod, ValidationStatus};
    use proptest::prelude::*;

    fn validated(confidence: f32) -> CandidateContact {
        let mut c = CandidateContact::new(
            ContactType::Email,
            "info@example.de",
            ExtractionMethod::StructuredApi,
            confidence,
            "l-1",
        )
        .with_context("contact.email");
        c.normalized_value = "info@example.de".to_string();
        c.validation_status = ValidationStatus::Valid;
        c
    }

    #[test]
    fn test_level_buckets() {
        assert_eq!(QualityLevel::from_score(0.95), QualityLevel::Excellent);
        assert_eq!(QualityLevel::from_score(0.9), QualityLevel::Excellent);
        assert_eq!(QualityLevel::from_score(0.7), QualityLevel::Good);
        assert_eq!(QualityLevel::from_score(0.5), QualityLevel::Fair);
        assert_eq!(QualityLevel::from_score(0.49), QualityLevel::Poor);
        assert!(QualityLevel::Excellent > QualityLevel::Poor);
    }

    #[test]
    fn test_overall_score() {
        let c = validated(1.0);
        let now = c.extraction_timestamp.unwrap_or_else(Utc::now);
        let score = QualityScorer::default().at(now).score(&c, FindingCounts::default());

        assert!((score.dimensions.completeness - 1.0).abs() < 1e-6);
        assert_eq!(score.dimensions.accuracy, 1.0);
        assert_eq!(score.dimensions.confidence, 1.0);
        assert_eq!(score.dimensions.freshness, 1.0);
        assert_eq!(score.dimensions.relevance, 0.7);
        assert!((score.overall - 0.97).abs() < 1e-6);
        assert_eq!(score.level, QualityLevel::Excellent);
    }

    #[test]
    fn test_custom_weights() {
        let config = QualityConfig {
            weights: QualityWeights {
                completeness: 0.0,
                accuracy: 0.0,
                confidence: 1.0,
                freshness: 0.0,
                relevance: 0.0,
            },
            ..Default::default()
        };
        let score = QualityScorer::new(&config).score(&validated(0.4), FindingCounts::default());
        assert!((score.overall - 0.4).abs() < 1e-6);
        assert_eq!(score.level, QualityLevel::Poor);
    }

    #[test]
    fn test_assess_batch_uses_findings() {
        let good = validated(0.9);
        let mut bad = validated(0.9);
        bad.validation_status = ValidationStatus::Invalid;

        let mut findings = HashMap::new();
        findings.insert(bad.id, FindingCounts::new(2, 1));

        let report = QualityScorer::default().assess_batch(&[good.clone(), bad.clone()], &findings);

        assert_eq!(report.count, 2);
        assert_eq!(report.scores[0].candidate_id, good.id);
        assert!(report.scores[1].dimensions.accuracy < report.scores[0].dimensions.accuracy);
    }

    fn any_status() -> impl Strategy<Value = ValidationStatus> {
        prop_oneof![
            Just(ValidationStatus::Pending),
            Just(ValidationStatus::Valid),
            Just(ValidationStatus::Invalid),
            Just(ValidationStatus::Uncertain),
        ]
    }

    fn any_method() -> impl Strategy<Value = ExtractionMethod> {
        prop::sample::select(ExtractionMethod::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_scores_stay_in_unit_interval(
            confidence in 0.0f32..=1.0,
            status in any_status(),
            method in any_method(),
            errors in 0usize..20,
            warnings in 0usize..20,
            age_days in -10i64..3000,
            raw in "[a-z0-9@. ]{0,20}",
            context in "[a-z ]{0,20}",
            keywords in prop::collection::vec("[a-z]{1,6}", 0..4),
        ) {
            let now = Utc::now();
            let mut c = CandidateContact::new(ContactType::Name, raw, method, confidence, "l-1")
                .with_context(context)
                .with_timestamp(Some(now - chrono::Duration::days(age_days)));
            c.validation_status = status;

            let scorer = QualityScorer::default()
                .at(now)
                .with_context(SearchContext::new().with_keywords(keywords));
            let score = scorer.score(&c, FindingCounts::new(errors, warnings));

            for value in [
                score.dimensions.completeness,
                score.dimensions.accuracy,
                score.dimensions.confidence,
                score.dimensions.freshness,
                score.dimensions.relevance,
                score.overall,
            ] {
                prop_assert!((0.0..=1.0).contains(&value));
            }
        }
    }
}
