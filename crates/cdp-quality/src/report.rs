//! Batch quality statistics

use serde::{Deserialize, Serialize};

use crate::{DimensionScores, QualityLevel, QualityScore};

/// Number of candidates per quality level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelDistribution {
    pub excellent: usize,
    pub good: usize,
    pub fair: usize,
    pub poor: usize,
}

impl LevelDistribution {
    pub fn record(&mut self, level: QualityLevel) {
        match level {
            QualityLevel::Excellent => self.excellent += 1,
            QualityLevel::Good => self.good += 1,
            QualityLevel::Fair => self.fair += 1,
            QualityLevel::Poor => self.poor += 1,
        }
    }

    pub fn get(&self, level: QualityLevel) -> usize {
        match level {
            QualityLevel::Excellent => self.excellent,
            QualityLevel::Good => self.good,
            QualityLevel::Fair => self.fair,
            QualityLevel::Poor => self.poor,
        }
    }

    pub fn total(&self) -> usize {
        self.excellent + self.good + self.fair + self.poor
    }
}

/// Quality assessment of a whole batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchQualityReport {
    pub count: usize,
    pub mean: f32,
    pub median: f32,
    /// Population standard deviation
    pub std_dev: f32,
    pub min: f32,
    pub max: f32,
    pub distribution: LevelDistribution,
    pub dimension_means: DimensionScores,
    /// Mean below the review threshold, or more than half the batch poor
    pub flagged_for_review: bool,
    pub scores: Vec<QualityScore>,
}

impl BatchQualityReport {
    /// Summarize per-candidate scores
    pub fn from_scores(scores: Vec<QualityScore>, review_threshold: f32) -> Self {
        let count = scores.len();
        let mut distribution = LevelDistribution::default();
        for score in &scores {
            distribution.record(score.level);
        }

        if count == 0 {
            return Self {
                count,
                mean: 0.0,
                median: 0.0,
                std_dev: 0.0,
                min: 0.0,
                max: 0.0,
                distribution,
                dimension_means: DimensionScores::default(),
                flagged_for_review: false,
                scores,
            };
        }

        let n = count as f32;
        let mut overall: Vec<f32> = scores.iter().map(|s| s.overall).collect();
        overall.sort_by(|a, b| a.total_cmp(b));

        let mean = overall.iter().sum::<f32>() / n;
        let median = if count % 2 == 0 {
            (overall[count / 2 - 1] + overall[count / 2]) / 2.0
        } else {
            overall[count / 2]
        };
        let variance = overall.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;

        let sum = scores
            .iter()
            .fold(DimensionScores::default(), |acc, s| acc.add(&s.dimensions));
        let dimension_means = sum.scale(1.0 / n);

        let poor_share = distribution.poor as f32 / n;
        let flagged_for_review = mean < review_threshold || poor_share > 0.5;

        Self {
            count,
            mean,
            median,
            std_dev: variance.sqrt(),
            min: overall[0],
            max: overall[count - 1],
            distribution,
            dimension_means,
            flagged_for_review,
            scores,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
