//! The five quality dimensions
//!
//! Each function scores one dimension in [0, 1] and depends only on its
//! arguments.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use cdp_core::{CandidateContact, ExtractionMethod, ValidationStatus};

/// Validator findings accumulated for a candidate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingCounts {
    pub errors: usize,
    pub warnings: usize,
}

impl FindingCounts {
    pub fn new(errors: usize, warnings: usize) -> Self {
        Self { errors, warnings }
    }
}

/// Caller-supplied search context for the relevance dimension
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchContext {
    /// Keywords matched case-insensitively against context and value
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Sources the caller trusts most
    #[serde(default)]
    pub preferred_methods: Vec<ExtractionMethod>,
}

impl SearchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords
            .into_iter()
            .map(|k| k.into().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        self
    }

    pub fn with_preferred_methods(mut self, methods: Vec<ExtractionMethod>) -> Self {
        self.preferred_methods = methods;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.preferred_methods.is_empty()
    }
}

/// Share of required and optional fields present
///
/// Value and type are required; context, source listing and normalized
/// value are optional. Without a primary value the score is 0.
pub fn completeness(candidate: &CandidateContact) -> f32 {
    if candidate.is_malformed() {
        return 0.0;
    }

    let optional = [
        !candidate.context.trim().is_empty(),
        !candidate.source_listing_id.trim().is_empty(),
        !candidate.normalized_value.is_empty(),
    ];
    let present = optional.iter().filter(|p| **p).count() as f32;

    (0.7 + 0.3 * present / optional.len() as f32).clamp(0.0, 1.0)
}

/// Validation outcome adjusted by findings and confidence
pub fn accuracy(candidate: &CandidateContact, findings: FindingCounts) -> f32 {
    let base = match candidate.validation_status {
        ValidationStatus::Valid => 1.0,
        ValidationStatus::Uncertain => 0.6,
        ValidationStatus::Invalid => 0.2,
        ValidationStatus::Pending => 0.5,
    };

    let penalty = 0.1 * findings.errors as f32 + 0.05 * findings.warnings as f32;
    (base - penalty + 0.1 * candidate.confidence).clamp(0.0, 1.0)
}

/// Extraction confidence scaled by the reliability of its method
pub fn confidence(candidate: &CandidateContact) -> f32 {
    (candidate.confidence * candidate.extraction_method.reliability()).clamp(0.0, 1.0)
}

/// Step function of the age of the extraction
pub fn freshness(candidate: &CandidateContact, now: DateTime<Utc>) -> f32 {
    let Some(extracted) = candidate.extraction_timestamp else {
        return 0.3;
    };
    let age = now - extracted;

    if age <= Duration::days(1) {
        1.0
    } else if age <= Duration::days(7) {
        0.9
    } else if age <= Duration::days(30) {
        0.8
    } else if age <= Duration::days(90) {
        0.6
    } else if age <= Duration::days(365) {
        0.5
    } else {
        0.3
    }
}

/// Match against the caller's search context
pub fn relevance(candidate: &CandidateContact, context: Option<&SearchContext>) -> f32 {
    let Some(context) = context.filter(|c| !c.is_empty()) else {
        return if candidate.context.trim().is_empty() {
            0.5
        } else {
            0.7
        };
    };

    let overlap = if context.keywords.is_empty() {
        0.0
    } else {
        let haystack = format!("{} {}", candidate.context, candidate.raw_value).to_lowercase();
        let hits = context
            .keywords
            .iter()
            .filter(|k| haystack.contains(k.as_str()))
            .count();
        hits as f32 / context.keywords.len() as f32
    };
    let preferred = if context
        .preferred_methods
        .contains(&candidate.extraction_method)
    {
        1.0
    } else {
        0.0
    };

    (0.1 + 0.6 * overlap + 0.3 * preferred).clamp(0.0, 1.0)
}
