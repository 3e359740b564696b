//! Pairwise similarity
//!
//! All functions are symmetric in their arguments.

use strsim::normalized_levenshtein;

use cdp_core::normalize::{email_domain, email_local};
use cdp_core::{CandidateContact, ContactType, DedupConfig, DuplicateMatch, MatchType};

/// Weight of the domain in email similarity
const EMAIL_DOMAIN_WEIGHT: f64 = 0.7;
/// Weight of the local part in email similarity
const EMAIL_LOCAL_WEIGHT: f64 = 0.3;

/// Similarity of two normalized candidates in [0, 1]
///
/// Different types never match. Identical normalized values score 1.0.
pub fn similarity(a: &CandidateContact, b: &CandidateContact) -> f32 {
    if a.contact_type != b.contact_type {
        return 0.0;
    }
    value_similarity(a.contact_type, &a.normalized_value, &b.normalized_value)
}

/// Type-specific similarity of two normalized values
pub fn value_similarity(contact_type: ContactType, a: &str, b: &str) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let score = match contact_type {
        ContactType::Email => email_similarity(a, b),
        ContactType::Phone | ContactType::Name | ContactType::Website => {
            normalized_levenshtein(a, b)
        }
    };

    (score as f32).clamp(0.0, 1.0)
}

fn email_similarity(a: &str, b: &str) -> f64 {
    let domain = match (email_domain(a), email_domain(b)) {
        (Some(x), Some(y)) => normalized_levenshtein(x, y),
        _ => 0.0,
    };
    let local = normalized_levenshtein(email_local(a), email_local(b));

    EMAIL_DOMAIN_WEIGHT * domain + EMAIL_LOCAL_WEIGHT * local
}

/// Match type for a similarity, or `None` below the threshold
pub fn classify(a: &CandidateContact, b: &CandidateContact, score: f32, config: &DedupConfig) -> Option<MatchType> {
    if a.contact_type == b.contact_type && !a.normalized_value.is_empty() && a.normalized_value == b.normalized_value {
        Some(MatchType::Exact)
    } else if score >= config.high_similarity_threshold {
        Some(MatchType::HighSimilarity)
    } else if score >= config.similarity_threshold {
        Some(MatchType::MediumSimilarity)
    } else {
        None
    }
}

/// Compare two candidates, yielding a match when they are similar enough
pub fn compare(a: &CandidateContact, b: &CandidateContact, config: &DedupConfig) -> Option<DuplicateMatch> {
    let score = similarity(a, b);
    let match_type = classify(a, b, score, config)?;
    DuplicateMatch::new(a.id, b.id, score, match_type)
}
