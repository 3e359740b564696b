//! Duplicate resolution
//!
//! Collapses every cluster into exactly one [`ResolutionResult`]. Members are
//! always visited in ascending id order.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use cdp_core::{
    CandidateContact, CandidateId, CdpError, ConflictField, DuplicateCluster, FieldConflict,
    ResolutionConfig, ResolutionResult, ResolutionStrategy, Result,
};
use cdp_quality::dimensions::{completeness, freshness};

/// Member score weights for keep_best
const SCORE_WEIGHT_CONFIDENCE: f32 = 0.4;
const SCORE_WEIGHT_COMPLETENESS: f32 = 0.3;
const SCORE_WEIGHT_FRESHNESS: f32 = 0.2;
const SCORE_WEIGHT_STATUS: f32 = 0.1;

/// Confidence lost per merge conflict
const CONFLICT_PENALTY: f32 = 0.1;
/// Confidence lost when a merge base is not the best member
const MERGE_BASE_PENALTY: f32 = 0.2;

/// Applies a resolution strategy to duplicate clusters
#[derive(Debug, Clone)]
pub struct Resolver {
    strategy: ResolutionStrategy,
    max_conflicts: usize,
    reference_time: Option<DateTime<Utc>>,
}

impl Resolver {
    pub fn new(config: &ResolutionConfig) -> Self {
        Self {
            strategy: config.strategy,
            max_conflicts: config.max_conflicts,
            reference_time: None,
        }
    }

    pub fn with_strategy(mut self, strategy: ResolutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Measure freshness against a fixed time instead of the clock
    pub fn at(mut self, reference_time: DateTime<Utc>) -> Self {
        self.reference_time = Some(reference_time);
        self
    }

    pub fn strategy(&self) -> ResolutionStrategy {
        self.strategy
    }

    fn now(&self) -> DateTime<Utc> {
        self.reference_time.unwrap_or_else(Utc::now)
    }

    /// Weighted blend of confidence, completeness, freshness and status
    pub fn member_score(&self, candidate: &CandidateContact) -> f32 {
        let status = f32::from(candidate.validation_status.rank()) / 3.0;
        let score = SCORE_WEIGHT_CONFIDENCE * candidate.confidence
            + SCORE_WEIGHT_COMPLETENESS * completeness(candidate)
            + SCORE_WEIGHT_FRESHNESS * freshness(candidate, self.now())
            + SCORE_WEIGHT_STATUS * status;
        score.clamp(0.0, 1.0)
    }

    /// Resolve every cluster, looking members up in `candidates`
    ///
    /// A cluster naming an unknown candidate is a contract violation.
    pub fn resolve_all(
        &self,
        clusters: &[DuplicateCluster],
        candidates: &[CandidateContact],
    ) -> Result<Vec<ResolutionResult>> {
        let by_id: HashMap<CandidateId, &CandidateContact> =
            candidates.iter().map(|c| (c.id, c)).collect();

        let mut results = Vec::with_capacity(clusters.len());
        for cluster in clusters {
            let members = cluster
                .members
                .iter()
                .map(|id| {
                    by_id.get(id).copied().ok_or_else(|| {
                        CdpError::ContractViolation(format!(
                            "cluster {} names unknown candidate {}",
                            cluster.id, id
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            results.push(self.resolve_cluster(cluster.id, &members)?);
        }

        let escalated = results
            .iter()
            .filter(|r| r.was_escalated())
            .count();
        tracing::info!(
            "Resolved {} clusters with {} ({} escalated to manual review)",
            results.len(),
            self.strategy,
            escalated
        );

        Ok(results)
    }

    /// Resolve one cluster
    pub fn resolve_cluster(
        &self,
        cluster_id: CandidateId,
        members: &[&CandidateContact],
    ) -> Result<ResolutionResult> {
        if members.is_empty() {
            return Err(CdpError::ContractViolation(format!(
                "cluster {cluster_id} has no members"
            )));
        }

        let mut members = members.to_vec();
        members.sort_by_key(|c| c.id);

        let scores: Vec<f32> = members.iter().map(|c| self.member_score(c)).collect();
        let best = best_index(&members, &scores);

        // Escalation looks at what a merge would overwrite, whatever the strategy
        let (merged, overwritten) = merge(&members);

        let (record, penalty) = match self.strategy {
            ResolutionStrategy::KeepBest => (Some(members[best].clone()), 0.0),
            ResolutionStrategy::KeepNewest => {
                let pick = by_timestamp(&members, Ordering::Greater).unwrap_or(best);
                (Some(members[pick].clone()), 0.0)
            }
            ResolutionStrategy::KeepOldest => {
                let pick = by_timestamp(&members, Ordering::Less).unwrap_or(best);
                (Some(members[pick].clone()), 0.0)
            }
            ResolutionStrategy::Merge => {
                let penalty = if best == 0 { 0.0 } else { MERGE_BASE_PENALTY };
                (Some(merged), penalty)
            }
            ResolutionStrategy::ManualReview => (None, 0.0),
        };

        let conflicts = find_conflicts(&members, record.as_ref(), &overwritten);
        let merge_conflicts = overwritten.len();

        tracing::debug!(
            "Cluster {} ({} members): {} fields differ, {} merge conflicts",
            cluster_id,
            members.len(),
            conflicts.len(),
            merge_conflicts
        );

        if self.strategy == ResolutionStrategy::ManualReview {
            return Ok(ResolutionResult {
                cluster_id,
                strategy: ResolutionStrategy::ManualReview,
                requested_strategy: self.strategy,
                resolved_record: None,
                suggested_record: None,
                conflicts,
                resolution_confidence: 0.0,
                requires_manual_review: true,
            });
        }

        let confidence =
            (1.0 - CONFLICT_PENALTY * merge_conflicts as f32 - penalty).clamp(0.0, 1.0);

        if merge_conflicts > self.max_conflicts {
            let ambiguity = CdpError::ClusterAmbiguity {
                cluster_id,
                conflicts: merge_conflicts,
            };
            tracing::warn!("{} (limit {}), escalating to manual review", ambiguity, self.max_conflicts);

            return Ok(ResolutionResult {
                cluster_id,
                strategy: ResolutionStrategy::ManualReview,
                requested_strategy: self.strategy,
                resolved_record: None,
                suggested_record: record,
                conflicts,
                resolution_confidence: confidence,
                requires_manual_review: true,
            });
        }

        Ok(ResolutionResult {
            cluster_id,
            strategy: self.strategy,
            requested_strategy: self.strategy,
            resolved_record: record,
            suggested_record: None,
            conflicts,
            resolution_confidence: confidence,
            requires_manual_review: false,
        })
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(&ResolutionConfig::default())
    }
}

/// Highest score; ties go to the newest timestamp, then the smallest id
fn best_index(members: &[&CandidateContact], scores: &[f32]) -> usize {
    let mut best = 0;
    for i in 1..members.len() {
        let by_score = scores[i].total_cmp(&scores[best]);
        let by_time = members[i]
            .extraction_timestamp
            .cmp(&members[best].extraction_timestamp);
        // Members are id-sorted, so keeping the earlier index on a full tie keeps the smaller id
        if by_score.then(by_time) == Ordering::Greater {
            best = i;
        }
    }
    best
}

/// Index of the newest (`Greater`) or oldest (`Less`) known timestamp
///
/// `None` when no member has a timestamp.
fn by_timestamp(members: &[&CandidateContact], want: Ordering) -> Option<usize> {
    let mut pick: Option<(usize, DateTime<Utc>)> = None;
    for (i, member) in members.iter().enumerate() {
        let Some(ts) = member.extraction_timestamp else {
            continue;
        };
        match pick {
            Some((_, current)) if ts.cmp(&current) != want => {}
            _ => pick = Some((i, ts)),
        }
    }
    pick.map(|(i, _)| i)
}

/// Whether `new` should overwrite `current` on one field during a merge
///
/// Only confidence, timestamp and validation status have a rule; every other
/// field keeps the value already set.
fn should_replace(field: ConflictField, current: &CandidateContact, new: &CandidateContact) -> bool {
    match field {
        ConflictField::Confidence => new.confidence > current.confidence,
        ConflictField::ExtractionTimestamp => new.extraction_timestamp > current.extraction_timestamp,
        ConflictField::ValidationStatus => {
            new.validation_status.rank() > current.validation_status.rank()
        }
        ConflictField::RawValue
        | ConflictField::NormalizedValue
        | ConflictField::ExtractionMethod
        | ConflictField::Context
        | ConflictField::SourceListingId => false,
    }
}

/// Fold members into the first one, field by field
///
/// Also returns the fields where a value already set was overwritten with a
/// different one.
fn merge(members: &[&CandidateContact]) -> (CandidateContact, BTreeSet<ConflictField>) {
    let mut merged = members[0].clone();
    let mut overwritten = BTreeSet::new();

    for member in &members[1..] {
        for field in ConflictField::ALL {
            if !should_replace(field, &merged, member) {
                continue;
            }
            let was_set = field != ConflictField::ExtractionTimestamp
                || merged.extraction_timestamp.is_some();
            if was_set && field.value_of(&merged) != field.value_of(member) {
                overwritten.insert(field);
            }
            match field {
                ConflictField::Confidence => merged.confidence = member.confidence,
                ConflictField::ExtractionTimestamp => {
                    merged.extraction_timestamp = member.extraction_timestamp
                }
                ConflictField::ValidationStatus => {
                    merged.validation_status = member.validation_status
                }
                _ => {}
            }
        }
    }

    (merged, overwritten)
}

/// Every field on which members disagree
fn find_conflicts(
    members: &[&CandidateContact],
    record: Option<&CandidateContact>,
    overwritten: &BTreeSet<ConflictField>,
) -> Vec<FieldConflict> {
    ConflictField::ALL
        .iter()
        .filter_map(|field| {
            let mut values: Vec<String> = Vec::new();
            for member in members {
                let value = field.value_of(member);
                if !values.contains(&value) {
                    values.push(value);
                }
            }
            if values.len() < 2 {
                return None;
            }

            Some(FieldConflict {
                field: *field,
                values,
                chosen: record.map(|r| field.value_of(r)),
                overwritten: overwritten.contains(field),
            })
        })
        .collect()
}
