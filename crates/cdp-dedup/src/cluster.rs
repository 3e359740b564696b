//! Duplicate clustering
//!
//! Matched pairs are edges of an undirected graph; every connected component
//! is one [`DuplicateCluster`]. Components are found by breadth-first search
//! over an adjacency list, visiting candidates in ascending id order, so the
//! clusters do not depend on the order candidates arrive in.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use cdp_core::{
    CandidateContact, CandidateId, CdpError, DedupConfig, DuplicateCluster, DuplicateMatch,
    MatchType, Result, ValidationStatus,
};

use crate::blocking::{build_blocks, BlockKind};
use crate::similarity::compare;

/// Result of deduplicating one candidate set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DedupOutcome {
    /// Clusters in ascending id order; singletons included
    pub clusters: Vec<DuplicateCluster>,

    /// Candidates kept out of clustering (malformed, or invalid when excluded)
    pub excluded: Vec<CandidateId>,

    /// Fuzzy blocks too large to compare pairwise
    pub skipped_blocks: Vec<String>,

    /// Pairs actually compared
    pub comparisons: usize,
}

impl DedupOutcome {
    /// Clusters with more than one member
    pub fn duplicate_clusters(&self) -> impl Iterator<Item = &DuplicateCluster> {
        self.clusters.iter().filter(|c| !c.is_singleton())
    }

    /// Cluster containing a candidate
    pub fn cluster_of(&self, id: CandidateId) -> Option<&DuplicateCluster> {
        self.clusters.iter().find(|c| c.members.binary_search(&id).is_ok())
    }
}

/// Blocking, matching and clustering over one candidate set
#[derive(Debug, Clone)]
pub struct Deduplicator {
    config: DedupConfig,
}

impl Deduplicator {
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    fn is_eligible(&self, candidate: &CandidateContact) -> bool {
        if candidate.is_malformed() || candidate.normalized_value.is_empty() {
            return false;
        }
        !(self.config.exclude_invalid && candidate.validation_status == ValidationStatus::Invalid)
    }

    /// Cluster normalized candidates
    ///
    /// Fails only on a contract violation: two candidates with one id, or a
    /// confidence that is not a number.
    pub fn deduplicate(&self, candidates: &[CandidateContact]) -> Result<DedupOutcome> {
        let mut by_id: BTreeMap<CandidateId, &CandidateContact> = BTreeMap::new();
        for candidate in candidates {
            if !candidate.confidence.is_finite() {
                return Err(CdpError::ContractViolation(format!(
                    "candidate {} has non-finite confidence",
                    candidate.id
                )));
            }
            if by_id.insert(candidate.id, candidate).is_some() {
                return Err(CdpError::ContractViolation(format!(
                    "duplicate candidate id {}",
                    candidate.id
                )));
            }
        }

        let (eligible, excluded): (Vec<&CandidateContact>, Vec<&CandidateContact>) =
            by_id.values().copied().partition(|c| self.is_eligible(c));
        let excluded: Vec<CandidateId> = excluded.iter().map(|c| c.id).collect();

        let mut outcome = DedupOutcome {
            excluded,
            ..Default::default()
        };

        let edges = self.find_matches(&eligible, &by_id, &mut outcome);
        outcome.clusters = connected_components(eligible.iter().map(|c| c.id), edges);

        tracing::info!(
            "Deduplicated {} candidates into {} clusters ({} with duplicates, {} excluded, {} comparisons)",
            eligible.len(),
            outcome.clusters.len(),
            outcome.duplicate_clusters().count(),
            outcome.excluded.len(),
            outcome.comparisons
        );

        Ok(outcome)
    }

    fn find_matches(
        &self,
        eligible: &[&CandidateContact],
        by_id: &BTreeMap<CandidateId, &CandidateContact>,
        outcome: &mut DedupOutcome,
    ) -> BTreeMap<(CandidateId, CandidateId), DuplicateMatch> {
        let mut edges = BTreeMap::new();
        let mut compared: HashSet<(CandidateId, CandidateId)> = HashSet::new();

        for (key, members) in build_blocks(eligible.iter().copied(), &self.config) {
            if members.len() < 2 {
                continue;
            }

            match key.kind {
                BlockKind::Exact => {
                    // Linking every member to the smallest id yields the same component
                    let anchor = members[0];
                    for other in &members[1..] {
                        if let Some(m) = DuplicateMatch::new(anchor, *other, 1.0, MatchType::Exact) {
                            edges.insert(m.pair(), m);
                        }
                    }
                }
                BlockKind::Fuzzy if members.len() > self.config.max_block_size => {
                    tracing::warn!(
                        "Skipping block {} with {} members (limit {})",
                        key,
                        members.len(),
                        self.config.max_block_size
                    );
                    outcome.skipped_blocks.push(key.key.clone());
                }
                BlockKind::Fuzzy => {
                    tracing::debug!("Comparing block {} ({} members)", key, members.len());

                    for (i, a) in members.iter().enumerate() {
                        for b in &members[i + 1..] {
                            if edges.contains_key(&(*a, *b)) || !compared.insert((*a, *b)) {
                                continue;
                            }
                            let (Some(ca), Some(cb)) = (by_id.get(a), by_id.get(b)) else {
                                continue;
                            };

                            outcome.comparisons += 1;
                            if let Some(m) = compare(ca, cb, &self.config) {
                                edges.insert(m.pair(), m);
                            }
                        }
                    }
                }
            }
        }

        edges
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(&DedupConfig::default())
    }
}

/// Connected components by breadth-first search
///
/// Nodes are visited in ascending order; each component lists its members in
/// ascending order and carries the edges inside it.
pub fn connected_components<I>(
    nodes: I,
    edges: BTreeMap<(CandidateId, CandidateId), DuplicateMatch>,
) -> Vec<DuplicateCluster>
where
    I: IntoIterator<Item = CandidateId>,
{
    let mut adjacency: BTreeMap<CandidateId, BTreeSet<CandidateId>> =
        nodes.into_iter().map(|id| (id, BTreeSet::new())).collect();

    for (a, b) in edges.keys() {
        if !(adjacency.contains_key(a) && adjacency.contains_key(b)) {
            continue;
        }
        adjacency.entry(*a).or_default().insert(*b);
        adjacency.entry(*b).or_default().insert(*a);
    }

    let mut component_of: BTreeMap<CandidateId, usize> = BTreeMap::new();
    let mut components: Vec<Vec<CandidateId>> = Vec::new();

    for start in adjacency.keys() {
        if component_of.contains_key(start) {
            continue;
        }

        let index = components.len();
        let mut members = Vec::new();
        let mut queue = VecDeque::from([*start]);
        component_of.insert(*start, index);

        while let Some(node) = queue.pop_front() {
            members.push(node);
            for next in adjacency.get(&node).into_iter().flatten() {
                if !component_of.contains_key(next) {
                    component_of.insert(*next, index);
                    queue.push_back(*next);
                }
            }
        }

        members.sort_unstable();
        components.push(members);
    }

    let mut matches: Vec<Vec<DuplicateMatch>> = vec![Vec::new(); components.len()];
    for (pair, m) in edges {
        if let Some(index) = component_of.get(&pair.0) {
            matches[*index].push(m);
        }
    }

    components
        .into_iter()
        .zip(matches)
        .map(|(members, matches)| DuplicateCluster {
            id: members[0],
            members,
            matches,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_core::{ContactType, ExtractionMethod, Normalizer};
    use proptest::prelude::*;
    use uuid::Uuid;

    fn candidate(id: u128, contact_type: ContactType, raw: &str) -> CandidateContact {
        let mut c = CandidateContact::new(contact_type, raw, ExtractionMethod::FreeText, 0.6, "l-1")
            .with_id(Uuid::from_u128(id));
        Normalizer::default().apply(&mut c);
        c
    }

    fn members(outcome: &DedupOutcome) -> Vec<Vec<u128>> {
        outcome
            .clusters
            .iter()
            .map(|c| c.members.iter().map(|id| id.as_u128()).collect())
            .collect()
    }

    #[test]
    fn test_exact_duplicates_cluster() {
        let candidates = vec![
            candidate(1, ContactType::Phone, "0176 12345678"),
            candidate(2, ContactType::Phone, "+4917612345678"),
            candidate(3, ContactType::Email, "anna@example.de"),
        ];

        let outcome = Deduplicator::default().deduplicate(&candidates).unwrap();

        assert_eq!(members(&outcome), vec![vec![1, 2], vec![3]]);
        assert_eq!(outcome.clusters[0].matches.len(), 1);
        assert_eq!(outcome.clusters[0].matches[0].match_type, MatchType::Exact);
        assert_eq!(outcome.clusters[0].id, Uuid::from_u128(1));
    }

    #[test]
    fn test_transitive_fuzzy_chain() {
        let candidates = vec![
            candidate(5, ContactType::Phone, "0176 12345600"),
            candidate(4, ContactType::Phone, "0176 12345678"),
            candidate(6, ContactType::Phone, "0176 12340000"),
            candidate(7, ContactType::Phone, "030 9876543"),
        ];

        let outcome = Deduplicator::default().deduplicate(&candidates).unwrap();

        // 4 and 6 are too far apart but share a cluster through 5
        assert_eq!(members(&outcome), vec![vec![4, 5, 6], vec![7]]);
        let pairs: Vec<(u128, u128)> = outcome.clusters[0]
            .matches
            .iter()
            .map(|m| (m.pair().0.as_u128(), m.pair().1.as_u128()))
            .collect();
        assert_eq!(pairs, vec![(4, 5), (5, 6)]);
        assert!(outcome.clusters[0]
            .matches
            .iter()
            .all(|m| m.match_type == MatchType::MediumSimilarity));
    }

    #[test]
    fn test_only_malformed_are_excluded_by_default() {
        let mut invalid = candidate(2, ContactType::Phone, "0176 12345678");
        invalid.validation_status = ValidationStatus::Invalid;
        let candidates = vec![
            candidate(1, ContactType::Phone, "0176 12345678"),
            invalid,
            candidate(3, ContactType::Email, ""),
        ];

        let outcome = Deduplicator::default().deduplicate(&candidates).unwrap();
        assert_eq!(members(&outcome), vec![vec![1, 2]]);
        assert_eq!(outcome.excluded, vec![Uuid::from_u128(3)]);
        assert_eq!(outcome.cluster_of(Uuid::from_u128(2)).unwrap().len(), 2);

        let drop_invalid = Deduplicator::new(&DedupConfig {
            exclude_invalid: true,
            ..Default::default()
        });
        let outcome = drop_invalid.deduplicate(&candidates).unwrap();
        assert_eq!(members(&outcome), vec![vec![1]]);
        assert_eq!(outcome.excluded, vec![Uuid::from_u128(2), Uuid::from_u128(3)]);
    }

    #[test]
    fn test_oversized_fuzzy_block_is_skipped() {
        let candidates: Vec<_> = (0..4)
            .map(|i| candidate(i + 1, ContactType::Email, &format!("user{i}@example.de")))
            .collect();
        let dedup = Deduplicator::new(&DedupConfig {
            max_block_size: 3,
            ..Default::default()
        });

        let outcome = dedup.deduplicate(&candidates).unwrap();
        assert_eq!(outcome.skipped_blocks, vec!["email-domain:example.de"]);
        assert_eq!(outcome.clusters.len(), 4);
        assert_eq!(outcome.comparisons, 0);
    }

    #[test]
    fn test_duplicate_ids_violate_contract() {
        let a = candidate(1, ContactType::Phone, "0176 12345678");
        let b = candidate(1, ContactType::Email, "anna@example.de");

        let result = Deduplicator::default().deduplicate(&[a, b]);
        assert!(matches!(result, Err(CdpError::ContractViolation(_))));
    }

    #[test]
    fn test_cluster_lookup() {
        let candidates = vec![
            candidate(1, ContactType::Email, "anna@example.de"),
            candidate(2, ContactType::Email, "Anna@Example.de"),
        ];
        let outcome = Deduplicator::default().deduplicate(&candidates).unwrap();

        let cluster = outcome.cluster_of(Uuid::from_u128(2)).unwrap();
        assert_eq!(cluster.id, Uuid::from_u128(1));
        assert_eq!(outcome.duplicate_clusters().count(), 1);
    }

    fn phone_like() -> impl Strategy<Value = String> {
        prop::sample::select(vec![
            "0176 12345678",
            "0176 12345679",
            "0176 12345600",
            "030 1234567",
            "030 1234568",
            "+1 555 0100",
            "anna@example.de",
            "anne@example.de",
            "max@example.org",
        ])
        .prop_map(str::to_string)
    }

    proptest! {
        #[test]
        fn prop_clusters_partition_and_ignore_order(
            values in prop::collection::vec(phone_like(), 1..12),
            seed in any::<u64>(),
        ) {
            let candidates: Vec<CandidateContact> = values
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    let contact_type = if v.contains('@') { ContactType::Email } else { ContactType::Phone };
                    candidate(i as u128 + 1, contact_type, v)
                })
                .collect();

            let outcome = Deduplicator::default().deduplicate(&candidates).unwrap();

            let mut seen = BTreeSet::new();
            for cluster in &outcome.clusters {
                for id in &cluster.members {
                    prop_assert!(seen.insert(*id), "candidate in two clusters");
                }
            }
            prop_assert_eq!(seen.len(), candidates.len());

            let mut shuffled = candidates.clone();
            let len = shuffled.len();
            shuffled.rotate_left((seed as usize) % len);
            shuffled.reverse();
            let again = Deduplicator::default().deduplicate(&shuffled).unwrap();
            prop_assert_eq!(members(&outcome), members(&again));
        }
    }
}
