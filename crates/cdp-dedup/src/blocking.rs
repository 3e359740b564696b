//! Blocking keys
//!
//! Only candidates sharing at least one key are ever compared.

use std::collections::BTreeMap;

use cdp_core::normalize::{email_domain, website_host};
use cdp_core::{CandidateContact, CandidateId, ContactType, DedupConfig};

/// Minimum characters of a name token used as a key
const NAME_TOKEN_MIN_LEN: usize = 3;

/// Whether members of a block are duplicates by definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BlockKind {
    /// Identical normalized value
    Exact,
    /// Likely similar; members are compared pairwise
    Fuzzy,
}

/// A similarity key shared by candidates of one block
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockingKey {
    pub kind: BlockKind,
    pub key: String,
}

impl BlockingKey {
    fn exact(key: String) -> Self {
        Self {
            kind: BlockKind::Exact,
            key,
        }
    }

    fn fuzzy(key: String) -> Self {
        Self {
            kind: BlockKind::Fuzzy,
            key,
        }
    }
}

impl std::fmt::Display for BlockingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}

/// Keys of one normalized candidate
pub fn blocking_keys(candidate: &CandidateContact, config: &DedupConfig) -> Vec<BlockingKey> {
    let value = candidate.normalized_value.as_str();
    if value.is_empty() {
        return Vec::new();
    }

    let mut keys = vec![BlockingKey::exact(format!(
        "exact:{}:{}",
        candidate.contact_type, value
    ))];

    match candidate.contact_type {
        ContactType::Phone => {
            let plus = if value.starts_with('+') { "+" } else { "" };
            let prefix: String = value
                .chars()
                .filter(|c| c.is_ascii_digit())
                .take(config.phone_prefix_len)
                .collect();
            if !prefix.is_empty() {
                keys.push(BlockingKey::fuzzy(format!("phone-prefix:{plus}{prefix}")));
            }
        }
        ContactType::Email => {
            if let Some(domain) = email_domain(value) {
                keys.push(BlockingKey::fuzzy(format!("email-domain:{domain}")));
            }
        }
        ContactType::Website => {
            if let Some(host) = website_host(value) {
                keys.push(BlockingKey::fuzzy(format!("website-host:{host}")));
            }
        }
        ContactType::Name => {
            let mut tokens: Vec<&str> = value
                .split(|c: char| c.is_whitespace() || c == '-')
                .filter(|t| t.chars().count() >= NAME_TOKEN_MIN_LEN)
                .collect();
            tokens.sort_unstable();
            tokens.dedup();
            keys.extend(
                tokens
                    .into_iter()
                    .map(|t| BlockingKey::fuzzy(format!("name-token:{t}"))),
            );
        }
    }

    keys
}

/// Group candidates by shared key
///
/// Members of each block are in ascending id order and blocks are ordered by
/// key, so the result does not depend on input order.
pub fn build_blocks<'a, I>(candidates: I, config: &DedupConfig) -> BTreeMap<BlockingKey, Vec<CandidateId>>
where
    I: IntoIterator<Item = &'a CandidateContact>,
{
    let mut blocks: BTreeMap<BlockingKey, Vec<CandidateId>> = BTreeMap::new();

    for candidate in candidates {
        for key in blocking_keys(candidate, config) {
            blocks.entry(key).or_default().push(candidate.id);
        }
    }

    for members in blocks.values_mut() {
        members.sort_unstable();
        members.dedup();
    }

    blocks
}
