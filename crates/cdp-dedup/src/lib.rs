//! CDP Dedup - Duplicate detection and resolution
//!
//! Detection runs in three steps over normalized candidates:
//! 1. Blocking: candidates are grouped by cheap similarity keys
//! 2. Matching: pairs inside a block are scored and classified
//! 3. Clustering: matched pairs become connected components
//!
//! The [`Resolver`] then turns each cluster into one canonical record.

pub mod blocking;
pub mod cluster;
pub mod resolve;
pub mod similarity;

pub use blocking::{blocking_keys, build_blocks, BlockKind, BlockingKey};
pub use cluster::{connected_components, DedupOutcome, Deduplicator};
pub use resolve::Resolver;
pub use similarity::{classify, compare, similarity, value_similarity};
