//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the storage seam between indexing and
//! retrieval. Records are keyed by a stable chunk id, carry their text and
//! [`ChunkMetadata`], and are searched by cosine distance (lower is closer)
//! with an optional equality filter on `course_id` / `module_id`.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`is_available`](VectorIndex::is_available) | `false` means "no index built yet", distinct from "no matches" |
//! | [`upsert`](VectorIndex::upsert) | Insert or overwrite records by id |
//! | [`query`](VectorIndex::query) | Top-k nearest records to a query text |
//! | [`count`](VectorIndex::count) | Number of stored records |
//!
//! Implementations must be `Send + Sync`; the index is shared across
//! request handlers for the life of the process.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::models::{ChunkMetadata, IndexedChunk};

/// Conjunctive equality filter over chunk metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
}

impl MetadataFilter {
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        let field_ok = |want: &Option<String>, have: &Option<String>| match want {
            Some(w) => have.as_deref() == Some(w.as_str()),
            None => true,
        };
        field_ok(&self.course_id, &metadata.course_id)
            && field_ok(&self.module_id, &metadata.module_id)
    }
}

/// Build a filter from whichever ids are present; `None` when neither is.
pub fn safe_where_filter(
    course_id: Option<&str>,
    module_id: Option<&str>,
) -> Option<MetadataFilter> {
    let course_id = course_id.filter(|s| !s.is_empty()).map(String::from);
    let module_id = module_id.filter(|s| !s.is_empty()).map(String::from);
    if course_id.is_none() && module_id.is_none() {
        return None;
    }
    Some(MetadataFilter {
        course_id,
        module_id,
    })
}

/// Deterministic record id for the `index`-th chunk of `source_path`.
///
/// Identical boundaries on re-index produce identical ids, so an upsert
/// overwrites in place instead of duplicating.
pub fn stable_chunk_id(source_path: &str, chunk_index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}::{}", source_path, chunk_index).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A single nearest-neighbour result.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    pub id: String,
    pub document: String,
    pub metadata: ChunkMetadata,
    /// Cosine distance to the query.
    pub distance: f64,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn is_available(&self) -> bool;

    async fn upsert(&self, chunks: &[IndexedChunk]) -> Result<()>;

    /// Hits ordered by ascending distance, at most `k` of them.
    async fn query(
        &self,
        query_text: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryHit>>;

    async fn count(&self) -> Result<usize>;
}

/// Sort hits closest-first with id as tie-breaker, then keep `k`.
pub fn rank_hits(mut hits: Vec<QueryHit>, k: usize) -> Vec<QueryHit> {
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(course: Option<&str>, module: Option<&str>) -> ChunkMetadata {
        ChunkMetadata {
            source_path: "p".into(),
            title: "t".into(),
            course_id: course.map(String::from),
            module_id: module.map(String::from),
        }
    }

    #[test]
    fn test_safe_where_filter_empty() {
        assert_eq!(safe_where_filter(None, None), None);
        assert_eq!(safe_where_filter(Some(""), None), None);
    }

    #[test]
    fn test_safe_where_filter_partial() {
        let f = safe_where_filter(Some("data-structures"), None).unwrap();
        assert_eq!(f.course_id.as_deref(), Some("data-structures"));
        assert_eq!(f.module_id, None);
        let json = serde_json::to_value(&f).unwrap();
        assert!(json.get("module_id").is_none());
    }

    #[test]
    fn test_filter_matches_conjunctively() {
        let f = safe_where_filter(Some("ds"), Some("stacks")).unwrap();
        assert!(f.matches(&meta(Some("ds"), Some("stacks"))));
        assert!(!f.matches(&meta(Some("ds"), Some("queues"))));
        assert!(!f.matches(&meta(Some("ds"), None)));

        let course_only = safe_where_filter(Some("ds"), None).unwrap();
        assert!(course_only.matches(&meta(Some("ds"), None)));
        assert!(course_only.matches(&meta(Some("ds"), Some("queues"))));
        assert!(!course_only.matches(&meta(None, None)));
    }

    #[test]
    fn test_stable_chunk_id() {
        let a = stable_chunk_id("README.md", 0);
        assert_eq!(a, stable_chunk_id("README.md", 0));
        assert_ne!(a, stable_chunk_id("README.md", 1));
        assert_ne!(a, stable_chunk_id("BACKEND.md", 0));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_rank_hits_orders_and_truncates() {
        let hit = |id: &str, d: f64| QueryHit {
            id: id.into(),
            document: String::new(),
            metadata: meta(None, None),
            distance: d,
        };
        let ranked = rank_hits(vec![hit("c", 0.5), hit("b", 0.1), hit("a", 0.5)], 2);
        let ids: Vec<&str> = ranked.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
