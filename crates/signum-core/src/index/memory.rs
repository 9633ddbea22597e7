//! In-memory [`VectorIndex`] for tests and embedded use.
//!
//! Records live in a `HashMap` behind `std::sync::RwLock`. Queries are
//! brute-force cosine distance over every stored vector.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::embedding::{cosine_distance, embed_query, EmbeddingProvider};
use crate::models::IndexedChunk;

use super::{rank_hits, MetadataFilter, QueryHit, VectorIndex};

struct StoredRecord {
    chunk: IndexedChunk,
    vector: Vec<f32>,
}

pub struct InMemoryIndex {
    provider: Arc<dyn EmbeddingProvider>,
    records: RwLock<HashMap<String, StoredRecord>>,
}

impl InMemoryIndex {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Stored text for `id`, if any.
    pub fn document(&self, id: &str) -> Option<String> {
        self.records
            .read()
            .ok()?
            .get(id)
            .map(|r| r.chunk.text.clone())
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn is_available(&self) -> bool {
        self.records.read().map(|r| !r.is_empty()).unwrap_or(false)
    }

    async fn upsert(&self, chunks: &[IndexedChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.provider.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            bail!(
                "embedding provider returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }

        let mut records = self
            .records
            .write()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;
        for (chunk, vector) in chunks.iter().zip(vectors) {
            records.insert(
                chunk.doc_id.clone(),
                StoredRecord {
                    chunk: chunk.clone(),
                    vector,
                },
            );
        }
        Ok(())
    }

    async fn query(
        &self,
        query_text: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryHit>> {
        let query_vec = embed_query(self.provider.as_ref(), query_text).await?;
        let records = self
            .records
            .read()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;

        let hits = records
            .values()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.chunk.metadata)))
            .map(|r| QueryHit {
                id: r.chunk.doc_id.clone(),
                document: r.chunk.text.clone(),
                metadata: r.chunk.metadata.clone(),
                distance: cosine_distance(&query_vec, &r.vector),
            })
            .collect();

        Ok(rank_hits(hits, k))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self
            .records
            .read()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?
            .len())
    }
}

/// Deterministic bag-of-words embedder for tests.
///
/// Each lowercase alphanumeric token is hashed into one of `dims` buckets,
/// so texts sharing vocabulary land close together.
#[cfg(test)]
pub(crate) struct HashingEmbedder {
    pub dims: usize,
}

#[cfg(test)]
#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hashing"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; self.dims];
                for token in t
                    .to_lowercase()
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|s| !s.is_empty())
                {
                    let bucket = token
                        .bytes()
                        .fold(7u64, |h, b| h.wrapping_mul(31).wrapping_add(u64::from(b)));
                    v[(bucket % self.dims as u64) as usize] += 1.0;
                }
                v
            })
            .collect())
    }
}
