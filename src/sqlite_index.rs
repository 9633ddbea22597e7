//! SQLite-backed [`VectorIndex`].
//!
//! Records live in `<persist_dir>/index.sqlite`, keyed by
//! `(collection, id)`, with the embedding stored as a little-endian `f32`
//! BLOB. Queries embed the question and scan the collection with cosine
//! distance, applying the metadata filter in SQL.
//!
//! The pool opens lazily on first use. Only [`upsert`](VectorIndex::upsert)
//! may create the database file; reads against a missing index fail, and
//! [`is_available`](VectorIndex::is_available) lets callers avoid that.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

use signum_core::embedding::{blob_to_vec, cosine_distance, embed_query, vec_to_blob, EmbeddingProvider};
use signum_core::index::{rank_hits, MetadataFilter, QueryHit, VectorIndex};
use signum_core::models::{ChunkMetadata, IndexedChunk};

use crate::db;
use crate::migrate;

pub const INDEX_FILE: &str = "index.sqlite";

/// `false` when `persist_dir` is missing or empty: no index has been built.
pub fn has_index(persist_dir: &Path) -> bool {
    std::fs::read_dir(persist_dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

pub struct SqliteIndex {
    persist_dir: PathBuf,
    collection: String,
    provider: Arc<dyn EmbeddingProvider>,
    pool: OnceCell<SqlitePool>,
    schema: OnceCell<()>,
}

impl SqliteIndex {
    pub fn open(
        persist_dir: impl Into<PathBuf>,
        collection: impl Into<String>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            persist_dir: persist_dir.into(),
            collection: collection.into(),
            provider,
            pool: OnceCell::new(),
            schema: OnceCell::new(),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.persist_dir.join(INDEX_FILE)
    }

    async fn read_pool(&self) -> Result<&SqlitePool> {
        self.pool
            .get_or_try_init(|| async { db::connect(&self.db_path(), false).await })
            .await
    }

    async fn write_pool(&self) -> Result<&SqlitePool> {
        let pool = self
            .pool
            .get_or_try_init(|| async { db::connect(&self.db_path(), true).await })
            .await?;
        self.schema
            .get_or_try_init(|| async { migrate::run_migrations(pool).await })
            .await?;
        Ok(pool)
    }

    /// Close the pool, if it was opened.
    pub async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
        }
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn is_available(&self) -> bool {
        has_index(&self.persist_dir)
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

        let pool = self.write_pool().await?;
        let now = chrono::Utc::now().timestamp();
        let mut tx = pool.begin().await?;

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            let metadata_json = serde_json::to_string(&chunk.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO chunk_records (collection, id, document, metadata_json, course_id,
                                           module_id, model, dims, embedding, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    document = excluded.document,
                    metadata_json = excluded.metadata_json,
                    course_id = excluded.course_id,
                    module_id = excluded.module_id,
                    model = excluded.model,
                    dims = excluded.dims,
                    embedding = excluded.embedding,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&self.collection)
            .bind(&chunk.doc_id)
            .bind(&chunk.text)
            .bind(&metadata_json)
            .bind(&chunk.metadata.course_id)
            .bind(&chunk.metadata.module_id)
            .bind(self.provider.model_name())
            .bind(vector.len() as i64)
            .bind(vec_to_blob(vector))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn query(
        &self,
        query_text: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_vec = embed_query(self.provider.as_ref(), query_text).await?;
        let pool = self.read_pool().await?;

        let mut sql = String::from(
            "SELECT id, document, metadata_json, embedding FROM chunk_records WHERE collection = ?",
        );
        let course_id = filter.and_then(|f| f.course_id.as_deref());
        let module_id = filter.and_then(|f| f.module_id.as_deref());
        if course_id.is_some() {
            sql.push_str(" AND course_id = ?");
        }
        if module_id.is_some() {
            sql.push_str(" AND module_id = ?");
        }

        let mut q = sqlx::query(&sql).bind(&self.collection);
        if let Some(c) = course_id {
            q = q.bind(c);
        }
        if let Some(m) = module_id {
            q = q.bind(m);
        }
        let rows = q.fetch_all(pool).await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let blob: Vec<u8> = row.get("embedding");
            let metadata_json: String = row.get("metadata_json");
            let metadata: ChunkMetadata = serde_json::from_str(&metadata_json)?;
            hits.push(QueryHit {
                id: row.get("id"),
                document: row.get("document"),
                metadata,
                distance: cosine_distance(&query_vec, &blob_to_vec(&blob)),
            });
        }

        Ok(rank_hits(hits, k))
    }

    async fn count(&self) -> Result<usize> {
        if !self.db_path().exists() {
            return Ok(0);
        }
        let pool = self.read_pool().await?;
        let table_exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='chunk_records'",
        )
        .fetch_one(pool)
        .await?;
        if !table_exists {
            return Ok(0);
        }
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_records WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(pool)
            .await?;
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// One dimension per keyword: vectors overlap only on shared words.
    struct KeywordEmbedder;

    const VOCAB: &[&str] = &["stack", "queue", "tree", "array", "cooking"];

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword-test"
        }
        fn dims(&self) -> usize {
            VOCAB.len()
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let lower = t.to_lowercase();
                    VOCAB
                        .iter()
                        .map(|w| if lower.contains(w) { 1.0 } else { 0.0 })
                        .collect()
                })
                .collect())
        }
    }

    fn chunk(path: &str, idx: usize, text: &str, course: Option<&str>) -> IndexedChunk {
        IndexedChunk {
            doc_id: signum_core::index::stable_chunk_id(path, idx),
            text: text.to_string(),
            metadata: ChunkMetadata {
                source_path: path.to_string(),
                title: path.to_string(),
                course_id: course.map(String::from),
                module_id: None,
            },
        }
    }

    #[tokio::test]
    async fn test_missing_dir_is_unavailable_and_not_created() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("rag");
        let index = SqliteIndex::open(&dir, "signum_rag", Arc::new(KeywordEmbedder));
        assert!(!index.is_available().await);
        assert_eq!(index.count().await.unwrap(), 0);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_upsert_query_and_overwrite() {
        let tmp = TempDir::new().unwrap();
        let index = SqliteIndex::open(tmp.path().join("rag"), "signum_rag", Arc::new(KeywordEmbedder));

        index
            .upsert(&[
                chunk("stacks.jsx", 0, "A stack is LIFO", Some("data-structures")),
                chunk("queues.jsx", 0, "A queue is FIFO", Some("data-structures")),
                chunk("food.md", 0, "cooking pasta", None),
            ])
            .await
            .unwrap();
        assert!(index.is_available().await);
        assert_eq!(index.count().await.unwrap(), 3);

        let hits = index.query("what is a stack", 2, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].metadata.source_path, "stacks.jsx");
        assert!(hits[0].distance < 1e-6);

        let filter = MetadataFilter {
            course_id: Some("data-structures".into()),
            module_id: None,
        };
        let hits = index.query("cooking", 5, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.metadata.source_path != "food.md"));

        // Same id overwrites in place.
        index
            .upsert(&[chunk("stacks.jsx", 0, "A stack pushes and pops", Some("data-structures"))])
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 3);
        let hits = index.query("stack", 1, None).await.unwrap();
        assert_eq!(hits[0].document, "A stack pushes and pops");
        index.close().await;
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("rag");
        let a = SqliteIndex::open(&dir, "a", Arc::new(KeywordEmbedder));
        a.upsert(&[chunk("x.md", 0, "tree", None)]).await.unwrap();
        a.close().await;

        let b = SqliteIndex::open(&dir, "b", Arc::new(KeywordEmbedder));
        assert_eq!(b.count().await.unwrap(), 0);
        assert!(b.query("tree", 3, None).await.unwrap().is_empty());
    }
}
