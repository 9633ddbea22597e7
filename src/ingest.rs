//! Index build pipeline.
//!
//! Coordinates the operator-triggered flow: discovery → extraction →
//! chunking → upsert. Chunk ids are a pure function of the relative path
//! and chunk position, so re-running over an unchanged tree rewrites the
//! same records.

use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use signum_core::chunk::chunk_text_words;
use signum_core::extract::{infer_course_id_from_path, ContentExtractor};
use signum_core::index::{stable_chunk_id, VectorIndex};
use signum_core::models::{ChunkMetadata, IndexedChunk};

use crate::config::Config;
use crate::embedding::create_provider;
use crate::sources::{discover_source_files, relative_source_path};
use crate::sqlite_index::SqliteIndex;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub files_indexed: usize,
    pub chunks_indexed: usize,
}

/// Turn one file's raw content into index records.
pub fn build_chunks_for_file(
    extractor: &ContentExtractor,
    source_path: &str,
    raw: &str,
    config: &Config,
) -> Vec<IndexedChunk> {
    let doc = extractor.extract_file_text(source_path, raw);
    let course_id = doc
        .course_id
        .clone()
        .or_else(|| infer_course_id_from_path(source_path, &config.index.course_marker));
    let title = doc.title_hint.clone().unwrap_or_else(|| {
        Path::new(source_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| source_path.to_string())
    });

    chunk_text_words(&doc.text, config.rag.chunk_words, config.rag.chunk_overlap_words)
        .into_iter()
        .map(|chunk| IndexedChunk {
            doc_id: stable_chunk_id(source_path, chunk.chunk_index),
            text: chunk.text,
            metadata: ChunkMetadata {
                source_path: source_path.to_string(),
                title: title.clone(),
                course_id: course_id.clone(),
                module_id: doc.module_id.clone(),
            },
        })
        .collect()
}

/// Index every discovered file under `repo_root`.
///
/// With `dry_run` nothing is written and `index` may be `None`.
pub async fn build_index(
    repo_root: &Path,
    config: &Config,
    index: Option<&dyn VectorIndex>,
    dry_run: bool,
) -> Result<IndexStats> {
    let extractor = ContentExtractor::new()?;
    let files = discover_source_files(repo_root, &config.index)?;
    let mut stats = IndexStats::default();

    for path in &files {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read source file, skipped");
                continue;
            }
        };
        let raw = String::from_utf8_lossy(&bytes);
        let source_path = relative_source_path(repo_root, path);
        let chunks = build_chunks_for_file(&extractor, &source_path, &raw, config);
        if chunks.is_empty() {
            continue;
        }

        if !dry_run {
            if let Some(index) = index {
                index.upsert(&chunks).await?;
            }
        }

        tracing::debug!(path = %source_path, chunks = chunks.len(), "indexed file");
        stats.files_indexed += 1;
        stats.chunks_indexed += chunks.len();
    }

    Ok(stats)
}

/// `signum index`: build the SQLite index configured in `[rag]`.
pub async fn run_index(config: &Config, repo_root: Option<PathBuf>, dry_run: bool) -> Result<()> {
    let repo_root = repo_root.unwrap_or_else(|| config.index.repo_root.clone());

    if dry_run {
        let stats = build_index(&repo_root, config, None, true).await?;
        println!("index {} (dry-run)", repo_root.display());
        println!("  files found: {}", stats.files_indexed);
        println!("  estimated chunks: {}", stats.chunks_indexed);
        return Ok(());
    }

    let provider = create_provider(&config.embedding)?;
    let index = SqliteIndex::open(
        &config.rag.persist_dir,
        &config.rag.collection_name,
        Arc::clone(&provider),
    );
    let stats = build_index(&repo_root, config, Some(&index), false).await?;
    let total = index.count().await?;
    index.close().await;

    tracing::info!(
        files = stats.files_indexed,
        chunks = stats.chunks_indexed,
        "index build finished"
    );
    println!("index {}", repo_root.display());
    println!("  files indexed: {}", stats.files_indexed);
    println!("  chunks indexed: {}", stats.chunks_indexed);
    println!("  records in collection: {}", total);
    println!("ok");
    Ok(())
}
