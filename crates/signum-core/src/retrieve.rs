//! Retrieval of course material for an admitted chat question.
//!
//! The retriever infers an optional course/module filter from the page the
//! learner is on, queries the [`VectorIndex`], and assembles an LLM-ready
//! context block:
//!
//! ```text
//! [SCREEN] Current screen context (may be partial):
//! <screen content, capped>
//!
//! [S1] <title>
//! Path: <source path>
//! Content:
//! <chunk text>
//! ```
//!
//! Retrieval fails soft: a missing index or a query error yields an empty
//! [`Retrieval`] rather than an error. Deciding what an empty result means
//! is the caller's job (the scope gate treats it as a rejection).

use std::sync::Arc;

use anyhow::Result;
use regex::Regex;
use serde::Serialize;

use crate::extract::{COURSE_ATTR_PATTERN, MODULE_ATTR_PATTERN};
use crate::index::{safe_where_filter, VectorIndex};

/// Course ids recognised from free-text page context, with their aliases.
pub const KNOWN_COURSES: &[(&str, &[&str])] =
    &[("data-structures", &["data structures", "data-structures"])];

const SCREEN_HEADER: &str = "[SCREEN] Current screen context (may be partial):";
const UNTITLED_SOURCE: &str = "Source";

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub max_screen_chars: usize,
    pub max_context_chars: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_screen_chars: 1500,
            max_context_chars: 6000,
        }
    }
}

/// One cited source, numbered `S1..Sk` in rank order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedSource {
    #[serde(rename = "id")]
    pub source_id: String,
    pub title: String,
    pub path: String,
    pub distance: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Retrieval {
    pub context_text: String,
    pub sources: Vec<RetrievedSource>,
    /// Smallest distance among hits; `None` when nothing was retrieved.
    pub best_distance: Option<f64>,
}

pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    settings: RetrievalSettings,
    course_attr: Regex,
    module_attr: Regex,
}

impl Retriever {
    pub fn new(index: Arc<dyn VectorIndex>, settings: RetrievalSettings) -> Result<Self> {
        Ok(Self {
            index,
            settings,
            course_attr: Regex::new(COURSE_ATTR_PATTERN)?,
            module_attr: Regex::new(MODULE_ATTR_PATTERN)?,
        })
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    pub async fn index_available(&self) -> bool {
        self.index.is_available().await
    }

    /// Course and module to filter on, given the page the learner is viewing.
    ///
    /// A known course named in `context` wins. Otherwise the first
    /// `courseId`/`moduleId` props found in `screen_content` are used.
    pub fn infer_course_and_module(
        &self,
        context: &str,
        screen_content: &str,
    ) -> (Option<String>, Option<String>) {
        let ctx = context.to_lowercase();
        for (course_id, aliases) in KNOWN_COURSES {
            if aliases.iter().any(|a| ctx.contains(a)) {
                return (Some(course_id.to_string()), None);
            }
        }

        let grab = |re: &Regex| {
            re.captures(screen_content)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        };
        (grab(&self.course_attr), grab(&self.module_attr))
    }

    pub async fn retrieve(&self, question: &str, context: &str, screen_content: &str) -> Retrieval {
        if question.is_empty() || !self.index.is_available().await {
            return Retrieval::default();
        }

        let (course_id, module_id) = self.infer_course_and_module(context, screen_content);
        let filter = safe_where_filter(course_id.as_deref(), module_id.as_deref());

        let hits = match self
            .index
            .query(question, self.settings.top_k, filter.as_ref())
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, "vector index query failed; continuing without context");
                return Retrieval::default();
            }
        };

        let mut blocks = Vec::with_capacity(hits.len() + 1);
        let mut sources = Vec::with_capacity(hits.len());
        let mut best_distance: Option<f64> = None;

        for (i, hit) in hits.iter().enumerate() {
            if best_distance.map_or(true, |best| hit.distance < best) {
                best_distance = Some(hit.distance);
            }
            let title = if hit.metadata.title.is_empty() {
                UNTITLED_SOURCE.to_string()
            } else {
                hit.metadata.title.clone()
            };
            let source_id = format!("S{}", i + 1);
            blocks.push(format!(
                "[{}] {}\nPath: {}\nContent:\n{}\n",
                source_id, title, hit.metadata.source_path, hit.document
            ));
            sources.push(RetrievedSource {
                source_id,
                title,
                path: hit.metadata.source_path.clone(),
                distance: hit.distance,
            });
        }

        let screen = truncate_chars(screen_content, self.settings.max_screen_chars);
        if !screen.is_empty() {
            blocks.insert(0, format!("{}\n{}\n", SCREEN_HEADER, screen));
        }

        let context_text =
            truncate_chars(&blocks.join("\n\n"), self.settings.max_context_chars).to_string();

        tracing::debug!(
            hits = sources.len(),
            best_distance = ?best_distance,
            course_id = ?course_id,
            "retrieval complete"
        );

        Retrieval {
            context_text,
            sources,
            best_distance,
        }
    }
}

/// The first `max_chars` characters of `s`.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::{HashingEmbedder, InMemoryIndex};
    use crate::index::{stable_chunk_id, MetadataFilter, QueryHit};
    use crate::models::{ChunkMetadata, IndexedChunk};
    use async_trait::async_trait;

    fn chunk(path: &str, title: &str, text: &str, course: Option<&str>) -> IndexedChunk {
        IndexedChunk {
            doc_id: stable_chunk_id(path, 0),
            text: text.to_string(),
            metadata: ChunkMetadata {
                source_path: path.to_string(),
                title: title.to_string(),
                course_id: course.map(String::from),
                module_id: None,
            },
        }
    }

    async fn seeded() -> Arc<InMemoryIndex> {
        let idx = Arc::new(InMemoryIndex::new(Arc::new(HashingEmbedder { dims: 128 })));
        idx.upsert(&[
            chunk(
                "frontend/src/courses/data-structures/StacksContent.jsx",
                "Stacks",
                "a stack pushes and pops from the top",
                Some("data-structures"),
            ),
            chunk("README.md", "Signum Learning", "certificates are minted on devnet", None),
        ])
        .await
        .unwrap();
        idx
    }

    fn retriever(index: Arc<dyn VectorIndex>) -> Retriever {
        Retriever::new(index, RetrievalSettings::default()).unwrap()
    }

    struct FailingIndex;

    #[async_trait]
    impl VectorIndex for FailingIndex {
        async fn is_available(&self) -> bool {
            true
        }
        async fn upsert(&self, _chunks: &[IndexedChunk]) -> Result<()> {
            Ok(())
        }
        async fn query(
            &self,
            _query_text: &str,
            _k: usize,
            _filter: Option<&MetadataFilter>,
        ) -> Result<Vec<QueryHit>> {
            anyhow::bail!("backend unreachable")
        }
        async fn count(&self) -> Result<usize> {
            Ok(0)
        }
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[tokio::test]
    async fn test_infer_from_context_alias() {
        let r = retriever(seeded().await);
        assert_eq!(
            r.infer_course_and_module("Course: Data Structures > Stacks", "courseId=\"x\""),
            (Some("data-structures".to_string()), None)
        );
    }

    #[tokio::test]
    async fn test_infer_from_screen_props() {
        let r = retriever(seeded().await);
        let screen = r#"<CompletionTracker courseId="algorithms" moduleId="sorting" />"#;
        assert_eq!(
            r.infer_course_and_module("", screen),
            (Some("algorithms".to_string()), Some("sorting".to_string()))
        );
        assert_eq!(r.infer_course_and_module("home", "plain"), (None, None));
    }

    #[tokio::test]
    async fn test_empty_question_returns_nothing() {
        let r = retriever(seeded().await);
        assert_eq!(r.retrieve("", "", "screen").await, Retrieval::default());
    }

    #[tokio::test]
    async fn test_unavailable_index_returns_nothing() {
        let empty = Arc::new(InMemoryIndex::new(Arc::new(HashingEmbedder { dims: 8 })));
        let r = retriever(empty);
        let out = r.retrieve("what is a stack", "", "").await;
        assert_eq!(out.best_distance, None);
        assert!(out.sources.is_empty());
        assert!(out.context_text.is_empty());
    }

    #[tokio::test]
    async fn test_query_error_fails_soft() {
        let r = retriever(Arc::new(FailingIndex));
        assert_eq!(r.retrieve("stack", "", "").await, Retrieval::default());
    }

    #[tokio::test]
    async fn test_blocks_are_numbered_and_formatted() {
        let r = retriever(seeded().await);
        let out = r.retrieve("stack push pop top", "", "").await;
        assert_eq!(out.sources.len(), 2);
        assert_eq!(out.sources[0].source_id, "S1");
        assert_eq!(out.sources[0].title, "Stacks");
        assert_eq!(out.sources[1].source_id, "S2");
        assert!(out.context_text.starts_with(
            "[S1] Stacks\nPath: frontend/src/courses/data-structures/StacksContent.jsx\nContent:\n"
        ));
        assert!(out.context_text.contains("\n\n[S2] Signum Learning\n"));
        assert_eq!(out.best_distance, Some(out.sources[0].distance));
    }

    #[tokio::test]
    async fn test_context_filter_narrows_hits() {
        let r = retriever(seeded().await);
        let out = r.retrieve("stack", "data structures course", "").await;
        assert_eq!(out.sources.len(), 1);
        assert_eq!(out.sources[0].title, "Stacks");
    }

    #[tokio::test]
    async fn test_screen_block_first_and_capped() {
        let index = seeded().await;
        let r = Retriever::new(
            index,
            RetrievalSettings {
                top_k: 5,
                max_screen_chars: 4,
                max_context_chars: 6000,
            },
        )
        .unwrap();
        let out = r.retrieve("stack", "", "abcdefgh").await;
        assert!(out
            .context_text
            .starts_with("[SCREEN] Current screen context (may be partial):\nabcd\n\n\n[S1]"));
    }

    #[tokio::test]
    async fn test_whole_context_capped() {
        let index = seeded().await;
        let r = Retriever::new(
            index,
            RetrievalSettings {
                top_k: 5,
                max_screen_chars: 1500,
                max_context_chars: 20,
            },
        )
        .unwrap();
        let out = r.retrieve("stack", "", "").await;
        assert_eq!(out.context_text.chars().count(), 20);
        assert_eq!(out.sources.len(), 2);
    }
}
