//! Core data models shared by indexing, retrieval, and assessment.
//!
//! | Type | Lifetime |
//! |------|----------|
//! | [`ExtractedDoc`] | Produced per file during an index build, never persisted |
//! | [`ChunkMetadata`] | Stored alongside every indexed chunk |
//! | [`IndexedChunk`] | One record in the vector index |
//! | [`QuestionBankEntry`] | Immutable, loaded at start |
//! | [`PublicQuestion`] | Answer-free projection sent to clients |

use serde::{Deserialize, Serialize};

/// Result of running a source file through the content extractor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedDoc {
    pub text: String,
    pub course_id: Option<String>,
    pub module_id: Option<String>,
    pub title_hint: Option<String>,
}

/// Metadata attached to every chunk in the vector index.
///
/// `course_id` and `module_id` are omitted entirely when unknown so that
/// equality filters never match on an empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_path: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
}

/// A chunk ready to be written to a [`VectorIndex`](crate::index::VectorIndex).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedChunk {
    pub doc_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Medium,
    High,
}

impl Difficulty {
    /// Points added to the difficulty tally for a correct answer.
    pub fn weight(self) -> u32 {
        match self {
            Difficulty::Medium => 1,
            Difficulty::High => 2,
        }
    }
}

/// A multiple-choice question including its answer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionBankEntry {
    pub id: String,
    pub topic: String,
    pub difficulty: Difficulty,
    pub question: String,
    pub options: Vec<String>,
    pub correct: usize,
    pub explanation: String,
}

impl QuestionBankEntry {
    pub fn public_view(&self) -> PublicQuestion {
        PublicQuestion {
            id: self.id.clone(),
            topic: self.topic.clone(),
            difficulty: self.difficulty,
            question: self.question.clone(),
            options: self.options.clone(),
        }
    }
}

/// What a client sees of a question before the session is scored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicQuestion {
    pub id: String,
    pub topic: String,
    pub difficulty: Difficulty,
    pub question: String,
    pub options: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_omits_missing_ids() {
        let meta = ChunkMetadata {
            source_path: "README.md".to_string(),
            title: "README.md".to_string(),
            course_id: None,
            module_id: None,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json.get("course_id").is_none());
        assert!(json.get("module_id").is_none());
    }

    #[test]
    fn test_public_view_has_no_answer_key() {
        let entry = QuestionBankEntry {
            id: "ds_1".to_string(),
            topic: "Arrays".to_string(),
            difficulty: Difficulty::High,
            question: "Q?".to_string(),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct: 2,
            explanation: "because".to_string(),
        };
        let json = serde_json::to_value(entry.public_view()).unwrap();
        assert!(json.get("correct").is_none());
        assert!(json.get("explanation").is_none());
        assert_eq!(json["difficulty"], "High");
    }
}
