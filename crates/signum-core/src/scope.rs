//! Scope gate: admission control in front of the paid language model.
//!
//! Rules are evaluated in order and the first match decides:
//!
//! | # | Rule | Outcome | Reason |
//! |---|------|---------|--------|
//! | 1 | empty message | admit | `empty_message` |
//! | 2 | page-intent phrase with 80+ chars of screen content | admit | `screen_page_intent` |
//! | 3 | platform or domain keyword | admit | `keyword_match` |
//! | 4 | no retrieval result | reject | `no_index_or_results` |
//! | 4 | best distance within threshold | admit | `rag_distance_ok:<d>` |
//! | 4 | best distance beyond threshold | reject | `rag_distance_low:<d>` |
//!
//! Rules 1-3 avoid an embedding query for obvious chatter. Rule 4 fails
//! closed: an absent or empty index never admits an unmatched message.

use std::fmt;
use std::sync::Arc;

use crate::retrieve::{Retrieval, Retriever};

/// Minimum trimmed screen length for a page-intent question to be admitted.
pub const MIN_SCREEN_CHARS_FOR_PAGE_INTENT: usize = 80;

pub const DEFAULT_IN_SCOPE_DISTANCE_THRESHOLD: f64 = 0.42;

/// Canned reply for rejected messages.
pub const OUT_OF_SCOPE_REPLY: &str = "I'm the Signum Learning assistant, so I can only help with \
questions about this platform and its courses (data structures, quizzes, coding challenges, \
certificates and your progress). Try asking about the lesson you're on!";

pub const PAGE_INTENT_PHRASES: &[&str] = &[
    "this page",
    "current page",
    "on this page",
    "this screen",
    "what does this page",
    "what is on this page",
    "what this page contain",
    "summarize this page",
    "summarise this page",
    "explain this page",
    "what am i seeing",
    "what is this about",
];

pub const PLATFORM_KEYWORDS: &[&str] = &[
    "signum",
    "signum learning",
    "platform",
    "this platform",
    "website",
    "app",
    "dashboard",
    "module",
    "lesson",
    "progress",
    "quiz",
    "coding challenge",
    "certificate",
    "nft",
    "solana",
    "phantom",
    "devnet",
    "anti-cheat",
    "assessment",
    "data structure",
    "data structures",
    "array",
    "linked list",
    "stack",
    "queue",
    "tree",
    "bst",
    "big o",
    "time complexity",
    "space complexity",
];

#[derive(Debug, Clone, PartialEq)]
pub enum ScopeReason {
    EmptyMessage,
    ScreenPageIntent,
    KeywordMatch,
    NoIndexOrResults,
    RagDistanceOk(f64),
    RagDistanceLow(f64),
}

impl fmt::Display for ScopeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeReason::EmptyMessage => write!(f, "empty_message"),
            ScopeReason::ScreenPageIntent => write!(f, "screen_page_intent"),
            ScopeReason::KeywordMatch => write!(f, "keyword_match"),
            ScopeReason::NoIndexOrResults => write!(f, "no_index_or_results"),
            ScopeReason::RagDistanceOk(d) => write!(f, "rag_distance_ok:{:.3}", d),
            ScopeReason::RagDistanceLow(d) => write!(f, "rag_distance_low:{:.3}", d),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScopeDecision {
    pub admitted: bool,
    pub reason: ScopeReason,
    /// Retrieval computed while deciding, reusable by the caller.
    pub retrieval: Option<Retrieval>,
}

impl ScopeDecision {
    fn short_circuit(reason: ScopeReason) -> Self {
        Self {
            admitted: true,
            reason,
            retrieval: None,
        }
    }
}

pub struct ScopeGate {
    retriever: Arc<Retriever>,
    threshold: f64,
}

impl ScopeGate {
    pub fn new(retriever: Arc<Retriever>, threshold: f64) -> Self {
        Self {
            retriever,
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub async fn in_scope(&self, message: &str, context: &str, screen_content: &str) -> ScopeDecision {
        let msg = message.trim().to_lowercase();
        if msg.is_empty() {
            return ScopeDecision::short_circuit(ScopeReason::EmptyMessage);
        }

        let screen = screen_content.trim();
        if screen.chars().count() >= MIN_SCREEN_CHARS_FOR_PAGE_INTENT
            && PAGE_INTENT_PHRASES.iter().any(|p| msg.contains(p))
        {
            return ScopeDecision::short_circuit(ScopeReason::ScreenPageIntent);
        }

        if PLATFORM_KEYWORDS.iter().any(|k| msg.contains(k)) {
            return ScopeDecision::short_circuit(ScopeReason::KeywordMatch);
        }

        let retrieval = self.retriever.retrieve(message, context, screen_content).await;
        let (admitted, reason) = match retrieval.best_distance {
            None => (false, ScopeReason::NoIndexOrResults),
            Some(d) if d <= self.threshold => (true, ScopeReason::RagDistanceOk(d)),
            Some(d) => (false, ScopeReason::RagDistanceLow(d)),
        };

        tracing::debug!(admitted, reason = %reason, "scope gate decided by retrieval");

        ScopeDecision {
            admitted,
            reason,
            retrieval: Some(retrieval),
        }
    }
}
