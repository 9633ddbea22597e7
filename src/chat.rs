//! AI tutor chat pipeline.
//!
//! Order matters: the scope gate runs first and an out-of-scope message
//! gets the canned reply without touching the daily quota or the model.
//! Admitted messages are counted against the quota, then answered from a
//! prompt that carries the page context, a screen excerpt, retrieved course
//! material, and the most recent conversation turns.
//!
//! Every outcome is a [`ChatReply`]. Refusals and model failures carry
//! `success: false`, a displayable `response`, and a machine-readable
//! `error` (`daily_limit_reached`, `quota_unavailable`, or the model error).
//!
//! Requests without a `user_id` share one daily bucket, so the limit then
//! acts as a budget for the whole tutor.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use signum_core::retrieve::{truncate_chars, RetrievedSource, Retriever};
use signum_core::scope::{ScopeGate, OUT_OF_SCOPE_REPLY};

use crate::config::LlmConfig;
use crate::llm::ChatModel;
use crate::quota::{QuotaDecision, QuotaGate};

pub const CHAT_ERROR_REPLY: &str = "Sorry, I encountered an error. Please try again.";
pub const DAILY_LIMIT_REPLY: &str =
    "The AI tutor has reached its daily usage limit. It will be available again tomorrow.";
pub const DAILY_LIMIT_ERROR: &str = "daily_limit_reached";
pub const QUOTA_UNAVAILABLE_ERROR: &str = "quota_unavailable";
const DEFAULT_PAGE_CONTEXT: &str = "General Learning";
/// Quota bucket for requests that name no user.
pub const SHARED_QUOTA_BUCKET: &str = "anonymous";

const TUTOR_SYSTEM_PROMPT: &str = "You are an AI tutor for Signum Learning Platform.

CRITICAL RESPONSE FORMAT - NEVER USE LONG PARAGRAPHS:

1. Start with ONE SHORT sentence (max 15 words) answering the question
2. Then use this structure:

**Key Points:**
• Bullet 1
• Bullet 2
• Bullet 3

**Quick Example:**
```
[code or simple example]
```

**Why It Matters:**
One sentence explanation

**Try This:** [Question to check understanding]

RULES:
❌ NO long paragraphs - NEVER more than 2 sentences in a row
❌ NO walls of text
❌ NO overly formal language
✅ Use bullets, numbered lists, code blocks
✅ Keep each point to 1-2 lines MAX
✅ Be conversational and friendly
✅ Use emojis for visual breaks (📌 💡 ⚠️)
";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HistoryMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

/// Every field but `message` may be absent or `null`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub screen_content: Option<String>,
    #[serde(default)]
    pub conversation_history: Option<Vec<HistoryMessage>>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl ChatRequest {
    pub fn page_context(&self) -> &str {
        self.context
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(DEFAULT_PAGE_CONTEXT)
    }

    pub fn screen(&self) -> &str {
        self.screen_content.as_deref().unwrap_or("")
    }

    pub fn history(&self) -> &[HistoryMessage] {
        self.conversation_history.as_deref().unwrap_or(&[])
    }

    pub fn quota_bucket(&self) -> &str {
        self.user_id
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(SHARED_QUOTA_BUCKET)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatReply {
    pub success: bool,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filtered: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<RetrievedSource>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatReply {
    fn out_of_scope() -> Self {
        Self {
            success: true,
            response: OUT_OF_SCOPE_REPLY.to_string(),
            filtered: Some("out_of_scope"),
            sources: None,
            context: None,
            model: None,
            error: None,
        }
    }

    fn failed(response: &str, error: String) -> Self {
        Self {
            success: false,
            response: response.to_string(),
            filtered: None,
            sources: None,
            context: None,
            model: None,
            error: Some(error),
        }
    }
}

/// Assemble the full tutor prompt.
pub fn build_tutor_prompt(
    message: &str,
    context: &str,
    screen_content: &str,
    course_material: &str,
    history: &[HistoryMessage],
    config: &LlmConfig,
) -> String {
    let screen = truncate_chars(screen_content, config.max_screen_chars);
    let screen = if screen.is_empty() {
        "No screen content provided"
    } else {
        screen
    };

    let mut prompt = format!(
        "{}\nCurrent Page Context: {}\nScreen Content: {}\n",
        TUTOR_SYSTEM_PROMPT, context, screen
    );

    if !course_material.is_empty() {
        prompt.push_str(&format!("\n\n**Relevant Course Material:**\n{}\n", course_material));
        prompt.push_str("Use this course material to answer the question accurately.\n");
    }

    prompt.push_str("\n\n");

    let skip = history.len().saturating_sub(config.history_messages);
    for turn in &history[skip..] {
        let role = if turn.role == "user" { "User" } else { "Assistant" };
        prompt.push_str(&format!("{}: {}\n", role, turn.content));
    }

    prompt.push_str(&format!("\nUser: {}\nAssistant:", message));
    prompt
}

pub struct TutorChat {
    gate: Arc<ScopeGate>,
    retriever: Arc<Retriever>,
    quota: Arc<QuotaGate>,
    model: Arc<dyn ChatModel>,
    config: LlmConfig,
}

impl TutorChat {
    pub fn new(
        gate: Arc<ScopeGate>,
        retriever: Arc<Retriever>,
        quota: Arc<QuotaGate>,
        model: Arc<dyn ChatModel>,
        config: LlmConfig,
    ) -> Self {
        Self {
            gate,
            retriever,
            quota,
            model,
            config,
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub async fn respond(&self, req: &ChatRequest) -> ChatReply {
        let context = req.page_context();
        let screen = req.screen();
        let decision = self.gate.in_scope(&req.message, context, screen).await;
        if !decision.admitted {
            tracing::info!(reason = %decision.reason, "chat message out of scope");
            return ChatReply::out_of_scope();
        }

        let user_id = req.quota_bucket();
        match self.quota.check(user_id).await {
            QuotaDecision::Exhausted(_) => {
                return ChatReply::failed(DAILY_LIMIT_REPLY, DAILY_LIMIT_ERROR.to_string());
            }
            QuotaDecision::DeniedOnFailure => {
                return ChatReply::failed(CHAT_ERROR_REPLY, QUOTA_UNAVAILABLE_ERROR.to_string());
            }
            QuotaDecision::Allowed(_) | QuotaDecision::AllowedOnFailure => {}
        }

        let retrieval = match decision.retrieval {
            Some(r) => r,
            None => self.retriever.retrieve(&req.message, context, screen).await,
        };

        let prompt = build_tutor_prompt(
            &req.message,
            context,
            screen,
            &retrieval.context_text,
            req.history(),
            &self.config,
        );

        match self.model.generate(&prompt).await {
            Ok(text) => {
                tracing::debug!(user_id, reason = %decision.reason, sources = retrieval.sources.len(), "chat answered");
                ChatReply {
                    success: true,
                    response: text,
                    filtered: None,
                    sources: Some(retrieval.sources),
                    context: Some(context.to_string()),
                    model: Some(self.model.model_name().to_string()),
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "chat model failed");
                ChatReply::failed(CHAT_ERROR_REPLY, e.to_string())
            }
        }
    }
}
