//! TOML configuration with environment overrides.
//!
//! Every section has defaults, so an empty file (or [`Config::minimal`])
//! yields a runnable server. After parsing, the `RAG_*`,
//! `QUIZ_TIME_LIMIT_SECS`, and `CODING_TIME_LIMIT_SECS` environment
//! variables override the file, then [`Config::validate`] runs.
//!
//! | Section | Purpose |
//! |---------|---------|
//! | `[server]` | HTTP bind address |
//! | `[rag]` | Index location, chunking, retrieval caps, scope threshold |
//! | `[index]` | Which files the indexer reads |
//! | `[embedding]` | Embedding provider (`disabled`, `openai`, `ollama`, `local`) |
//! | `[llm]` | Chat model provider (`disabled`, `gemini`) |
//! | `[assessment]` | Session time limits, pass marks, question bank, attempt log |
//! | `[execution]` | Remote code-execution sandbox |
//! | `[quota]` | Daily AI request allowance |

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use signum_core::retrieve::RetrievalSettings;
use signum_core::scope::DEFAULT_IN_SCOPE_DISTANCE_THRESHOLD;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub assessment: AssessmentConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RagConfig {
    pub persist_dir: PathBuf,
    pub collection_name: String,
    pub chunk_words: i64,
    pub chunk_overlap_words: i64,
    pub top_k: usize,
    pub in_scope_distance_threshold: f64,
    pub max_screen_chars: usize,
    pub max_context_chars: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            persist_dir: PathBuf::from("./data/rag_storage"),
            collection_name: "signum_rag".to_string(),
            chunk_words: 450,
            chunk_overlap_words: 60,
            top_k: 5,
            in_scope_distance_threshold: DEFAULT_IN_SCOPE_DISTANCE_THRESHOLD,
            max_screen_chars: 1500,
            max_context_chars: 6000,
        }
    }
}

impl RagConfig {
    pub fn retrieval_settings(&self) -> RetrievalSettings {
        RetrievalSettings {
            top_k: self.top_k,
            max_screen_chars: self.max_screen_chars,
            max_context_chars: self.max_context_chars,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexConfig {
    /// Repository the relative paths below are resolved against.
    pub repo_root: PathBuf,
    pub course_dirs: Vec<String>,
    /// File extensions (without the dot) picked up inside `course_dirs`.
    pub extensions: Vec<String>,
    /// Individual documents indexed when they exist.
    pub doc_files: Vec<String>,
    pub exclude_globs: Vec<String>,
    /// Directory name whose next path segment is the course id.
    pub course_marker: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            repo_root: PathBuf::from("."),
            course_dirs: vec!["frontend/src/courses".to_string()],
            extensions: ["jsx", "tsx", "md", "js", "ts"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            doc_files: [
                "README.md",
                "AI_IMPLEMENTATION.md",
                "BACKEND.md",
                "FRONTEND.md",
                "ANTI_CHEAT_SYSTEM.md",
                "BLOCKCHAIN_CERTIFICATE_SYSTEM.md",
                "DATABASE_SCHEMA.md",
                "INTERACTIVE_LEARNING.md",
                "backend/BACKEND_TESTING.md",
                "backend/DOCKER_GUIDE.md",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            exclude_globs: Vec::new(),
            course_marker: "courses".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Prior conversation turns included in the prompt.
    pub history_messages: usize,
    /// Screen excerpt length included in the prompt.
    pub max_screen_chars: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: "gemini-2.5-flash".to_string(),
            timeout_secs: 60,
            max_retries: 2,
            history_messages: 3,
            max_screen_chars: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AssessmentConfig {
    pub quiz_time_limit_secs: i64,
    pub coding_time_limit_secs: i64,
    pub grace_secs: i64,
    pub quiz_pass_score: u32,
    pub coding_pass_score: f64,
    pub default_num_questions: usize,
    pub default_problem_id: String,
    /// JSON question bank replacing the built-in one.
    pub question_bank: Option<PathBuf>,
    /// JSON-lines file that scored attempts are appended to.
    pub attempts_log: Option<PathBuf>,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            quiz_time_limit_secs: 900,
            coding_time_limit_secs: 1800,
            grace_secs: 30,
            quiz_pass_score: 85,
            coding_pass_score: 50.0,
            default_num_questions: 10,
            default_problem_id: "factorial".to_string(),
            question_bank: None,
            attempts_log: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Piston `execute` endpoint.
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            url: "https://emkc.org/api/v2/piston/execute".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct QuotaConfig {
    /// AI chat requests allowed per user per UTC day.
    pub daily_limit: u32,
    /// `"allow"` or `"deny"` when the counter itself cannot be read.
    pub on_failure: String,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_limit: 50,
            on_failure: "allow".to_string(),
        }
    }
}

impl Config {
    /// Defaults for every section, used when no config file is present.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Apply environment overrides from `vars`.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
            value
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("{} has an invalid value: '{}'", key, value))
        }

        for (key, value) in vars {
            match key.as_str() {
                "RAG_EMBED_MODEL" => self.embedding.model = Some(value),
                "RAG_PERSIST_DIR" => self.rag.persist_dir = PathBuf::from(value),
                "RAG_COLLECTION" => self.rag.collection_name = value,
                "RAG_CHUNK_WORDS" => self.rag.chunk_words = parse(&key, &value)?,
                "RAG_CHUNK_OVERLAP_WORDS" => self.rag.chunk_overlap_words = parse(&key, &value)?,
                "RAG_TOP_K" => self.rag.top_k = parse(&key, &value)?,
                "RAG_IN_SCOPE_DISTANCE_THRESHOLD" => {
                    self.rag.in_scope_distance_threshold = parse(&key, &value)?
                }
                "RAG_MAX_SCREEN_CHARS" => self.rag.max_screen_chars = parse(&key, &value)?,
                "RAG_MAX_CONTEXT_CHARS" => self.rag.max_context_chars = parse(&key, &value)?,
                "QUIZ_TIME_LIMIT_SECS" => {
                    self.assessment.quiz_time_limit_secs = parse(&key, &value)?
                }
                "CODING_TIME_LIMIT_SECS" => {
                    self.assessment.coding_time_limit_secs = parse(&key, &value)?
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.rag.top_k == 0 {
            bail!("rag.top_k must be >= 1");
        }
        if !(0.0..=2.0).contains(&self.rag.in_scope_distance_threshold) {
            bail!("rag.in_scope_distance_threshold must be in [0.0, 2.0]");
        }
        if self.rag.collection_name.trim().is_empty() {
            bail!("rag.collection_name must not be empty");
        }
        if self.assessment.quiz_time_limit_secs <= 0 || self.assessment.coding_time_limit_secs <= 0 {
            bail!("assessment time limits must be > 0");
        }
        if self.assessment.grace_secs < 0 {
            bail!("assessment.grace_secs must be >= 0");
        }
        if self.assessment.quiz_pass_score > 100 {
            bail!("assessment.quiz_pass_score must be <= 100");
        }
        if self.assessment.default_num_questions == 0 {
            bail!("assessment.default_num_questions must be >= 1");
        }

        if self.embedding.is_enabled() && self.embedding.provider != "local" {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
        }

        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" | "local" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
                other
            ),
        }

        match self.llm.provider.as_str() {
            "disabled" | "gemini" => {}
            other => bail!(
                "Unknown llm provider: '{}'. Must be disabled or gemini.",
                other
            ),
        }

        match self.quota.on_failure.as_str() {
            "allow" | "deny" => {}
            other => bail!("quota.on_failure must be 'allow' or 'deny', got '{}'", other),
        }

        Ok(())
    }
}

/// Read, parse, apply process environment overrides, and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.apply_env(std::env::vars())?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.rag.chunk_words, 450);
        assert_eq!(config.rag.chunk_overlap_words, 60);
        assert_eq!(config.rag.top_k, 5);
        assert_eq!(config.rag.in_scope_distance_threshold, 0.42);
        assert_eq!(config.assessment.quiz_time_limit_secs, 900);
        assert_eq!(config.assessment.coding_time_limit_secs, 1800);
        assert_eq!(config.llm.history_messages, 3);
        assert_eq!(config.quota.daily_limit, 50);
        assert_eq!(config.index.course_dirs, vec!["frontend/src/courses"]);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
[rag]
top_k = 8

[server]
bind = "0.0.0.0:9000"
"#,
        )
        .unwrap();
        assert_eq!(config.rag.top_k, 8);
        assert_eq!(config.rag.max_context_chars, 6000);
        assert_eq!(config.server.bind, "0.0.0.0:9000");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::minimal();
        config
            .apply_env(vars(&[
                ("RAG_TOP_K", "3"),
                ("RAG_IN_SCOPE_DISTANCE_THRESHOLD", "0.5"),
                ("RAG_PERSIST_DIR", "/tmp/idx"),
                ("RAG_EMBED_MODEL", "bge-small-en-v1.5"),
                ("QUIZ_TIME_LIMIT_SECS", "600"),
                ("PATH", "/usr/bin"),
            ]))
            .unwrap();
        assert_eq!(config.rag.top_k, 3);
        assert_eq!(config.rag.in_scope_distance_threshold, 0.5);
        assert_eq!(config.rag.persist_dir, PathBuf::from("/tmp/idx"));
        assert_eq!(config.embedding.model.as_deref(), Some("bge-small-en-v1.5"));
        assert_eq!(config.assessment.quiz_time_limit_secs, 600);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = Config::minimal();
        let err = config.apply_env(vars(&[("RAG_TOP_K", "many")])).unwrap_err();
        assert!(err.to_string().contains("RAG_TOP_K"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::minimal();
        config.rag.top_k = 0;
        assert!(config.validate().is_err());

        let mut config = Config::minimal();
        config.rag.in_scope_distance_threshold = 2.5;
        assert!(config.validate().is_err());

        let mut config = Config::minimal();
        config.embedding.provider = "cohere".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));

        let mut config = Config::minimal();
        config.embedding.provider = "openai".to_string();
        config.embedding.model = Some("text-embedding-3-small".to_string());
        assert!(config.validate().is_err(), "dims missing");

        let mut config = Config::minimal();
        config.llm.provider = "gpt".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_local_provider_needs_no_dims() {
        let mut config = Config::minimal();
        config.embedding.provider = "local".to_string();
        config.validate().unwrap();
    }
}
