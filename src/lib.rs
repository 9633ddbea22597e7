//! # Signum Tutor
//!
//! Backend for the Signum learning platform's AI tutor and assessments.
//!
//! Course content is indexed into a local SQLite vector store. Chat messages
//! pass a scope gate before they reach the model, and admitted messages are
//! answered with retrieved course material. Quizzes and coding challenges
//! run as time-boxed, single-use sessions scored on the server.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────────┐
//! │ Course files │──▶│ Extract+Chunk│──▶│ SQLite index   │
//! │ + docs       │   │ +Embed       │   │ (rag_storage)  │
//! └──────────────┘   └──────────────┘   └──────┬────────┘
//!                                              │
//!                    ┌─────────────────────────┤
//!                    ▼                         ▼
//!              ┌────────────┐           ┌────────────┐
//!              │ Scope gate │──admit──▶ │ Tutor chat │
//!              └────────────┘           └────────────┘
//!
//!   Quiz / coding engines ── sessions, scoring, anti-cheat ── HTTP
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! signum index --dry-run            # count files and chunks
//! signum index                      # build the vector index
//! signum scope "what is a stack?"   # check the gate decision
//! signum serve                      # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`sources`] | Discovery of files to index |
//! | [`ingest`] | Index build pipeline |
//! | [`embedding`] | Embedding providers (OpenAI, Ollama, fastembed) |
//! | [`sqlite_index`] | Persistent vector index |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`llm`] | Chat model (Gemini) |
//! | [`quota`] | Daily AI usage allowance |
//! | [`chat`] | Scoped tutor chat pipeline |
//! | [`execution`] | Piston code execution |
//! | [`ledger`] | Record and history of scored attempts |
//! | [`server`] | HTTP API |

pub mod chat;
pub mod config;
pub mod db;
pub mod embedding;
pub mod execution;
pub mod ingest;
pub mod ledger;
pub mod llm;
pub mod migrate;
pub mod quota;
pub mod server;
pub mod sources;
pub mod sqlite_index;
