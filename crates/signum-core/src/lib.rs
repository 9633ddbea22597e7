//! # Signum Core
//!
//! Storage-agnostic logic for the Signum tutor backend: content extraction,
//! word-window chunking, the vector index abstraction, retrieval, the scope
//! gate, the quiz and coding session engines with their anti-cheat
//! penalty model, and violation reporting with progressive lockouts.
//!
//! This crate contains no sqlx, HTTP, or filesystem I/O. The `signum-tutor`
//! app crate provides the persistent index, embedding backends, and the
//! network-facing collaborators.

pub mod anti_cheat;
pub mod chunk;
pub mod coding;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod models;
pub mod quiz;
pub mod retrieve;
pub mod scope;
pub mod session;
pub mod violations;
