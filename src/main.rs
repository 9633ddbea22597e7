//! # Signum CLI (`signum`)
//!
//! ## Usage
//!
//! ```bash
//! signum --config ./config/signum.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `signum index` | Build or refresh the vector index from course content |
//! | `signum retrieve "<question>"` | Show the context block and sources for a question |
//! | `signum scope "<message>"` | Show the scope gate decision for a message |
//! | `signum serve` | Start the HTTP API |
//!
//! When the config file does not exist the built-in defaults are used.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use signum_core::index::VectorIndex;
use signum_core::retrieve::Retriever;
use signum_core::scope::ScopeGate;
use signum_tutor::config::{self, Config};
use signum_tutor::embedding::create_provider;
use signum_tutor::ingest::run_index;
use signum_tutor::server::run_server;
use signum_tutor::sqlite_index::SqliteIndex;

/// Signum tutor backend: course indexing, scoped AI chat, and assessments.
#[derive(Parser)]
#[command(name = "signum", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/signum.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index course content and project documents.
    ///
    /// Chunk ids are derived from path and position, so re-running over an
    /// unchanged tree overwrites the same records.
    Index {
        /// Repository root to index (overrides `[index].repo_root`).
        #[arg(long)]
        repo_root: Option<PathBuf>,

        /// Count files and chunks without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Retrieve course context for a question.
    Retrieve {
        question: String,

        /// Page context, e.g. "Data Structures - Arrays".
        #[arg(long, default_value = "")]
        context: String,

        /// Text currently visible on the learner's screen.
        #[arg(long, default_value = "")]
        screen: String,
    },

    /// Decide whether a chat message is in scope.
    Scope {
        message: String,

        #[arg(long, default_value = "")]
        context: String,

        #[arg(long, default_value = "")]
        screen: String,
    },

    /// Start the HTTP server.
    Serve,
}

fn load_or_default(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        return config::load_config(path);
    }
    tracing::debug!(path = %path.display(), "config file not found, using defaults");
    let mut cfg = Config::minimal();
    cfg.apply_env(std::env::vars())?;
    cfg.validate()?;
    Ok(cfg)
}

fn open_retriever(cfg: &Config) -> anyhow::Result<Arc<Retriever>> {
    let provider = create_provider(&cfg.embedding)?;
    let index: Arc<dyn VectorIndex> = Arc::new(SqliteIndex::open(
        &cfg.rag.persist_dir,
        &cfg.rag.collection_name,
        provider,
    ));
    Ok(Arc::new(Retriever::new(index, cfg.rag.retrieval_settings())?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_or_default(&cli.config)?;

    match cli.command {
        Commands::Index { repo_root, dry_run } => {
            run_index(&cfg, repo_root, dry_run).await?;
        }
        Commands::Retrieve {
            question,
            context,
            screen,
        } => {
            let retriever = open_retriever(&cfg)?;
            let retrieval = retriever.retrieve(&question, &context, &screen).await;
            if retrieval.sources.is_empty() {
                println!("No course material found.");
            } else {
                for source in &retrieval.sources {
                    println!(
                        "[{}] {:.3}  {}  {}",
                        source.source_id, source.distance, source.title, source.path
                    );
                }
                println!();
                println!("{}", retrieval.context_text);
            }
        }
        Commands::Scope {
            message,
            context,
            screen,
        } => {
            let retriever = open_retriever(&cfg)?;
            let gate = ScopeGate::new(retriever, cfg.rag.in_scope_distance_threshold);
            let decision = gate.in_scope(&message, &context, &screen).await;
            println!("admitted: {}", decision.admitted);
            println!("reason: {}", decision.reason);
        }
        Commands::Serve => {
            run_server(&cfg).await?;
        }
    }

    Ok(())
}
