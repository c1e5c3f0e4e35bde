//! # Mindwell CLI
//!
//! The `mindwell` binary covers setup, corpus ingestion, debug retrieval,
//! and running the HTTP service.
//!
//! ## Usage
//!
//! ```bash
//! mindwell --config ./mindwell.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mindwell init` | Write a starter config and create the application database |
//! | `mindwell ingest` | Build or extend the knowledge store from the corpus directory |
//! | `mindwell search "<query>"` | Debug retrieval against the knowledge store |
//! | `mindwell serve` | Run the HTTP service |
//!
//! ## Examples
//!
//! ```bash
//! # One-time setup
//! mindwell init
//!
//! # Build the knowledge base from self-help material
//! mindwell ingest --corpus ./corpus
//!
//! # Rebuild it from scratch
//! mindwell ingest --reset
//!
//! # Check what retrieval returns for a query
//! mindwell search "dealing with insomnia" --top-k 5
//!
//! # Serve the API (requires the knowledge store and credentials)
//! MINDWELL_AUTH_SECRET=... GEMINI_API_KEY=... mindwell serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use mindwell::{config, db, ingest, migrate, search, server};

/// Mindwell — a mental-health journaling service with a retrieval-augmented
/// wellness assistant.
#[derive(Parser)]
#[command(
    name = "mindwell",
    about = "Mindwell — journaling, mood tracking, and a retrieval-augmented wellness assistant",
    version,
    long_about = "Mindwell persists mood and journal entries (annotated with LLM-derived \
    sentiment), maintains per-user chat history, and answers chat messages by combining a \
    persisted vector knowledge base with the user's recent context in a single LLM call."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./mindwell.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration and create the application database.
    ///
    /// Idempotent: an existing config file is left untouched and migrations
    /// are safe to re-run.
    Init,

    /// Ingest the corpus into the knowledge store.
    ///
    /// Scans the corpus directory for text, markdown, and PDF files, chunks
    /// and embeds them, and persists the chunks. Additive by default.
    Ingest {
        /// Corpus directory (defaults to `[corpus].root` from config).
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// Drop all existing chunks before ingesting.
        #[arg(long)]
        reset: bool,
    },

    /// Run a retrieval query against the knowledge store and print ranked
    /// results with scores and snippets.
    Search {
        /// The query string.
        query: String,

        /// Number of results to return (defaults to `[knowledge].top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Run the HTTP service.
    ///
    /// Refuses to start when the knowledge store is missing or when the
    /// LLM/auth credentials named in the config are not set.
    Serve {
        /// Override `[server].host`.
        #[arg(long)]
        host: Option<String>,

        /// Override `[server].port`.
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // `init` bootstraps the config file itself; everything else requires it.
    if let Commands::Init = cli.command {
        return run_init(&cli.config).await;
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => unreachable!(),
        Commands::Ingest { corpus, reset } => {
            ingest::run_ingest(&cfg, corpus, reset).await?;
        }
        Commands::Search { query, top_k } => {
            search::run_search(&cfg, &query, top_k).await?;
        }
        Commands::Serve { host, port } => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                )
                .init();
            server::run_server(&cfg, host, port).await?;
        }
    }

    Ok(())
}

async fn run_init(config_path: &PathBuf) -> anyhow::Result<()> {
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
    } else {
        std::fs::write(config_path, config::starter_toml())?;
        println!("Wrote starter config to {}", config_path.display());
    }

    let cfg = config::load_config(config_path)?;
    let pool = db::connect(&cfg.database.path).await?;
    migrate::run_migrations(&pool).await?;
    pool.close().await;
    println!("Database initialized at {}", cfg.database.path.display());
    println!("Next: put self-help material in {} and run `mindwell ingest`.", cfg.corpus.root.display());
    Ok(())
}
