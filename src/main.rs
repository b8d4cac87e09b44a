//! # AgriVision CLI (`agv`)
//!
//! | Command | Description |
//! |---------|-------------|
//! | `agv serve` | Start the HTTP API |
//! | `agv ingest` | (Re)populate the vector index from the knowledge base |
//! | `agv ask "<question>"` | One-shot chatbot call, for smoke-testing credentials |
//!
//! All commands accept `--config` pointing to a TOML configuration file;
//! when the file is absent, built-in defaults apply and external endpoints
//! degrade to their "not available" responses. Secrets (`GROQ_API_KEY`,
//! `PINECONE_API_KEY`, `VOYAGE_API_KEY`, `EARTHENGINE_TOKEN`) come from the
//! environment.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use agrivision::{chat, config, ingest, server};

#[derive(Parser)]
#[command(
    name = "agv",
    about = "AgriVision backend - satellite field-health summaries and a RAG farming chatbot",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/agrivision.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Serves `GET /`, `GET /get_field_health`, and `POST /ask-chatbot` on
    /// the configured bind address with permissive CORS.
    Serve,

    /// Ingest the knowledge base into the vector index.
    ///
    /// Reads text files, chunks and embeds them, and upserts the vectors.
    /// Recreates the index when its dimension disagrees with the embedding
    /// model (destructive). Exits non-zero on any failure.
    Ingest {
        /// Show document and chunk counts without touching the index.
        #[arg(long)]
        dry_run: bool,
    },

    /// Ask the chatbot a single question and print the answer.
    Ask {
        /// The farming question.
        question: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        tracing::warn!(path = %cli.config.display(), "config file not found - using defaults");
        config::default_config()
    };

    match cli.command {
        Commands::Serve => {
            server::run_server(cfg).await?;
        }
        Commands::Ingest { dry_run } => {
            ingest::run_ingest(&cfg, dry_run).await?;
        }
        Commands::Ask { question } => {
            let chatbot = chat::Chatbot::initialize(&cfg).await;
            println!("{}", chatbot.ask(&question).await);
        }
    }

    Ok(())
}
