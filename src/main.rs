//! # docqa CLI
//!
//! Runs the web application and a few maintenance commands against the same
//! configuration file.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa init` | Create the SQLite database and tables |
//! | `docqa serve` | Start the web server |
//! | `docqa analyze <file> --query "<q>"` | Answer a question about a local file |
//! | `docqa documents <username>` | List a user's uploads |
//!
//! ## Examples
//!
//! ```bash
//! docqa init --config ./config/docqa.toml
//! docqa serve --config ./config/docqa.toml
//! docqa analyze ./notes.txt --query "When is the deadline?"
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docqa::analysis::Analyzer;
use docqa::{auth, config, db, migrate, pipeline, server, upload};

/// Login-gated document question answering.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docqa.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "docqa", about = "Upload a document and ask questions about it", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Start the web server on `[server].bind`.
    Serve,

    /// Answer a question about a PDF or text file without storing it.
    Analyze {
        /// Path to the document.
        file: PathBuf,

        /// The question to ask.
        #[arg(long)]
        query: String,
    },

    /// List the documents a user has uploaded, newest first.
    Documents {
        username: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Analyze { file, query } => {
            let analyzer = Analyzer::from_config(&cfg)?;
            let analysis = pipeline::answer_path(&analyzer, &file, &query).await?;
            println!("{}", analysis.response);
        }
        Commands::Documents { username } => {
            let pool = db::connect(&cfg).await?;
            let Some(user) = auth::find_user(&pool, &username).await? else {
                anyhow::bail!("No such user: {}", username);
            };
            let docs = upload::list_documents(&pool, user.id).await?;
            if docs.is_empty() {
                println!("No documents.");
            }
            for doc in docs {
                let when = chrono::DateTime::from_timestamp(doc.created_at, 0)
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                let short_hash: String = doc.content_hash.chars().take(12).collect();
                println!("{:>5}  {}  {}  {}", doc.id, when, short_hash, doc.filename);
            }
            pool.close().await;
        }
    }

    Ok(())
}
