//! # docquery CLI (`docq`)
//!
//! Commands for index initialization, document indexing, one-shot and
//! interactive querying, and the HTTP server.
//!
//! ```bash
//! docq --config ./config/docq.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docq init` | Create the MySQL schema (text backend with the mysql store) |
//! | `docq index <file>` | Index a PDF under the configured update policy |
//! | `docq ask <file> "<query>"` | Index, run one query, print the answer |
//! | `docq chat <file>` | Index, then loop reading queries until `q` |
//! | `docq serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docquery::{config, repl, server, store_sql};

/// docquery — a configurable PDF retrieval and answering pipeline.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docq.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docq",
    about = "docquery — a configurable PDF retrieval and answering pipeline",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docq.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the chunk table in the MySQL-compatible store. Idempotent.
    /// A no-op for the in-memory store.
    Init,

    /// Index a PDF document.
    ///
    /// Runs Loader → (Chunker) → Indexer under the configured update
    /// policy without answering anything.
    Index {
        /// Path to the PDF file.
        file: PathBuf,
    },

    /// Index a PDF and answer a single query.
    Ask {
        /// Path to the PDF file.
        file: PathBuf,
        /// The query string.
        query: String,
    },

    /// Index a PDF, then answer queries interactively until `q`.
    Chat {
        /// Path to the PDF file.
        file: PathBuf,
    },

    /// Start the HTTP server.
    ///
    /// Exposes upload, query, single-shot process, and question-generation
    /// endpoints on the configured bind address.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            if cfg.store.backend == "mysql" {
                config::check_store_preconditions(&cfg)?;
                let db = cfg
                    .database
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("mysql store requires a [database] section"))?;
                let store = store_sql::SqlStore::connect(db, &cfg.store.table).await?;
                store.migrate().await?;
                store.close().await;
                println!("Database initialized successfully.");
            } else {
                println!("The in-memory store requires no initialization.");
            }
        }
        Commands::Index { file } => {
            repl::run_index(&cfg, &file).await?;
        }
        Commands::Ask { file, query } => {
            repl::run_ask(&cfg, &file, &query).await?;
        }
        Commands::Chat { file } => {
            repl::run_chat(&cfg, &file).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
