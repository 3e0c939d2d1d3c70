//! # HR Harness CLI (`hrx`)
//!
//! ## Usage
//!
//! ```bash
//! hrx --config ./config/hrx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hrx init` | Create the SQLite database and schema |
//! | `hrx ingest <file> --roles a,b` | Mask, chunk, embed and index a document |
//! | `hrx query "<question>" --roles a` | Retrieve chunks visible to the given roles |
//! | `hrx delete <id>` | Remove a document and all of its chunks |
//! | `hrx docs` | List ingested documents |
//! | `hrx mask <file>` | Print a file with PII redacted |
//! | `hrx evaluate <judgments.json>` | Report recall, precision and MRR |
//! | `hrx stats` | Show index model, vector and document counts |
//!
//! Log verbosity is controlled with `RUST_LOG`; logs go to stderr.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hr_harness::{config, evaluate, ingest, mask_cmd, migrate, query, stats};

/// HR Harness: PII-safe, role-scoped retrieval over HR documents.
#[derive(Parser)]
#[command(name = "hrx", version)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/hrx.toml`.
    #[arg(long, global = true, default_value = "./config/hrx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it on an existing database is safe.
    Init,

    /// Ingest a document.
    ///
    /// The text is PII-masked before it is chunked, embedded or stored.
    /// Re-ingesting the same file replaces its earlier chunks.
    Ingest {
        /// Path to a UTF-8 text file.
        file: PathBuf,

        /// Roles allowed to read this document, comma separated.
        #[arg(long, value_delimiter = ',', required = true)]
        roles: Vec<String>,

        /// Owning department.
        #[arg(long)]
        department: Option<String>,

        /// Who uploaded the document.
        #[arg(long)]
        uploaded_by: Option<String>,
    },

    /// Ask a question as a principal holding the given roles.
    Query {
        /// The question text.
        query: String,

        /// Roles held by the asking principal, comma separated.
        #[arg(long, value_delimiter = ',')]
        roles: Vec<String>,

        /// Maximum number of results. Defaults to `[retrieval].top_k`.
        #[arg(long)]
        top_k: Option<usize>,

        /// Only return chunks from this department.
        #[arg(long)]
        department: Option<String>,
    },

    /// Delete a document and every chunk derived from it.
    Delete {
        /// Document id as printed by `ingest` or `docs`.
        id: String,
    },

    /// List ingested documents with their status.
    Docs,

    /// Print a file's text with PII replaced by category tokens.
    Mask {
        /// Path to the file.
        file: PathBuf,
    },

    /// Evaluate retrieval quality against a JSON judgment file.
    Evaluate {
        /// Path to a JSON array of relevance judgments.
        judgments: PathBuf,

        /// Cutoff rank. Defaults to `[retrieval].top_k`.
        #[arg(long)]
        k: Option<usize>,
    },

    /// Show the embedding model, vector count and document breakdowns.
    Stats,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hr_harness=info,hr_harness_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            file,
            roles,
            department,
            uploaded_by,
        } => {
            ingest::run_ingest(&cfg, &file, department, roles, uploaded_by).await?;
        }
        Commands::Query {
            query,
            roles,
            top_k,
            department,
        } => {
            query::run_query(&cfg, &query, roles, top_k, department).await?;
        }
        Commands::Delete { id } => {
            ingest::run_delete(&cfg, &id).await?;
        }
        Commands::Docs => {
            ingest::run_docs(&cfg).await?;
        }
        Commands::Mask { file } => {
            mask_cmd::run_mask(&cfg, &file)?;
        }
        Commands::Evaluate { judgments, k } => {
            evaluate::run_evaluate(&cfg, &judgments, k).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
