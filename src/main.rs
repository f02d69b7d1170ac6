//! # docqa CLI
//!
//! The `docqa` binary drives the document question-answering service. It
//! provides commands for schema initialization, foreground indexing,
//! streamed question answering, document deletion and listing, and starting
//! the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa init` | Create the record-manager schema (idempotent) |
//! | `docqa index` | Index the data directory in the foreground |
//! | `docqa ask "<question>"` | Stream an answer to stdout |
//! | `docqa delete <filename>` | Remove a document everywhere |
//! | `docqa list` | List loadable source files |
//! | `docqa serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use std::io::Write;
use std::path::PathBuf;

use docqa::config;
use docqa::record_manager::{RecordManager, SqliteRecordManager};
use docqa::server::{self, validate_filename, AppState};

/// docqa — index office documents into a vector store and answer questions
/// against them with streamed, grounded generation.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "Document question answering over an incrementally indexed corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the record-manager schema.
    ///
    /// Creates the SQLite database file and the index-records table.
    /// This command is idempotent — running it multiple times is safe.
    Init,

    /// Index documents from the data directory (or an override) in the
    /// foreground and print the run summary.
    Index {
        /// Directory to index instead of the configured data directory.
        #[arg(long)]
        directory: Option<PathBuf>,
    },

    /// Ask a question and stream the answer to stdout.
    Ask {
        /// The question to answer.
        question: String,

        /// Number of chunks to retrieve (clamped to 1-20).
        #[arg(long, default_value_t = 4)]
        k: usize,

        /// Equality metadata filters as `key=value` pairs.
        #[arg(long = "filter", value_parser = parse_key_val)]
        filters: Vec<(String, String)>,
    },

    /// Delete a document's vectors, records, and file.
    Delete {
        /// Filename inside the data directory.
        filename: String,
    },

    /// List loadable source files with size and modification time.
    List,

    /// Start the HTTP server.
    Serve,
}

/// Parse a `key=value` pair for `--filter` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docqa=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let manager = SqliteRecordManager::open(&cfg.record_manager).await?;
            manager.create_schema().await?;
            println!("Record manager schema initialized.");
        }
        Commands::Index { directory } => {
            let state = AppState::from_config(&cfg).await?;
            let dir = directory.unwrap_or_else(|| cfg.data.dir.clone());
            let report = state.indexer.run(&dir).await;
            println!("index {}", dir.display());
            println!("  total indexed: {}", report.total_indexed);
            println!("  errors: {}", report.errors);
            println!("ok");
        }
        Commands::Ask {
            question,
            k,
            filters,
        } => {
            let state = AppState::from_config(&cfg).await?;
            let filter = if filters.is_empty() {
                None
            } else {
                Some(
                    filters
                        .into_iter()
                        .map(|(key, value)| (key, serde_json::Value::String(value)))
                        .collect(),
                )
            };

            let mut fragments = state.answer.answer_stream(question, k, filter);
            let mut stdout = std::io::stdout();
            while let Some(fragment) = fragments.next().await {
                write!(stdout, "{}", fragment)?;
                stdout.flush()?;
            }
            writeln!(stdout)?;
        }
        Commands::Delete { filename } => {
            validate_filename(&filename)?;
            if !cfg.data.dir.join(&filename).exists() {
                anyhow::bail!("File not found: {}", filename);
            }

            let state = AppState::from_config(&cfg).await?;
            let outcome = state.indexer.delete_document(&cfg.data.dir, &filename).await?;
            println!("delete {}", filename);
            println!("  vectors removed: {}", outcome.deleted_vectors);
            println!("  records removed: {}", outcome.deleted_records);
            println!("ok");
        }
        Commands::List => {
            let documents = docqa::loader::list_documents(&cfg.data.dir);
            if documents.is_empty() {
                println!("No documents.");
            } else {
                for doc in documents {
                    println!(
                        "{}\t{} bytes\t{}\t{}",
                        doc.filename, doc.size_bytes, doc.updated_at, doc.file_type
                    );
                }
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
