//! # Blinko AI CLI (`blinko-ai`)
//!
//! Operator interface to the assistant core: inspect model capabilities,
//! manage the vector index, ingest and search notes, and run agent tools
//! by hand.
//!
//! ```bash
//! blinko-ai --config ./config/blinko-ai.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `blinko-ai models [key]` | Show the capability descriptor of a model (or all known models) |
//! | `blinko-ai index rebuild` | Rebuild the vector index from the corpus |
//! | `blinko-ai index status` | Show index state, dimension and size |
//! | `blinko-ai ingest <file>...` | Chunk, embed and index corpus note files |
//! | `blinko-ai search "<query>"` | Retrieve the most similar chunks |
//! | `blinko-ai tools list` | List agent tools and their input schemas |
//! | `blinko-ai tools call <tool>` | Invoke a tool as an impersonated account |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use blinko_ai::config;
use blinko_ai::context::AssistantContext;
use blinko_ai::tools::RuntimeContext;
use blinko_ai_core::capability::CapabilityRegistry;

#[derive(Parser)]
#[command(
    name = "blinko-ai",
    about = "Retrieval and tool-execution core of the Blinko note assistant",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/blinko-ai.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show model capabilities.
    ///
    /// Known models come from the built-in table; other keys get
    /// capabilities inferred from their name.
    Models {
        /// Model key, e.g. `text-embedding-3-small`. Lists all known models when omitted.
        key: Option<String>,
    },

    /// Manage the vector index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Chunk, embed and index note files.
    ///
    /// Files must live under the corpus root; each is stored under its path
    /// relative to that root, replacing the chunks a rebuild stored for it.
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Retrieve the chunks most similar to a query.
    Search {
        query: String,

        /// Maximum number of chunks to return.
        #[arg(long, default_value = "5")]
        limit: usize,
    },

    /// List or invoke agent tools.
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Rebuild the index from the configured corpus.
    Rebuild,
    /// Show index state without rebuilding.
    Status,
}

#[derive(Subcommand)]
enum ToolsAction {
    /// List tools with their descriptions and input schemas.
    List,
    /// Invoke a tool and print its result envelope.
    Call {
        /// Tool name, e.g. `delete-notes`.
        tool: String,

        /// Account id the call is made on behalf of.
        #[arg(long)]
        account: String,

        /// Tool input as a JSON object.
        #[arg(long)]
        input: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // Capability lookups are static data and need no config file.
    if let Commands::Models { key } = &cli.command {
        let registry = CapabilityRegistry::builtin();
        return match key {
            Some(key) => print_json(&registry.lookup(key)),
            None => print_json(&registry.models()),
        };
    }

    let cfg = config::load_config(&cli.config)?;
    let ctx = AssistantContext::from_config(cfg)?;

    match cli.command {
        Commands::Models { .. } => Ok(()),
        Commands::Index { action } => match action {
            IndexAction::Rebuild => {
                let index = ctx.index().await?;
                index.rebuild().await?;
                print_json(&index.status().await?)
            }
            IndexAction::Status => {
                let index = ctx.index().await?;
                print_json(&index.status().await?)
            }
        },
        Commands::Ingest { files } => {
            let pipeline = ctx.pipeline().await?;
            for file in files {
                let document = ctx.note_document(&file)?;
                let report = pipeline.ingest(&document).await?;
                println!("{}: {} chunks", report.source_id, report.chunks);
            }
            Ok(())
        }
        Commands::Search { query, limit } => {
            let pipeline = ctx.pipeline().await?;
            let hits = pipeline.retrieve(&query, limit).await?;
            if hits.is_empty() {
                println!("No results.");
            }
            for (rank, hit) in hits.iter().enumerate() {
                let snippet: String = hit.text.chars().take(160).collect();
                println!(
                    "{}. [{:.4}] {}#{}\n   {}",
                    rank + 1,
                    hit.score,
                    hit.source_id,
                    hit.sequence_index,
                    snippet.replace('\n', " ")
                );
            }
            Ok(())
        }
        Commands::Tools { action } => {
            let registry = ctx.tools()?;
            match action {
                ToolsAction::List => print_json(&registry.definitions()),
                ToolsAction::Call {
                    tool,
                    account,
                    input,
                } => {
                    let params: serde_json::Value =
                        serde_json::from_str(&input).context("--input must be valid JSON")?;
                    let result = registry
                        .dispatch(&tool, params, &RuntimeContext::for_account(account))
                        .await;
                    print_json(&result)
                }
            }
        }
    }
}
