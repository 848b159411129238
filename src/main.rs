//! # clihub CLI
//!
//! The `clihub` binary searches a registry of command-line tools by intent.
//! It provides commands for database initialization, lexical and
//! semantic-first search, workflow lookup, vector-index maintenance, the
//! unmet-request report, and the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! clihub --config ./config/clihub.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `clihub init` | Create the SQLite database and run schema migrations |
//! | `clihub search "<query>"` | Lexical-first ranked search |
//! | `clihub discover "<query>"` | Semantic-first ranked search |
//! | `clihub workflows "<query>"` | Ranked multi-tool workflow chains |
//! | `clihub show <slug>` | Print one registry entry |
//! | `clihub index pending` | Embed new or changed entries |
//! | `clihub index rebuild` | Clear and regenerate the vector index |
//! | `clihub misses` | Most frequent queries that returned nothing |
//! | `clihub serve` | Start the HTTP API |
//! | `clihub completions <shell>` | Print a shell completion script |
//!
//! Logs go to stderr and are filtered by `RUST_LOG` (default `clihub=info`).

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use clihub::search::Pipeline;
use clihub::{config, index_cmd, migrate, misses, search, server};

/// clihub: find the right command-line tool for a task.
///
/// All commands except `completions` read a TOML configuration file. See
/// `config/clihub.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "clihub",
    about = "clihub: intent-aware search over a registry of command-line tools",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/clihub.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file with the vector index and
    /// unmet-request tables. Safe to run repeatedly.
    Init,

    /// Search the registry, lexical signals first.
    Search {
        /// The task to find a tool for.
        query: String,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,

        /// Show the per-signal score breakdown.
        #[arg(long)]
        explain: bool,

        /// Print the response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Search the registry, nearest-neighbour retrieval first.
    ///
    /// Falls back to `search` when the vector index is disabled or finds
    /// nothing similar enough.
    Discover {
        query: String,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        explain: bool,

        #[arg(long)]
        json: bool,
    },

    /// Find multi-tool workflow chains for a task.
    Workflows {
        query: String,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Print one registry entry.
    Show {
        slug: String,

        #[arg(long)]
        json: bool,
    },

    /// Maintain the persistent vector index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Most frequent queries that returned no results.
    Misses {
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Print a shell completion script to stdout.
    Completions {
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Embed entries that are missing or changed since last indexed.
    Pending {
        /// Report what would be embedded without writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Clear the index and embed every entry.
    Rebuild {
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("clihub=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Doesn't need config
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "clihub", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Search {
            query,
            limit,
            explain,
            json,
        } => {
            search::run_search(&cfg, &query, Pipeline::Search, limit, explain, json).await?;
        }
        Commands::Discover {
            query,
            limit,
            explain,
            json,
        } => {
            search::run_search(&cfg, &query, Pipeline::Discover, limit, explain, json).await?;
        }
        Commands::Workflows { query, limit, json } => {
            search::run_workflows(&cfg, &query, limit, json).await?;
        }
        Commands::Show { slug, json } => {
            search::run_show(&cfg, &slug, json).await?;
        }
        Commands::Index { action } => match action {
            IndexAction::Pending { dry_run } => {
                index_cmd::run_index(&cfg, false, dry_run).await?;
            }
            IndexAction::Rebuild { dry_run } => {
                index_cmd::run_index(&cfg, true, dry_run).await?;
            }
        },
        Commands::Misses { limit } => {
            misses::run_misses(&cfg, limit).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
