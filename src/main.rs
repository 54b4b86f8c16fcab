//! # Quarry CLI (`qry`)
//!
//! The `qry` binary is the primary interface for Quarry. It provides
//! commands for store initialization, indexing, fused search, similarity
//! analysis, link validation, and source mount management.
//!
//! ## Usage
//!
//! ```bash
//! qry --config ./config/qry.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `qry init` | Create the SQLite store and run schema migrations |
//! | `qry index` | Scan roots and commit changed documents atomically |
//! | `qry diff` | Preview what an index pass would change |
//! | `qry search "<query>"` | Fused full-text + lexical search |
//! | `qry grep <pattern>` | Lexical-only search with context lines |
//! | `qry related <file>` | Rank documents similar to one file |
//! | `qry duplicates` | Find exact and near-duplicate documents |
//! | `qry links` | Validate internal links |
//! | `qry refs <name>` | Find mentions of a name across the corpus |
//! | `qry mount <alias> <path>` | Attach an external directory |
//! | `qry sources` | List mounted sources |
//! | `qry stats` | Store overview and per-source breakdown |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the store
//! qry init --config ./config/qry.toml
//!
//! # Index the configured root
//! qry index --config ./config/qry.toml
//!
//! # Fused search
//! qry search "kubernetes upgrade" --config ./config/qry.toml
//!
//! # Attach a second directory under an alias
//! qry mount work ~/work/notes --config ./config/qry.toml
//! ```

mod config;
mod db;
mod error;
mod extract;
mod fingerprint;
mod index;
mod links;
mod migrate;
mod models;
mod ripgrep;
mod scan;
mod search;
mod sections;
mod similarity;
mod sources;
mod stats;
mod stopwords;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Quarry CLI — a local-first directory indexer with fused full-text and
/// lexical search.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/qry.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "qry",
    about = "Quarry — a local-first directory indexer with fused full-text and lexical search",
    version,
    long_about = "Quarry indexes a directory tree (or several mounted ones) into SQLite with \
    FTS5 full-text ranking, fuses those results with live ripgrep matches, and layers \
    section-aware context, TF-IDF similarity, duplicate detection, and link validation on top."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/qry.toml`. Store, index, search, and
    /// similarity settings are read from this file.
    #[arg(long, global = true, default_value = "./config/qry.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the store schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, sections, manifest, sources, documents_fts).
    /// This command is idempotent — running it multiple times is safe.
    Init,

    /// Scan all roots and commit changes to the store.
    ///
    /// Fingerprints every eligible file, diffs against the store, and
    /// applies additions, updates, and deletions in one transaction.
    /// A failed pass rolls back and leaves the previous index intact.
    Index {
        /// Ignore stored fingerprints — re-read and re-insert every file.
        #[arg(long)]
        full: bool,

        /// Extra exclude glob (repeatable), applied on top of config and
        /// `.qryignore` patterns.
        #[arg(long = "exclude")]
        excludes: Vec<String>,
    },

    /// Preview what an index pass would change, without writing.
    Diff,

    /// Search indexed documents.
    ///
    /// Runs the FTS5 ranked channel and a live ripgrep channel, fuses
    /// them into one deduplicated result list, and attaches section
    /// context to each hit. Either channel failing degrades to the other.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<i64>,

        /// Section context lines shown after each match.
        #[arg(long)]
        context: Option<usize>,

        /// Disable the recency decay so old and new documents rank equally.
        #[arg(long)]
        no_recency: bool,
    },

    /// Lexical-only search with context lines.
    ///
    /// Runs ripgrep directly over all roots and prints matches with
    /// surrounding lines. Unlike `search`, a missing ripgrep binary is a
    /// hard error here.
    Grep {
        /// The pattern to search for (ripgrep regex syntax).
        pattern: String,

        /// Context lines before and after each match.
        #[arg(long)]
        context: Option<usize>,
    },

    /// Rank indexed documents by similarity to one file.
    ///
    /// TF-IDF cosine similarity over the whole corpus. The file may be a
    /// stored path, a path suffix, or a bare filename.
    Related {
        /// Target file: stored path, suffix, or filename.
        file: String,

        /// Maximum number of related files to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Find exact and near-duplicate documents.
    ///
    /// Exact duplicates share a content fingerprint; near-duplicates are
    /// detected by prefix similarity above the threshold.
    Duplicates {
        /// Near-duplicate similarity threshold (0.0 to 1.0).
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Validate internal links against the index.
    ///
    /// Checks wiki links and relative markdown links in every markdown
    /// document (or just one) and reports targets that resolve to nothing.
    Links {
        /// Restrict validation to one file (stored path or suffix).
        file: Option<String>,
    },

    /// Find mentions of a name across the corpus.
    ///
    /// Whole-word, case-insensitive scan with context lines. Useful for
    /// finding backreferences to a note before renaming it.
    Refs {
        /// The name to search for (typically a filename or stem).
        name: String,

        /// Context lines around each mention.
        #[arg(long)]
        context: Option<usize>,
    },

    /// Attach an external directory to the index under an alias.
    ///
    /// Documents from the mount are indexed with `alias/`-prefixed paths
    /// on the next `qry index`.
    Mount {
        /// Alias for the mount (no path separators).
        alias: String,

        /// Directory to mount.
        path: String,
    },

    /// Remove a mount and every document indexed from it.
    Unmount {
        /// Alias of the mount to remove.
        alias: String,
    },

    /// List mounted sources and their index state.
    Sources,

    /// Show store statistics and health overview.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("quarry=warn")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Store initialized successfully.");
        }
        Commands::Index { full, excludes } => {
            index::run_index(&cfg, full, &excludes).await?;
        }
        Commands::Diff => {
            index::run_diff(&cfg).await?;
        }
        Commands::Search {
            query,
            limit,
            context,
            no_recency,
        } => {
            search::run_search(&cfg, &query, limit, context, no_recency).await?;
        }
        Commands::Grep { pattern, context } => {
            search::run_grep(&cfg, &pattern, context).await?;
        }
        Commands::Related { file, limit } => {
            similarity::run_related(&cfg, &file, limit).await?;
        }
        Commands::Duplicates { threshold } => {
            similarity::run_duplicates(&cfg, threshold).await?;
        }
        Commands::Links { file } => {
            links::run_links(&cfg, file.as_deref()).await?;
        }
        Commands::Refs { name, context } => {
            links::run_refs(&cfg, &name, context).await?;
        }
        Commands::Mount { alias, path } => {
            sources::run_mount(&cfg, &alias, &path).await?;
        }
        Commands::Unmount { alias } => {
            sources::run_unmount(&cfg, &alias).await?;
        }
        Commands::Sources => {
            sources::run_sources(&cfg).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
