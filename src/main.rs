//! # postindex CLI (`pix`)
//!
//! The `pix` binary imports an Instagram export into Elasticsearch and
//! queries the result.
//!
//! ## Usage
//!
//! ```bash
//! pix --config ./config/pix.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pix ingest` | Rebuild the index from the export archive |
//! | `pix search [KEYWORD]` | Search posts by keyword and/or date range |
//! | `pix trend` | Post counts per month |
//! | `pix ping` | Check the backend, index, and directories |
//! | `pix serve` | Start the JSON HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # Import the single .zip found in ./ig_data
//! pix ingest
//!
//! # Import a specific archive, with JSON progress on stderr
//! pix ingest --archive ~/Downloads/instagram.zip --progress json
//!
//! # Keyword search, second page
//! pix search sunset --page 2
//!
//! # Everything from March 2024
//! pix search --from 2024-03-01 --to 2024-03-31
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use postindex::config;
use postindex::progress::ProgressMode;
use postindex::{ingest, logging, search, server, status};

/// postindex CLI: import an Instagram export into Elasticsearch and search it.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. When the file does not exist, built-in defaults are used.
#[derive(Parser)]
#[command(
    name = "pix",
    about = "postindex: import an Instagram export into Elasticsearch and search it",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/pix.toml`. Backend, path, ingestion, retrieval,
    /// server, and logging settings are read from this file.
    #[arg(long, global = true, default_value = "./config/pix.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Rebuild the search index from the export archive.
    ///
    /// Extracts the archive, normalizes every post, drops and recreates the
    /// index, loads the posts, and replaces the permanent media store.
    /// Exits non-zero if the run fails.
    Ingest {
        /// Archive to import instead of the single `.zip` in `paths.archive_dir`.
        #[arg(long)]
        archive: Option<PathBuf>,

        /// Progress output on stderr: `off`, `human`, or `json`.
        /// Defaults to `human` on a terminal and `off` otherwise.
        #[arg(long)]
        progress: Option<ProgressMode>,
    },

    /// Search posts, newest first.
    ///
    /// Needs a keyword, a date bound, or both.
    Search {
        /// Full-text keyword(s) matched against post text.
        keyword: Option<String>,

        /// Only posts on or after this date (YYYY-MM-DD).
        #[arg(long)]
        from: Option<String>,

        /// Only posts on or before this date (YYYY-MM-DD).
        #[arg(long)]
        to: Option<String>,

        /// Page to show (1-based; out-of-range pages are clamped).
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Print the page as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show how many posts were made each month.
    Trend {
        /// Print buckets as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Check that the backend answers and the index and directories exist.
    Ping,

    /// Start the JSON HTTP API.
    ///
    /// Binds to `[server].bind` and serves search, trend, ingest, and media.
    Serve,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_or_default(&cli.config)?;
    logging::init(&cfg.logging, &cfg.paths.logs_dir)?;

    match cli.command {
        Commands::Ingest { archive, progress } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_ingest_command(&cfg, archive, mode).await?;
        }
        Commands::Search {
            keyword,
            from,
            to,
            page,
            json,
        } => {
            search::run_search(
                &cfg,
                keyword.as_deref(),
                from.as_deref(),
                to.as_deref(),
                page,
                json,
            )
            .await?;
        }
        Commands::Trend { json } => {
            search::run_trend(&cfg, json).await?;
        }
        Commands::Ping => {
            status::run_ping(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
