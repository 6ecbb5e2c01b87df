//! # Promo Ingest CLI (`promo`)
//!
//! Imports promotional-campaign exports (SubmitHub, Groover, and generic
//! spreadsheets) into the submissions database, matching every row against
//! the song catalog.
//!
//! ## Usage
//!
//! ```bash
//! promo --config ./config/promo.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `promo init` | Create the SQLite database and run schema migrations |
//! | `promo catalog load <csv>` | Load artists and songs into the catalog |
//! | `promo analyze <file>` | Preview columns, vendor and warnings without writing |
//! | `promo import <file>` | Reconcile and commit one export |
//! | `promo import-batch <files...>` | Commit many exports with bounded concurrency |
//! | `promo submissions` | List committed submission rows |
//! | `promo submissions delete <id>` | Delete one submission |
//! | `promo stats` | Submission counts by vendor, action and outlet type |
//! | `promo tracks` | Per-track outcome summary, latest first |
//! | `promo serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! promo init
//! promo catalog load ./catalog.csv
//! promo analyze "exports/Nova Lux - Midnight Drive.csv"
//! promo import "exports/Nova Lux - Midnight Drive.csv" --campaign-name "Spring push" --budget 150
//! promo import-batch --dir ./exports --progress human
//! promo stats --artist-id a1
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use promo_ingest::config;
use promo_ingest::import_cmd::{self, ImportOptions};
use promo_ingest::logging;
use promo_ingest::migrate;
use promo_ingest::progress::ProgressMode;
use promo_ingest::server;

/// Promo Ingest: import promotional-campaign exports and match them to the
/// song catalog.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/promo.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "promo",
    about = "Import promotional-campaign CSV exports and reconcile them against the song catalog",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/promo.toml`. `analyze` falls back to built-in
    /// defaults when the file is missing.
    #[arg(long, global = true, default_value = "./config/promo.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Manage the song catalog.
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },

    /// Preview how a file would be read. Writes nothing.
    Analyze {
        /// The CSV/TSV export to inspect.
        file: PathBuf,

        /// Print the preview as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Reconcile one export against the catalog and commit its rows.
    ///
    /// Re-importing the same bytes with the same campaign is a no-op:
    /// rows already committed are counted, not written again.
    Import {
        file: PathBuf,

        /// Catalog artist id that overrides filename and row artist hints.
        #[arg(long)]
        artist_id: Option<String>,

        #[arg(long)]
        campaign_name: Option<String>,

        /// Campaign budget, e.g. `150` or `99.95`.
        #[arg(long)]
        budget: Option<String>,

        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Import several exports. Files are independent: one failing does not
    /// affect the others.
    ImportBatch {
        /// Files to import, in order.
        paths: Vec<PathBuf>,

        /// Also import every matching file under this directory.
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Include glob for `--dir` (repeatable). Defaults to `**/*.csv` and `**/*.tsv`.
        #[arg(long = "glob")]
        globs: Vec<String>,

        #[arg(long)]
        artist_id: Option<String>,

        #[arg(long)]
        campaign_name: Option<String>,

        #[arg(long)]
        budget: Option<String>,

        /// Cancel whatever is still pending after this many seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Progress on stderr: `human`, `json` or `off`. Defaults to `human`
        /// on a terminal.
        #[arg(long, value_parser = parse_progress)]
        progress: Option<ProgressMode>,

        /// Print the batch report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List committed submissions, grouped by import and ordered by row.
    Submissions {
        #[command(subcommand)]
        action: Option<SubmissionsAction>,

        /// Only rows of this import (idempotency key).
        #[arg(long)]
        key: Option<String>,

        #[arg(long, default_value_t = 50)]
        limit: usize,

        /// Print full records as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Submission counts: totals, by vendor, action and outlet type.
    Stats {
        /// Only submissions linked to this catalog artist.
        #[arg(long)]
        artist_id: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Outcome counts per track, most recently submitted first.
    Tracks {
        #[arg(long)]
        artist_id: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP API.
    Serve,
}

#[derive(Subcommand)]
enum SubmissionsAction {
    /// Delete one submission by id.
    Delete { id: String },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// Load `artist_id,artist_name,song_id,title[,isrc,upc]` rows.
    Load { path: PathBuf },
}

fn parse_progress(s: &str) -> Result<ProgressMode, String> {
    ProgressMode::parse(s).ok_or_else(|| format!("invalid progress mode '{}': use human, json or off", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging();
    let cli = Cli::parse();

    // Analysis never touches the database, so a missing config is fine.
    if let Commands::Analyze { file, json } = &cli.command {
        let cfg = config::load_config(&cli.config).unwrap_or_else(|_| config::Config::minimal());
        import_cmd::run_analyze(&cfg, file, *json)?;
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Catalog { action } => match action {
            CatalogAction::Load { path } => {
                import_cmd::run_catalog_load(&cfg, &path).await?;
            }
        },
        Commands::Analyze { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
        Commands::Import {
            file,
            artist_id,
            campaign_name,
            budget,
            json,
        } => {
            let opts = ImportOptions {
                artist_id,
                campaign_name,
                budget,
                json,
            };
            import_cmd::run_import(&cfg, &file, &opts).await?;
        }
        Commands::ImportBatch {
            paths,
            dir,
            globs,
            artist_id,
            campaign_name,
            budget,
            timeout_secs,
            progress,
            json,
        } => {
            let opts = ImportOptions {
                artist_id,
                campaign_name,
                budget,
                json,
            };
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            import_cmd::run_import_batch(&cfg, paths, dir, globs, &opts, timeout_secs, progress)
                .await?;
        }
        Commands::Submissions {
            action: Some(SubmissionsAction::Delete { id }),
            ..
        } => {
            import_cmd::run_delete_submission(&cfg, &id).await?;
        }
        Commands::Submissions {
            action: None,
            key,
            limit,
            json,
        } => {
            import_cmd::run_submissions(&cfg, key, limit, json).await?;
        }
        Commands::Stats { artist_id, json } => {
            import_cmd::run_stats(&cfg, artist_id.as_deref(), json).await?;
        }
        Commands::Tracks { artist_id, json } => {
            import_cmd::run_tracks(&cfg, artist_id.as_deref(), json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
