//! CLI front ends for the import pipeline.
//!
//! Each `run_*` function backs one `promo` subcommand: it opens the
//! database, drives the [`Importer`], and prints a plain-text report (or
//! JSON with `--json`) on stdout.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::batch::{self, cancel_after, BatchFile, BatchReport, FileOutcome};
use crate::catalog::{parse_catalog_csv, SqliteCatalog};
use crate::config::Config;
use crate::db;
use crate::discover::discover_files;
use crate::importer::{self, CommitRequest, Importer};
use crate::migrate;
use crate::models::{Budget, Campaign, ImportSummary};
use crate::progress::ProgressMode;
use crate::stats::{SubmissionStats, TrackSummary};
use crate::store::SubmissionFilter;

/// Options shared by `import` and `import-batch`.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub artist_id: Option<String>,
    pub campaign_name: Option<String>,
    pub budget: Option<String>,
    pub json: bool,
}

impl ImportOptions {
    fn campaign(&self) -> Result<Campaign> {
        let budget = match self.budget.as_deref() {
            Some(raw) => Some(raw.parse::<Budget>().map_err(anyhow::Error::msg)?),
            None => None,
        };
        Ok(Campaign::new(self.campaign_name.as_deref(), budget))
    }
}

async fn open_importer(config: &Config) -> Result<(Importer, sqlx::SqlitePool)> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    Ok((Importer::sqlite(pool.clone(), config.import.clone()), pool))
}

fn read_request(path: &Path, opts: &ImportOptions, campaign: &Campaign) -> Result<CommitRequest> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(CommitRequest {
        bytes,
        filename: batch::file_name(path),
        explicit_artist_id: opts.artist_id.clone(),
        campaign: campaign.clone(),
    })
}

/// `promo catalog load <csv>`
pub async fn run_catalog_load(config: &Config, path: &Path) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let seed = parse_catalog_csv(&bytes)?;

    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    let (artists, songs) = SqliteCatalog::new(pool.clone()).load_seed(&seed).await?;

    println!("catalog load {}", path.display());
    println!("  artists: {}", artists);
    println!("  songs: {}", songs);
    println!("ok");

    pool.close().await;
    Ok(())
}

/// `promo analyze <file>`. Never writes to the database.
pub fn run_analyze(config: &Config, path: &Path, json: bool) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let analysis = importer::analyze(&bytes, &filename, &config.import)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }

    let (hint, preview) = (&analysis.hint, &analysis.preview);
    println!("analyze {}", filename);
    println!("  vendor: {}", preview.vendor.as_str());
    println!("  delimiter: {}", preview.delimiter);
    println!("  rows: {}", preview.total_rows);
    match (&hint.artist_name, &hint.song_title) {
        (Some(a), Some(t)) => println!("  filename hint: {} / {}", a, t),
        _ => println!("  filename hint: none"),
    }
    println!("  columns:");
    for c in &preview.columns {
        println!(
            "    {:<24} {:<16} {:?}",
            c.name,
            c.role.as_str(),
            c.confidence
        );
    }
    if !preview.warnings.is_empty() {
        println!("  warnings:");
        for w in &preview.warnings {
            println!("    - {}", w);
        }
    }
    Ok(())
}

/// `promo import <file>`
pub async fn run_import(config: &Config, path: &Path, opts: &ImportOptions) -> Result<()> {
    let campaign = opts.campaign()?;
    let request = read_request(path, opts, &campaign)?;
    let (importer, pool) = open_importer(config).await?;

    let result = importer.commit(&request, &CancellationToken::new()).await;
    pool.close().await;

    match result {
        Ok(summary) => {
            if opts.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
            Ok(())
        }
        Err(failure) => {
            if opts.json {
                println!("{}", serde_json::to_string_pretty(&failure)?);
            } else if let Some(partial) = &failure.partial {
                print_summary(partial);
            }
            bail!("import of {} failed: {}", request.filename, failure.error)
        }
    }
}

/// `promo import-batch <paths...> [--dir]`
#[allow(clippy::too_many_arguments)]
pub async fn run_import_batch(
    config: &Config,
    paths: Vec<PathBuf>,
    dir: Option<PathBuf>,
    globs: Vec<String>,
    opts: &ImportOptions,
    timeout_secs: Option<u64>,
    progress: ProgressMode,
) -> Result<()> {
    let mut all_paths = paths;
    if let Some(dir) = dir {
        all_paths.extend(discover_files(&dir, &globs)?);
    }
    if all_paths.is_empty() {
        bail!("No files to import. Pass file paths or --dir.");
    }

    let campaign = opts.campaign()?;
    let files: Vec<BatchFile> = all_paths
        .iter()
        .map(|p| BatchFile::from_path(p, opts.artist_id.clone(), campaign.clone()))
        .collect();

    let (importer, pool) = open_importer(config).await?;
    let cancel = CancellationToken::new();
    let timer = timeout_secs.map(|s| cancel_after(cancel.clone(), Duration::from_secs(s)));

    let reporter = progress.reporter();
    let report = importer
        .commit_batch(files, &cancel, reporter.as_ref())
        .await;

    if let Some(t) = timer {
        t.abort();
    }
    pool.close().await;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_batch(&report);
    }

    if report.failed > 0 {
        bail!("{} of {} files failed", report.failed, report.files.len());
    }
    Ok(())
}

/// `promo submissions`
pub async fn run_submissions(
    config: &Config,
    key: Option<String>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let (importer, pool) = open_importer(config).await?;
    let records = importer
        .list_submissions(&SubmissionFilter {
            idempotency_key: key,
            limit: Some(limit),
        })
        .await?;
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No submissions.");
        return Ok(());
    }
    for r in &records {
        let f = &r.fields;
        let status = match (&r.catalog_key, r.unmatched_reason) {
            (Some(k), _) => format!("matched {}", k),
            (None, Some(reason)) => format!("unmatched ({})", reason),
            (None, None) => "unmatched".to_string(),
        };
        let dash = |v: Option<&str>| v.unwrap_or("-").to_string();
        println!(
            "{}  row {:<5} {:<28} {:<24} {:<14} {:<10} {:>6} {:<10} {}",
            &r.idempotency_key[..12.min(r.idempotency_key.len())],
            r.row_ordinal,
            dash(f.song_title.as_deref()),
            dash(f.outlet_name.as_deref()),
            dash(f.outlet_type.as_deref()),
            dash(f.action.as_deref()),
            f.listen_time_secs
                .map(|s| format!("{}s", s))
                .unwrap_or_else(|| "-".into()),
            f.responded_on
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".into()),
            status
        );
        println!("    id: {}", r.id);
        if let Some(feedback) = &f.feedback {
            println!("    feedback: {}", feedback.replace('\n', " "));
        }
        if r.campaign.name.is_some() || r.campaign.budget.is_some() {
            println!(
                "    campaign: {} / budget {}",
                dash(r.campaign.name.as_deref()),
                r.campaign
                    .budget
                    .map(|b| b.to_string())
                    .unwrap_or_else(|| "-".into())
            );
        }
    }
    Ok(())
}

/// `promo submissions delete <id>`
pub async fn run_delete_submission(config: &Config, id: &str) -> Result<()> {
    let (importer, pool) = open_importer(config).await?;
    let deleted = importer.delete_submission(id).await;
    pool.close().await;

    if !deleted? {
        bail!("submission not found: {}", id);
    }
    println!("deleted {}", id);
    Ok(())
}

/// `promo stats`
pub async fn run_stats(config: &Config, artist_id: Option<&str>, json: bool) -> Result<()> {
    let (importer, pool) = open_importer(config).await?;
    let stats = importer.submission_stats(artist_id).await;
    pool.close().await;
    let stats = stats?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_stats(&stats, artist_id);
    }
    Ok(())
}

/// `promo tracks`
pub async fn run_tracks(config: &Config, artist_id: Option<&str>, json: bool) -> Result<()> {
    let (importer, pool) = open_importer(config).await?;
    let tracks = importer.track_summaries(artist_id).await;
    pool.close().await;
    let tracks = tracks?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tracks)?);
    } else {
        print_tracks(&tracks);
    }
    Ok(())
}

fn print_stats(stats: &SubmissionStats, artist_id: Option<&str>) {
    println!("Submission stats");
    println!("================");
    if let Some(id) = artist_id {
        println!("  Artist:      {}", id);
    }
    println!();
    println!("  Submissions: {}", stats.total_submissions);
    println!("  Listens:     {}", stats.total_listens);
    println!("  Approvals:   {}", stats.total_approvals);
    println!("  Playlists:   {}", stats.total_playlists);

    for (title, counts) in [
        ("By vendor", &stats.by_vendor),
        ("By action", &stats.by_action),
        ("By outlet type", &stats.by_outlet_type),
    ] {
        if counts.is_empty() {
            continue;
        }
        println!();
        println!("  {}:", title);
        for (name, n) in counts {
            println!("  {:<24} {:>6}", name, n);
        }
    }
    println!();
}

fn print_tracks(tracks: &[TrackSummary]) {
    if tracks.is_empty() {
        println!("No submissions.");
        return;
    }
    println!(
        "  {:<28} {:<14} {:>5} {:>6} {:>8} {:>8} {:>6} {:>9}   {:<10} {}",
        "TRACK", "KEY", "SUBS", "LISTEN", "APPROVED", "DECLINED", "SHARED", "PLAYLISTS", "LATEST",
        "VENDORS"
    );
    println!("  {}", "-".repeat(120));
    for t in tracks {
        println!(
            "  {:<28} {:<14} {:>5} {:>6} {:>8} {:>8} {:>6} {:>9}   {:<10} {}",
            t.song_title,
            t.catalog_key.as_deref().unwrap_or("-"),
            t.total_submissions,
            t.total_listened,
            t.total_approved,
            t.total_declined,
            t.total_shared,
            t.total_playlists,
            t.latest_submitted_on
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".into()),
            t.vendors.join(", ")
        );
    }
}

fn print_summary(s: &ImportSummary) {
    println!("import {}", s.file_name);
    println!("  vendor: {}", s.vendor.as_str());
    println!("  key: {}", s.idempotency_key);
    println!("  total rows: {}", s.total_rows);
    println!("  created: {}", s.created_count);
    println!("  already committed: {}", s.already_committed_count);
    println!("  invalid: {}", s.invalid_count);
    if s.failed_count > 0 {
        println!("  failed: {}", s.failed_count);
    }
    if !s.matched_songs.is_empty() {
        println!("  matched songs:");
        for m in &s.matched_songs {
            println!("    {} ({})", m.song_title, m.catalog_key);
        }
    }
    if !s.unmatched_songs.is_empty() {
        println!("  unmatched songs:");
        for u in &s.unmatched_songs {
            match &u.artist_hint {
                Some(a) => println!("    {} / {} [{}]", a, u.song_title, u.reason),
                None => println!("    {} [{}]", u.song_title, u.reason),
            }
        }
    }
    if !s.errors.is_empty() {
        println!("  errors:");
        for e in &s.errors {
            println!("    {}", e);
        }
        if s.errors_omitted > 0 {
            println!("    ... and {} more", s.errors_omitted);
        }
    }
    println!(
        "{}",
        match s.status {
            crate::models::CommitStatus::Complete => "ok",
            crate::models::CommitStatus::Partial => "partial",
        }
    );
}

fn print_batch(report: &BatchReport) {
    println!("import-batch");
    for entry in &report.files {
        match &entry.outcome {
            FileOutcome::Succeeded { summary } => println!(
                "  {:<40} succeeded  created {} / already {} / invalid {}",
                entry.file_name,
                summary.created_count,
                summary.already_committed_count,
                summary.invalid_count
            ),
            FileOutcome::Failed { error, partial } => {
                let written = partial.as_ref().map(|p| p.created_count).unwrap_or(0);
                println!(
                    "  {:<40} failed     {} (created {})",
                    entry.file_name, error, written
                )
            }
            FileOutcome::Skipped => println!("  {:<40} skipped", entry.file_name),
        }
    }
    println!(
        "  succeeded: {}  failed: {}  skipped: {}",
        report.succeeded, report.failed, report.skipped
    );
}
