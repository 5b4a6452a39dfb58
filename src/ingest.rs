//! Ingestion pipeline orchestration.
//!
//! Coordinates the full import flow: preflight → discovery → extraction →
//! transformation → index rebuild → load → media relocation → cleanup.
//! Steps run strictly in sequence. A fatal [`IngestError`] stops the run
//! where it happened and leaves scratch state in place for inspection;
//! per-record and per-file problems are reported and the run continues.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use serde::Serialize;

use postindex_core::backend::{CreateIndexRequest, SearchBackend};
use postindex_core::models::NormalizedPost;
use postindex_core::transform::{transform_records, TransformOptions};

use crate::archive::{extract_archive, locate_archive, ExtractSummary};
use crate::cleanup::cleanup;
use crate::config::{is_within, Config};
use crate::elastic::ElasticBackend;
use crate::error::IngestError;
use crate::index_manager::{connect, rebuild_index};
use crate::loader::{load_documents, LoadFailure};
use crate::progress::{IngestEvent, IngestReporter, IngestStage, ProgressMode};
use crate::relocate::{relocate_media, RelocationWarning};

/// Name of the file written and removed to prove a directory is writable.
const PROBE_FILE: &str = ".pix-write-probe";

/// Counters for one ingestion run. Filled as far as the run got.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub archive: Option<PathBuf>,
    pub extracted: ExtractSummary,
    pub records_seen: usize,
    pub posts_kept: usize,
    pub skipped: usize,
    pub indexed: usize,
    pub load_failures: Vec<LoadFailure>,
    pub media_copied: usize,
    pub media_warnings: Vec<RelocationWarning>,
}

/// Result of [`run_ingest`]. `message` is set only on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub success: bool,
    pub message: Option<String>,
    pub report: IngestReport,
}

/// Make sure every directory the run writes to exists and is writable.
pub fn preflight(config: &Config) -> Result<(), IngestError> {
    if let Some((key, dir)) = config.scratch_overlap() {
        return Err(IngestError::layout(
            &config.paths.scratch_dir,
            format!("scratch directory would delete {} '{}'", key, dir.display()),
        ));
    }
    let mut dirs = vec![&config.paths.archive_dir, &config.paths.media_dir];
    if config.logging.file {
        dirs.push(&config.paths.logs_dir);
    }
    for dir in dirs {
        fs::create_dir_all(dir).map_err(|e| IngestError::layout(dir, e))?;
        let probe = dir.join(PROBE_FILE);
        fs::write(&probe, b"ok").map_err(|e| IngestError::layout(dir, e))?;
        fs::remove_file(&probe).map_err(|e| IngestError::layout(dir, e))?;
    }
    Ok(())
}

/// Read the posts metadata file as a JSON array of raw records.
pub fn read_posts_file(path: &Path) -> Result<Vec<serde_json::Value>, IngestError> {
    if !path.is_file() {
        return Err(IngestError::MissingSource(path.to_path_buf()));
    }
    let format_err = |reason: String| IngestError::SourceFormat {
        path: path.to_path_buf(),
        reason,
    };
    let text = fs::read_to_string(path).map_err(|e| format_err(e.to_string()))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| format_err(e.to_string()))?;
    match value {
        serde_json::Value::Array(records) => Ok(records),
        other => Err(format_err(format!(
            "top-level value is {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Write the normalized posts as pretty JSON. Failure is only logged.
pub fn write_artifact(path: &Path, posts: &[NormalizedPost]) {
    let written = serde_json::to_vec_pretty(posts)
        .map_err(|e| e.to_string())
        .and_then(|bytes| fs::write(path, bytes).map_err(|e| e.to_string()));
    match written {
        Ok(()) => tracing::debug!(path = %path.display(), "wrote diagnostics artifact"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to write diagnostics artifact"),
    }
}

/// Run one full ingestion.
///
/// `explicit_archive` bypasses discovery in `paths.archive_dir`.
pub async fn run_ingest<B: SearchBackend + ?Sized>(
    config: &Config,
    backend: &B,
    reporter: &dyn IngestReporter,
    explicit_archive: Option<&Path>,
) -> IngestOutcome {
    let mut report = IngestReport::default();
    let result = run_steps(config, backend, reporter, explicit_archive, &mut report).await;

    let outcome = match result {
        Ok(()) => {
            tracing::info!(
                indexed = report.indexed,
                skipped = report.skipped,
                media = report.media_copied,
                "ingestion finished"
            );
            IngestOutcome {
                success: true,
                message: None,
                report,
            }
        }
        Err(e) => {
            tracing::error!(kind = e.kind(), error = %e, "ingestion failed");
            IngestOutcome {
                success: false,
                message: Some(e.to_string()),
                report,
            }
        }
    };
    reporter.report(IngestEvent::Finished {
        success: outcome.success,
        message: outcome.message.clone(),
    });
    outcome
}

async fn run_steps<B: SearchBackend + ?Sized>(
    config: &Config,
    backend: &B,
    reporter: &dyn IngestReporter,
    explicit_archive: Option<&Path>,
    report: &mut IngestReport,
) -> Result<(), IngestError> {
    let enter = |stage: IngestStage| {
        tracing::info!(%stage, "stage started");
        reporter.report(IngestEvent::Stage { stage });
    };

    enter(IngestStage::Preflight);
    preflight(config)?;

    enter(IngestStage::Discover);
    let archive = locate_archive(&config.paths.archive_dir, explicit_archive)?;
    tracing::info!(archive = %archive.display(), "found archive");
    report.archive = Some(archive.clone());
    if is_within(&archive, &config.paths.scratch_dir) {
        return Err(IngestError::layout(
            &archive,
            "archive lies inside the scratch directory",
        ));
    }

    enter(IngestStage::Extract);
    report.extracted = extract_archive(&archive, &config.paths.scratch_dir)?;

    enter(IngestStage::Transform);
    let records = read_posts_file(&config.posts_path())?;
    let options = TransformOptions::now(config.ingest.media_scheme, config.ingest.timezone);
    let transformed = transform_records(records, &options);
    for skip in &transformed.skipped {
        tracing::warn!(index = skip.index, reason = %skip.reason, "skipping record");
        reporter.report(IngestEvent::RecordSkipped {
            index: skip.index,
            reason: skip.reason.to_string(),
        });
    }
    report.records_seen = transformed.seen();
    report.posts_kept = transformed.posts.len();
    report.skipped = transformed.skipped.len();
    tracing::info!(
        seen = report.records_seen,
        kept = report.posts_kept,
        skipped = report.skipped,
        "records transformed"
    );

    let artifact = config.artifact_path();
    if let Some(path) = &artifact {
        write_artifact(path, &transformed.posts);
    }

    enter(IngestStage::Connect);
    connect(backend, config.backend.retry_policy(), reporter).await?;

    enter(IngestStage::RebuildIndex);
    let body = CreateIndexRequest::for_posts(config.backend.shards, config.backend.replicas);
    rebuild_index(backend, &config.backend.index, &body).await?;

    enter(IngestStage::Load);
    let loaded = load_documents(backend, &config.backend.index, &transformed.posts, reporter).await;
    report.indexed = loaded.indexed.len();
    report.load_failures = loaded.failures;

    enter(IngestStage::Relocate);
    let relocated = relocate_media(
        &config.paths.scratch_dir,
        &config.paths.media_dir,
        config.ingest.media_scheme,
        reporter,
    )?;
    report.media_copied = relocated.copied;
    report.media_warnings = relocated.warnings;

    enter(IngestStage::Cleanup);
    cleanup(&config.paths.scratch_dir, artifact.as_deref());
    Ok(())
}

/// `pix ingest`: run against the configured Elasticsearch backend and print
/// a summary on stdout.
pub async fn run_ingest_command(
    config: &Config,
    archive: Option<PathBuf>,
    progress: ProgressMode,
) -> Result<()> {
    let backend = ElasticBackend::from_config(&config.backend)?;
    let reporter = progress.reporter();
    let outcome = run_ingest(config, &backend, reporter.as_ref(), archive.as_deref()).await;
    let report = &outcome.report;

    println!("ingest {}", config.backend.index);
    if let Some(path) = &report.archive {
        println!("  archive: {}", path.display());
    }
    println!(
        "  extracted: {} entries, {} files",
        report.extracted.entries, report.extracted.files
    );
    println!("  records seen: {}", report.records_seen);
    println!("  skipped: {}", report.skipped);
    println!("  indexed: {}", report.indexed);
    println!("  load failures: {}", report.load_failures.len());
    println!("  media copied: {}", report.media_copied);
    println!("  media warnings: {}", report.media_warnings.len());

    if !outcome.success {
        bail!(
            "{}",
            outcome.message.as_deref().unwrap_or("ingestion failed")
        );
    }
    println!("ok");
    Ok(())
}
