//! Media relocation into the permanent store.
//!
//! Files under `<scratch>/media/posts` are copied to
//! `<media_root>/posts/...`, each to the path its rewritten URI names. The
//! target is computed from the file's path relative to the scratch root,
//! which is exactly the URI the export references it by, so indexed URIs
//! and copied files always line up.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use postindex_core::media::{split_parent_and_name, MediaPathScheme, MEDIA_URI_PREFIX};

use crate::error::IngestError;
use crate::progress::{IngestEvent, IngestReporter};

/// A file that could not be copied, or whose copy replaced an earlier file
/// with the same target. The run continues either way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelocationWarning {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelocationReport {
    pub copied: usize,
    pub warnings: Vec<RelocationWarning>,
}

/// Directory of the permanent store that holds post media.
pub fn posts_dir(media_root: &Path) -> PathBuf {
    media_root.join("posts")
}

/// Replace `<media_root>/posts` with the media of the extracted archive.
///
/// The old tree is always removed, even when the archive has no media.
pub fn relocate_media(
    scratch_root: &Path,
    media_root: &Path,
    scheme: MediaPathScheme,
    reporter: &dyn IngestReporter,
) -> Result<RelocationReport, IngestError> {
    let target_root = posts_dir(media_root);
    if target_root.exists() {
        fs::remove_dir_all(&target_root).map_err(|e| IngestError::relocation(&target_root, e))?;
    }
    fs::create_dir_all(&target_root).map_err(|e| IngestError::relocation(&target_root, e))?;

    let mut report = RelocationReport::default();
    let source_root = scratch_root.join(MEDIA_URI_PREFIX);
    if !source_root.is_dir() {
        tracing::info!(path = %source_root.display(), "archive has no post media");
        return Ok(report);
    }

    for entry in WalkDir::new(&source_root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| source_root.clone());
                warn(&mut report, reporter, path, e.to_string());
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let source = entry.path();
        let Some(target) = target_for(scratch_root, source, &target_root, scheme) else {
            warn(
                &mut report,
                reporter,
                source.to_path_buf(),
                "path is not representable in the media scheme".to_string(),
            );
            continue;
        };

        if target.exists() {
            warn(
                &mut report,
                reporter,
                source.to_path_buf(),
                format!("overwrote {} copied from an earlier file", target.display()),
            );
        }
        let copied = target
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| fs::copy(source, &target));
        match copied {
            Ok(_) => report.copied += 1,
            Err(e) => warn(&mut report, reporter, source.to_path_buf(), e.to_string()),
        }
    }

    tracing::info!(
        copied = report.copied,
        warnings = report.warnings.len(),
        target = %target_root.display(),
        "media relocated"
    );
    Ok(report)
}

fn target_for(
    scratch_root: &Path,
    source: &Path,
    target_root: &Path,
    scheme: MediaPathScheme,
) -> Option<PathBuf> {
    let relative = source.strip_prefix(scratch_root).ok()?;
    let relative = relative.to_str()?;
    let (parent, filename) = split_parent_and_name(relative)?;
    Some(target_root.join(scheme.store_path(parent, filename)))
}

fn warn(
    report: &mut RelocationReport,
    reporter: &dyn IngestReporter,
    path: PathBuf,
    reason: String,
) {
    tracing::warn!(path = %path.display(), reason = %reason, "media warning");
    reporter.report(IngestEvent::MediaWarning {
        path: path.display().to_string(),
        reason: reason.clone(),
    });
    report.warnings.push(RelocationWarning { path, reason });
}

/// Map a rewritten URI (`media/posts/...`) to its file under `media_root`.
///
/// Returns `None` for URIs outside the scheme or ones that would escape the
/// root.
pub fn resolve_media_uri(media_root: &Path, uri: &str) -> Option<PathBuf> {
    let rest = uri.strip_prefix("media/")?;
    if !rest.starts_with("posts/") {
        return None;
    }
    let relative = Path::new(rest);
    let safe = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    safe.then(|| media_root.join(relative))
}
