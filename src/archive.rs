//! Archive discovery and extraction.
//!
//! An ingestion run starts from exactly one `.zip` export. [`locate_archive`]
//! finds it without touching anything; [`extract_archive`] unpacks it into a
//! fresh scratch root and makes sure the process can read and write
//! everything it extracted.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::IngestError;

/// What [`extract_archive`] produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractSummary {
    /// Zip entries written (files and directories).
    pub entries: usize,
    /// Regular files written.
    pub files: usize,
    /// Filesystem entries whose permissions were adjusted.
    pub normalized: usize,
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("zip"))
}

/// Find the archive to ingest.
///
/// An explicit path must name an existing file. Otherwise `archive_dir`
/// must hold exactly one regular file with a `.zip` extension.
pub fn locate_archive(archive_dir: &Path, explicit: Option<&Path>) -> Result<PathBuf, IngestError> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(IngestError::Discovery(format!(
                "archive {} does not exist or is not a file",
                path.display()
            )));
        }
        return Ok(path.to_path_buf());
    }

    let entries = fs::read_dir(archive_dir).map_err(|e| {
        IngestError::Discovery(format!(
            "cannot read archive directory {}: {}",
            archive_dir.display(),
            e
        ))
    })?;

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| IngestError::Discovery(e.to_string()))?;
        let path = entry.path();
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if is_file && is_zip(&path) {
            candidates.push(path);
        }
    }

    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        0 => Err(IngestError::Discovery(format!(
            "no .zip archive found in {}",
            archive_dir.display()
        ))),
        n => Err(IngestError::Discovery(format!(
            "expected exactly one .zip archive in {}, found {}",
            archive_dir.display(),
            n
        ))),
    }
}

/// Unpack `archive` into `scratch_root`.
///
/// A scratch root left behind by an aborted run is removed first. Entries
/// whose names would escape the scratch root, and symlink entries, fail the
/// whole extraction.
pub fn extract_archive(archive: &Path, scratch_root: &Path) -> Result<ExtractSummary, IngestError> {
    if scratch_root.exists() {
        tracing::warn!(path = %scratch_root.display(), "removing stale scratch directory");
        fs::remove_dir_all(scratch_root).map_err(|e| IngestError::extraction(archive, e))?;
    }
    fs::create_dir_all(scratch_root).map_err(|e| IngestError::extraction(archive, e))?;

    let file = File::open(archive).map_err(|e| IngestError::extraction(archive, e))?;
    let mut zip = ZipArchive::new(file).map_err(|e| IngestError::extraction(archive, e))?;

    let mut summary = ExtractSummary::default();
    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| IngestError::extraction(archive, e))?;
        let name = entry.name().to_string();

        let Some(relative) = entry.enclosed_name() else {
            return Err(IngestError::extraction(
                archive,
                format!("entry '{}' escapes the extraction root", name),
            ));
        };
        if entry.unix_mode().is_some_and(|m| m & 0o170000 == 0o120000) {
            return Err(IngestError::extraction(
                archive,
                format!("entry '{}' is a symlink", name),
            ));
        }

        let out = scratch_root.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&out).map_err(|e| IngestError::extraction(archive, e))?;
        } else {
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent).map_err(|e| IngestError::extraction(archive, e))?;
            }
            let mut target = File::create(&out).map_err(|e| IngestError::extraction(archive, e))?;
            io::copy(&mut entry, &mut target).map_err(|e| {
                IngestError::extraction(archive, format!("entry '{}': {}", name, e))
            })?;
            summary.files += 1;
        }
        summary.entries += 1;
    }

    summary.normalized =
        grant_owner_access(scratch_root).map_err(|e| IngestError::extraction(archive, e))?;

    tracing::info!(
        archive = %archive.display(),
        entries = summary.entries,
        files = summary.files,
        "archive extracted"
    );
    Ok(summary)
}

/// Add owner read/write (and traverse, for directories) to everything
/// under `root`. Other permission bits are left as they are.
#[cfg(unix)]
fn grant_owner_access(root: &Path) -> io::Result<usize> {
    use std::os::unix::fs::PermissionsExt;

    let mut changed = 0;
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(io::Error::other)?;
        let wanted = if entry.file_type().is_dir() { 0o700 } else { 0o600 };
        let metadata = entry.metadata().map_err(io::Error::other)?;
        let mode = metadata.permissions().mode();
        if mode & wanted != wanted {
            fs::set_permissions(entry.path(), fs::Permissions::from_mode(mode | wanted))?;
            changed += 1;
        }
    }
    Ok(changed)
}

#[cfg(not(unix))]
fn grant_owner_access(root: &Path) -> io::Result<usize> {
    let mut changed = 0;
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(io::Error::other)?;
        let mut perms = entry.metadata().map_err(io::Error::other)?.permissions();
        if perms.readonly() {
            perms.set_readonly(false);
            fs::set_permissions(entry.path(), perms)?;
            changed += 1;
        }
    }
    Ok(changed)
}
