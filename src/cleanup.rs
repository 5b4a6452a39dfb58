//! Removal of per-run scratch state.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// What [`cleanup`] managed to remove.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub scratch_removed: bool,
    pub artifact_removed: bool,
}

/// Remove the scratch root and the diagnostics artifact.
///
/// Missing targets are not an error; other failures are logged and ignored.
pub fn cleanup(scratch_root: &Path, artifact: Option<&Path>) -> CleanupSummary {
    let scratch_removed = match fs::remove_dir_all(scratch_root) {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(path = %scratch_root.display(), error = %e, "failed to remove scratch directory");
            false
        }
    };

    let artifact_removed = match artifact.map(fs::remove_file) {
        Some(Ok(())) => true,
        Some(Err(e)) if e.kind() != ErrorKind::NotFound => {
            tracing::warn!(error = %e, "failed to remove diagnostics artifact");
            false
        }
        _ => false,
    };

    tracing::debug!(scratch_removed, artifact_removed, "cleanup finished");
    CleanupSummary {
        scratch_removed,
        artifact_removed,
    }
}
