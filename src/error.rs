//! Fatal ingestion errors.
//!
//! Any of these stops a run before its remaining steps. Per-record and
//! per-file problems are not errors: they are collected into the run's
//! reports and logged.

use std::path::PathBuf;

use postindex_core::backend::BackendError;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// A required directory is missing and cannot be created, or is not
    /// writable.
    #[error("directory {path} is not usable: {reason}")]
    Layout { path: PathBuf, reason: String },

    /// No archive, several archives, or an explicit path that is not a file.
    #[error("archive discovery failed: {0}")]
    Discovery(String),

    #[error("posts metadata file not found at {0}")]
    MissingSource(PathBuf),

    #[error("posts metadata file {path} is not a JSON array: {reason}")]
    SourceFormat { path: PathBuf, reason: String },

    #[error("failed to extract {archive}: {reason}")]
    Extraction { archive: PathBuf, reason: String },

    #[error("search backend unavailable after {attempts} attempt(s): {last}")]
    BackendUnavailable { attempts: u32, last: BackendError },

    #[error("failed to set up index '{index}': {source}")]
    IndexSetup {
        index: String,
        #[source]
        source: BackendError,
    },

    #[error("media relocation failed at {path}: {reason}")]
    Relocation { path: PathBuf, reason: String },
}

impl IngestError {
    pub(crate) fn layout(path: impl Into<PathBuf>, err: impl ToString) -> Self {
        IngestError::Layout {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn extraction(archive: impl Into<PathBuf>, err: impl ToString) -> Self {
        IngestError::Extraction {
            archive: archive.into(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn relocation(path: impl Into<PathBuf>, err: impl ToString) -> Self {
        IngestError::Relocation {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    /// Short stable name for logs and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Layout { .. } => "layout",
            IngestError::Discovery(_) => "discovery",
            IngestError::MissingSource(_) => "missing_source",
            IngestError::SourceFormat { .. } => "source_format",
            IngestError::Extraction { .. } => "extraction",
            IngestError::BackendUnavailable { .. } => "backend_unavailable",
            IngestError::IndexSetup { .. } => "index_setup",
            IngestError::Relocation { .. } => "relocation",
        }
    }
}
