//! Ingestion progress reporting.
//!
//! Reports what a `pix ingest` run is doing (current stage, per-record
//! skips, load counts, media warnings) so users can follow a long import.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.
//! These events complement the `tracing` log; they are not a replacement for it.

use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::sync::Mutex;

/// Stage of the ingestion pipeline, in execution order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Preflight,
    Discover,
    Extract,
    Transform,
    Connect,
    RebuildIndex,
    Load,
    Relocate,
    Cleanup,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestStage::Preflight => "preflight",
            IngestStage::Discover => "discover",
            IngestStage::Extract => "extract",
            IngestStage::Transform => "transform",
            IngestStage::Connect => "connect",
            IngestStage::RebuildIndex => "rebuild-index",
            IngestStage::Load => "load",
            IngestStage::Relocate => "relocate",
            IngestStage::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// A single progress event for ingestion.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IngestEvent {
    /// A pipeline stage is starting.
    Stage { stage: IngestStage },
    /// A record was dropped by the transformer.
    RecordSkipped { index: usize, reason: String },
    /// The backend did not answer a ping.
    ConnectRetry {
        attempt: u32,
        attempts: u32,
        error: String,
    },
    /// `n` of `total` documents submitted.
    Loading { n: u64, total: u64 },
    /// The backend rejected one document.
    LoadFailed { position: usize, error: String },
    /// One media file could not be copied.
    MediaWarning { path: String, reason: String },
    /// The run ended.
    Finished {
        success: bool,
        message: Option<String>,
    },
}

/// Reports ingestion progress. Implementations write to stderr (human or JSON).
pub trait IngestReporter: Send + Sync {
    /// Emit a progress event. Called from the ingest pipeline.
    fn report(&self, event: IngestEvent);
}

/// Human-friendly progress on stderr: "ingest  load  1,234 / 5,000 documents".
pub struct StderrProgress;

impl IngestReporter for StderrProgress {
    fn report(&self, event: IngestEvent) {
        let line = match &event {
            IngestEvent::Stage { stage } => format!("ingest  {}...\n", stage),
            IngestEvent::RecordSkipped { index, reason } => {
                format!("ingest  skipped record #{}: {}\n", index, reason)
            }
            IngestEvent::ConnectRetry {
                attempt,
                attempts,
                error,
            } => format!(
                "ingest  backend not ready (attempt {}/{}): {}\n",
                attempt, attempts, error
            ),
            IngestEvent::Loading { n, total } => format!(
                "ingest  load  {} / {} documents\n",
                format_number(*n),
                format_number(*total)
            ),
            IngestEvent::LoadFailed { position, error } => {
                format!("ingest  document #{} rejected: {}\n", position, error)
            }
            IngestEvent::MediaWarning { path, reason } => {
                format!("ingest  media {} not copied: {}\n", path, reason)
            }
            IngestEvent::Finished { success: true, .. } => "ingest  done\n".to_string(),
            IngestEvent::Finished {
                success: false,
                message,
            } => format!(
                "ingest  failed: {}\n",
                message.as_deref().unwrap_or("unknown error")
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IngestReporter for JsonProgress {
    fn report(&self, event: IngestEvent) {
        if let Ok(line) = serde_json::to_string(&event) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IngestReporter for NoProgress {
    fn report(&self, _event: IngestEvent) {}
}

/// Keeps every event in memory. Used by the HTTP API and tests.
#[derive(Default)]
pub struct CollectingProgress {
    events: Mutex<Vec<IngestEvent>>,
}

impl CollectingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<IngestEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Stages entered, in order.
    pub fn stages(&self) -> Vec<IngestStage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                IngestEvent::Stage { stage } => Some(stage),
                _ => None,
            })
            .collect()
    }
}

impl IngestReporter for CollectingProgress {
    fn report(&self, event: IngestEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode. Caller can pass it to ingest.
    pub fn reporter(&self) -> Box<dyn IngestReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

impl std::str::FromStr for ProgressMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => Err(format!(
                "unknown progress mode '{}' (expected off, human, or json)",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_value(IngestEvent::Stage {
            stage: IngestStage::RebuildIndex,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"event": "stage", "stage": "rebuild_index"})
        );
    }

    #[test]
    fn collecting_progress_tracks_stages() {
        let progress = CollectingProgress::new();
        progress.report(IngestEvent::Stage {
            stage: IngestStage::Discover,
        });
        progress.report(IngestEvent::Loading { n: 1, total: 2 });
        progress.report(IngestEvent::Stage {
            stage: IngestStage::Extract,
        });
        assert_eq!(
            progress.stages(),
            vec![IngestStage::Discover, IngestStage::Extract]
        );
        assert_eq!(progress.events().len(), 3);
    }

    #[test]
    fn parses_progress_mode() {
        assert_eq!("json".parse::<ProgressMode>(), Ok(ProgressMode::Json));
        assert!("loud".parse::<ProgressMode>().is_err());
    }
}
