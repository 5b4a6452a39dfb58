//! `pix ping`: backend and layout health at a glance.

use anyhow::{bail, Result};

use postindex_core::backend::SearchBackend;

use crate::config::Config;
use crate::elastic::ElasticBackend;

/// One row of the status table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    pub component: &'static str,
    pub status: String,
    pub healthy: bool,
}

/// Check the backend, the index, and the configured directories.
pub async fn collect_status<B: SearchBackend + ?Sized>(
    config: &Config,
    backend: &B,
    backend_label: &str,
) -> Vec<StatusRow> {
    let mut rows = Vec::new();

    let reachable = backend.ping().await;
    rows.push(StatusRow {
        component: "backend",
        status: match &reachable {
            Ok(()) => format!("OK ({})", backend_label),
            Err(e) => e.to_string(),
        },
        healthy: reachable.is_ok(),
    });

    if reachable.is_ok() {
        let exists = backend.index_exists(&config.backend.index).await;
        rows.push(StatusRow {
            component: "index",
            status: match &exists {
                Ok(true) => format!("OK ({})", config.backend.index),
                Ok(false) => format!("MISSING ({}), run `pix ingest`", config.backend.index),
                Err(e) => e.to_string(),
            },
            healthy: matches!(exists, Ok(true)),
        });
    }

    for (component, dir) in [
        ("archive_dir", &config.paths.archive_dir),
        ("media_dir", &config.paths.media_dir),
    ] {
        let healthy = dir.is_dir();
        rows.push(StatusRow {
            component,
            status: if healthy {
                format!("OK ({})", dir.display())
            } else {
                format!("NOT FOUND ({})", dir.display())
            },
            healthy,
        });
    }
    rows
}

pub async fn run_ping(config: &Config) -> Result<()> {
    let backend = ElasticBackend::from_config(&config.backend)?;
    let rows = collect_status(config, &backend, backend.base_url()).await;

    println!("{:<14} {:<8} STATUS", "COMPONENT", "HEALTHY");
    for row in &rows {
        println!("{:<14} {:<8} {}", row.component, row.healthy, row.status);
    }

    if !rows.first().is_some_and(|r| r.healthy) {
        bail!("search backend at {} is not reachable", backend.base_url());
    }
    Ok(())
}
