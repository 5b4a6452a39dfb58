//! # postindex
//!
//! Turns a personal Instagram data export into a searchable archive.
//!
//! postindex unpacks the export zip, repairs and normalizes each post,
//! rebuilds an Elasticsearch index from scratch, loads the posts, and moves
//! their media into a permanent store. The same index then answers keyword
//! and date-range searches and month-by-month post counts, via the `pix`
//! CLI or a small JSON HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────────┐
//! │ export .zip │──▶│   Pipeline   │──▶│ Elasticsearch │
//! │ posts+media │   │ Transform    │   │  ig_data      │
//! └─────────────┘   └──────┬───────┘   └───────┬───────┘
//!                          │                   │
//!                          ▼          ┌────────┴────────┐
//!                   ┌────────────┐    ▼                 ▼
//!                   │ media/posts│ ┌──────────┐   ┌──────────┐
//!                   └────────────┘ │   CLI    │   │   HTTP   │
//!                                  │  (pix)   │   │  (JSON)  │
//!                                  └──────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cp ~/Downloads/instagram-export.zip ./ig_data/
//! pix ingest                            # rebuild the index from the archive
//! pix search beach --from 2024-01-01    # newest first, 10 per page
//! pix trend                             # posts per month
//! pix serve                             # JSON API + media on :8080
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`error`] | Fatal ingestion errors |
//! | [`archive`] | Archive discovery and extraction |
//! | [`elastic`] | Elasticsearch HTTP backend |
//! | [`retry`] | Fixed-interval retry |
//! | [`index_manager`] | Backend connection and index rebuild |
//! | [`loader`] | Document loading |
//! | [`relocate`] | Media relocation and URI resolution |
//! | [`cleanup`] | Scratch removal |
//! | [`progress`] | Ingestion progress reporting |
//! | [`ingest`] | Pipeline orchestration |
//! | [`search`] | `pix search` / `pix trend` |
//! | [`status`] | `pix ping` |
//! | [`server`] | JSON HTTP API |
//!
//! Models, transformation, query building, pagination, and the backend
//! trait live in the `postindex-core` crate.

pub mod archive;
pub mod cleanup;
pub mod config;
pub mod elastic;
pub mod error;
pub mod index_manager;
pub mod ingest;
pub mod loader;
pub mod logging;
pub mod progress;
pub mod relocate;
pub mod retry;
pub mod search;
pub mod server;
pub mod status;
