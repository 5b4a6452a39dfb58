//! Shared fixtures: export archives built on the fly and configs rooted in a
//! temp directory.

#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use postindex::config::Config;
use postindex_core::transform::{utc_offset, TimeZoneSpec};
use serde_json::{json, Value};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

pub const POSTS_ENTRY: &str = "your_instagram_activity/content/posts_1.json";

/// Latin-1 mis-encoding of "🌸 spring", as the export writes it.
pub const MOJIBAKE_SPRING: &str = "\u{f0}\u{9f}\u{8c}\u{b8} spring";

/// Write a zip with the given entries.
pub fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, body) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(body).unwrap();
    }
    zip.finish().unwrap();
}

/// Three posts: two valid (one with media), one whose title is not
/// repairable.
pub fn sample_posts() -> Value {
    json!([
        {
            "title": MOJIBAKE_SPRING,
            "creation_timestamp": 1710496800,
            "media": [
                {"uri": "media/posts/202403/spring.jpg", "creation_timestamp": 1710496800}
            ]
        },
        {
            "title": "\u{c3}\u{a9}t\u{c3}\u{a9}",
            "creation_timestamp": 1715000000,
            "media": [{"uri": "media/posts/202405/summer.jpg"}]
        },
        {
            "title": "\u{263a} not latin-1",
            "creation_timestamp": 1716000000
        }
    ])
}

/// Export archive with `posts` as the metadata file plus the media files it
/// references.
pub fn sample_archive(path: &Path, posts: &Value) {
    write_zip(
        path,
        &[
            (POSTS_ENTRY, serde_json::to_vec(posts).unwrap()),
            ("media/posts/202403/spring.jpg", b"spring-bytes".to_vec()),
            ("media/posts/202405/summer.jpg", b"summer-bytes".to_vec()),
        ],
    );
}

/// A workspace with every configured path inside a temp dir.
pub struct Workspace {
    pub tmp: TempDir,
    pub config: Config,
}

impl Workspace {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let mut config = Config::minimal();
        config.paths.archive_dir = root.join("ig_data");
        config.paths.scratch_dir = root.join("ig_data/tmp_extract");
        config.paths.media_dir = root.join("media");
        config.paths.logs_dir = root.join("logs");
        config.ingest.timezone = TimeZoneSpec::Fixed(utc_offset());
        config.backend.connect_attempts = 3;
        config.backend.retry_interval_secs = 0;
        fs::create_dir_all(&config.paths.archive_dir).unwrap();
        Self { tmp, config }
    }

    pub fn root(&self) -> &Path {
        self.tmp.path()
    }

    pub fn archive_path(&self, name: &str) -> PathBuf {
        self.config.paths.archive_dir.join(name)
    }

    pub fn media(&self, relative: &str) -> PathBuf {
        self.config.paths.media_dir.join(relative)
    }
}
