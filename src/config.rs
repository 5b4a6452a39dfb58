//! TOML configuration.
//!
//! Every section has defaults, so an empty file (or [`Config::minimal`])
//! describes the conventional layout: archives in `./ig_data`, media in
//! `./media`, a local backend on port 9200.

use anyhow::{bail, Context, Result};
use chrono::FixedOffset;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use postindex_core::media::MediaPathScheme;
use postindex_core::query::QueryOptions;
use postindex_core::transform::{parse_offset, TimeZoneSpec};

use crate::logging::LoggingConfig;
use crate::retry::RetryPolicy;

/// Environment variable that overrides `backend.url`.
pub const BACKEND_URL_ENV: &str = "PIX_BACKEND_URL";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub url: String,
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_shards")]
    pub shards: u32,
    #[serde(default)]
    pub replicas: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            index: default_index(),
            connect_attempts: default_connect_attempts(),
            retry_interval_secs: default_retry_interval_secs(),
            timeout_secs: default_timeout_secs(),
            shards: default_shards(),
            replicas: 0,
        }
    }
}

fn default_backend_url() -> String {
    "http://localhost:9200".to_string()
}
fn default_index() -> String {
    "ig_data".to_string()
}
fn default_connect_attempts() -> u32 {
    5
}
fn default_retry_interval_secs() -> u64 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_shards() -> u32 {
    1
}

impl BackendConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.connect_attempts,
            Duration::from_secs(self.retry_interval_secs),
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// Directory holding the export archive and the diagnostics artifact.
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,
    /// Scratch extraction root, removed after every successful run.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    /// Permanent media root. Rewritten URIs (`media/posts/...`) resolve here.
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            archive_dir: default_archive_dir(),
            scratch_dir: default_scratch_dir(),
            media_dir: default_media_dir(),
            logs_dir: default_logs_dir(),
        }
    }
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("./ig_data")
}
fn default_scratch_dir() -> PathBuf {
    PathBuf::from("./ig_data/tmp_extract")
}
fn default_media_dir() -> PathBuf {
    PathBuf::from("./media")
}
fn default_logs_dir() -> PathBuf {
    PathBuf::from("./logs")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Posts metadata file, relative to the scratch root.
    #[serde(default = "default_posts_file")]
    pub posts_file: PathBuf,
    #[serde(default)]
    pub media_scheme: MediaPathScheme,
    /// `local`, `UTC`, or a fixed `+HH:MM` offset for post timestamps.
    #[serde(default)]
    pub timezone: TimeZoneSpec,
    #[serde(default = "default_true")]
    pub write_artifact: bool,
    #[serde(default = "default_artifact_name")]
    pub artifact_name: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            posts_file: default_posts_file(),
            media_scheme: MediaPathScheme::default(),
            timezone: TimeZoneSpec::default(),
            write_artifact: true,
            artifact_name: default_artifact_name(),
        }
    }
}

fn default_posts_file() -> PathBuf {
    PathBuf::from("your_instagram_activity/content/posts_1.json")
}
fn default_true() -> bool {
    true
}
fn default_artifact_name() -> String {
    "posts.normalized.json".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_result_cap")]
    pub result_cap: usize,
    /// Offset for date-range bounds and month buckets.
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            result_cap: default_result_cap(),
            utc_offset: default_utc_offset(),
        }
    }
}

fn default_page_size() -> usize {
    postindex_core::paginate::DEFAULT_PAGE_SIZE
}
fn default_result_cap() -> usize {
    postindex_core::query::DEFAULT_RESULT_CAP
}
fn default_utc_offset() -> String {
    "+00:00".to_string()
}

impl RetrievalConfig {
    /// Parsed offset. Validated by [`load_config`].
    pub fn offset(&self) -> Result<FixedOffset> {
        parse_offset(&self.utc_offset).with_context(|| {
            format!(
                "retrieval.utc_offset '{}' is not +HH:MM, -HH:MM, or UTC",
                self.utc_offset
            )
        })
    }

    pub fn query_options(&self) -> Result<QueryOptions> {
        Ok(QueryOptions {
            offset: self.offset()?,
            result_cap: self.result_cap,
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Config {
    /// All defaults; used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Absolute location of the posts metadata file inside the scratch root.
    pub fn posts_path(&self) -> PathBuf {
        self.paths.scratch_dir.join(&self.ingest.posts_file)
    }

    /// Where the diagnostics artifact is written, if enabled.
    pub fn artifact_path(&self) -> Option<PathBuf> {
        self.ingest
            .write_artifact
            .then(|| self.paths.archive_dir.join(&self.ingest.artifact_name))
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            if !url.trim().is_empty() {
                self.backend.url = url;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.backend.index.trim().is_empty() {
            bail!("backend.index must not be empty");
        }
        if self.backend.index != self.backend.index.to_lowercase() {
            bail!("backend.index must be lowercase");
        }
        if self.backend.connect_attempts == 0 {
            bail!("backend.connect_attempts must be >= 1");
        }
        if self.backend.shards == 0 {
            bail!("backend.shards must be >= 1");
        }
        if !self.backend.url.starts_with("http://") && !self.backend.url.starts_with("https://") {
            bail!(
                "backend.url must start with http:// or https:// (got '{}')",
                self.backend.url
            );
        }
        if self.retrieval.page_size == 0 {
            bail!("retrieval.page_size must be >= 1");
        }
        if self.retrieval.result_cap == 0 {
            bail!("retrieval.result_cap must be >= 1");
        }
        self.retrieval.offset()?;
        if self.ingest.posts_file.is_absolute() {
            bail!("ingest.posts_file must be relative to the scratch root");
        }
        if self.ingest.artifact_name.trim().is_empty() {
            bail!("ingest.artifact_name must not be empty");
        }
        self.validate_scratch_dir()?;
        Ok(())
    }

    /// The scratch root is wiped before every extraction, so it must not be,
    /// or contain, any directory whose contents outlive a run.
    fn validate_scratch_dir(&self) -> Result<()> {
        if let Some((key, dir)) = self.scratch_overlap() {
            bail!(
                "paths.scratch_dir '{}' must not be or contain {} '{}'",
                self.paths.scratch_dir.display(),
                key,
                dir.display()
            );
        }
        Ok(())
    }

    /// First kept directory that lies at or under the scratch root.
    pub fn scratch_overlap(&self) -> Option<(&'static str, &Path)> {
        [
            ("paths.archive_dir", self.paths.archive_dir.as_path()),
            ("paths.media_dir", self.paths.media_dir.as_path()),
            ("paths.logs_dir", self.paths.logs_dir.as_path()),
        ]
        .into_iter()
        .find(|(_, dir)| is_within(dir, &self.paths.scratch_dir))
    }
}

/// Whether `path` is `root` or lies under it, compared lexically.
pub fn is_within(path: &Path, root: &Path) -> bool {
    normalize_path(path).starts_with(normalize_path(root))
}

/// Absolute, lexically normalized form of `path` (`.` and `..` resolved
/// without touching the filesystem).
fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse, apply environment overrides, and validate.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.apply_env();
    config.validate()?;
    Ok(config)
}

/// Load `path` when it exists, otherwise fall back to defaults.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        return load_config(path);
    }
    let mut config = Config::minimal();
    config.apply_env();
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.backend.index, "ig_data");
        assert_eq!(cfg.backend.connect_attempts, 5);
        assert_eq!(cfg.backend.retry_interval_secs, 5);
        assert_eq!(cfg.retrieval.page_size, 10);
        assert_eq!(cfg.ingest.media_scheme, MediaPathScheme::DateDir);
        assert_eq!(cfg.ingest.timezone, TimeZoneSpec::Local);
        assert_eq!(
            cfg.posts_path(),
            PathBuf::from("./ig_data/tmp_extract/your_instagram_activity/content/posts_1.json")
        );
        cfg.validate().unwrap();
    }

    #[test]
    fn parses_full_file() {
        let cfg: Config = toml::from_str(
            r#"
[backend]
url = "http://elasticsearch:9200"
index = "posts"
connect_attempts = 3
retry_interval_secs = 1

[paths]
archive_dir = "/app/ig_data"
scratch_dir = "/app/ig_data/tmp_extract"
media_dir = "/app/media"

[ingest]
media_scheme = "flat"
timezone = "+08:00"
write_artifact = false

[retrieval]
page_size = 25
utc_offset = "+08:00"

[logging]
level = "debug"
format = "json"
"#,
        )
        .unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.backend.url, "http://elasticsearch:9200");
        assert_eq!(cfg.ingest.media_scheme, MediaPathScheme::Flat);
        assert_eq!(cfg.ingest.timezone.to_string(), "+08:00");
        assert_eq!(cfg.artifact_path(), None);
        assert_eq!(cfg.retrieval.query_options().unwrap().result_cap, 10_000);
        assert_eq!(
            cfg.backend.retry_policy(),
            RetryPolicy::fixed(3, Duration::from_secs(1))
        );
    }

    #[test]
    fn rejects_invalid_values() {
        for bad in [
            "[backend]\nconnect_attempts = 0",
            "[backend]\nindex = \"IG\"",
            "[backend]\nurl = \"localhost:9200\"",
            "[retrieval]\npage_size = 0",
            "[retrieval]\nutc_offset = \"UTC+8\"",
            "[paths]\narchive_dir = \"/x/ig\"\nscratch_dir = \"/x/ig\"",
            "[paths]\nscratch_dir = \".\"",
            "[paths]\nscratch_dir = \"./media/..\"",
            "[paths]\nmedia_dir = \"/srv/pix/media\"\nscratch_dir = \"/srv/pix\"",
            "[paths]\nlogs_dir = \"./tmp/logs\"\nscratch_dir = \"./tmp\"",
            "[ingest]\nposts_file = \"/abs/posts_1.json\"",
        ] {
            let cfg: Config = toml::from_str(bad).unwrap();
            assert!(cfg.validate().is_err(), "accepted: {}", bad);
        }
    }

    #[test]
    fn offset_keys_accept_the_same_values() {
        for value in ["UTC", "Z", "+00:00"] {
            let cfg = parse_config(&format!(
                "[ingest]\ntimezone = \"{value}\"\n[retrieval]\nutc_offset = \"{value}\""
            ))
            .unwrap();
            assert_eq!(cfg.ingest.timezone.to_string(), "+00:00");
            assert_eq!(cfg.retrieval.offset().unwrap().local_minus_utc(), 0);
        }
    }

    #[test]
    fn scratch_dir_may_sit_inside_archive_dir() {
        let cfg = parse_config(
            "[paths]\narchive_dir = \"/data/ig\"\nscratch_dir = \"/data/ig/tmp_extract\"\nmedia_dir = \"/data/media\"\nlogs_dir = \"/data/logs\"",
        )
        .unwrap();
        assert_eq!(cfg.scratch_overlap(), None);
    }

    #[test]
    fn example_file_matches_defaults() {
        let cfg = parse_config(include_str!("../config/pix.example.toml")).unwrap();
        let defaults = Config::minimal();
        assert_eq!(cfg.paths.scratch_dir, defaults.paths.scratch_dir);
        assert_eq!(cfg.ingest.posts_file, defaults.ingest.posts_file);
        assert_eq!(cfg.retrieval.result_cap, defaults.retrieval.result_cap);
        assert_eq!(cfg.server.bind, defaults.server.bind);
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(toml::from_str::<Config>("[ingest]\nmedia_scheme = \"nested\"").is_err());
    }
}
