//! Media path schemes.
//!
//! The export stores media under its own internal tree
//! (`media/posts/202403/abc.jpg`). Indexed documents instead reference a
//! stable relative layout rooted at the permanent media store. The same
//! scheme decides both the URI written into the index and where the
//! relocator copies each file, so the two can never disagree.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Leading segments of every rewritten URI.
pub const MEDIA_URI_PREFIX: &str = "media/posts";

/// Layout of the permanent media store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaPathScheme {
    /// `media/posts/<parent>/<filename>`, or `media/posts/<filename>` when
    /// the original path has no parent segment.
    #[default]
    DateDir,
    /// Always `media/posts/<filename>`.
    Flat,
}

impl MediaPathScheme {
    /// Path of a media file relative to the `posts` directory of the store.
    pub fn store_path(&self, parent: Option<&str>, filename: &str) -> String {
        match (self, parent) {
            (MediaPathScheme::DateDir, Some(parent)) => format!("{}/{}", parent, filename),
            _ => filename.to_string(),
        }
    }

    /// Rewrite an export URI into the permanent relative scheme.
    ///
    /// Returns `None` when the URI has no non-empty segment.
    pub fn rewrite_uri(&self, uri: &str) -> Option<String> {
        let (parent, filename) = split_parent_and_name(uri)?;
        Some(format!(
            "{}/{}",
            MEDIA_URI_PREFIX,
            self.store_path(parent, filename)
        ))
    }
}

/// Split a `/`- or `\`-separated path into its immediate parent segment and
/// final segment, ignoring empty segments.
pub fn split_parent_and_name(path: &str) -> Option<(Option<&str>, &str)> {
    let mut segments = path
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".");
    let mut last = segments.next()?;
    let mut parent = None;
    for seg in segments {
        parent = Some(last);
        last = seg;
    }
    Some((parent, last))
}

impl fmt::Display for MediaPathScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaPathScheme::DateDir => f.write_str("date-dir"),
            MediaPathScheme::Flat => f.write_str("flat"),
        }
    }
}

impl FromStr for MediaPathScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date-dir" => Ok(MediaPathScheme::DateDir),
            "flat" => Ok(MediaPathScheme::Flat),
            other => Err(format!(
                "unknown media scheme '{}'. Use date-dir or flat.",
                other
            )),
        }
    }
}
