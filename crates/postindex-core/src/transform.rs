//! Record transformation: raw export records → [`NormalizedPost`]s.
//!
//! The export double-encodes text: UTF-8 bytes were decoded as latin-1 and
//! re-serialized, so `"café"` arrives as `"cafÃ©"`. Each title is repaired
//! by mapping every character back to its latin-1 byte and decoding the
//! result as UTF-8. Records whose title cannot be repaired are dropped, as
//! are records missing a title or creation timestamp. Nothing here aborts a
//! run; every problem becomes a [`SkipReason`] in the [`TransformReport`].

use chrono::{DateTime, FixedOffset, Local, Offset, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::media::MediaPathScheme;
use crate::models::{
    MediaReference, NormalizedPost, RawPostRecord, SkipReason, SkippedRecord, TransformReport,
};

/// Zone used to render post timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeZoneSpec {
    /// The host's local zone.
    #[default]
    Local,
    Fixed(FixedOffset),
}

impl TimeZoneSpec {
    /// Render epoch seconds as ISO 8601 with an explicit offset.
    pub fn render_epoch(&self, secs: i64) -> Option<String> {
        match self {
            TimeZoneSpec::Local => Local
                .timestamp_opt(secs, 0)
                .single()
                .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, false)),
            TimeZoneSpec::Fixed(offset) => offset
                .timestamp_opt(secs, 0)
                .single()
                .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, false)),
        }
    }

    /// Render an instant in this zone.
    pub fn render(&self, instant: DateTime<Utc>) -> String {
        match self {
            TimeZoneSpec::Local => instant
                .with_timezone(&Local)
                .to_rfc3339_opts(SecondsFormat::Secs, false),
            TimeZoneSpec::Fixed(offset) => instant
                .with_timezone(offset)
                .to_rfc3339_opts(SecondsFormat::Secs, false),
        }
    }
}

impl fmt::Display for TimeZoneSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeZoneSpec::Local => f.write_str("local"),
            TimeZoneSpec::Fixed(offset) => write!(f, "{}", offset),
        }
    }
}

impl FromStr for TimeZoneSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "local" => Ok(TimeZoneSpec::Local),
            other => parse_offset(other)
                .map(TimeZoneSpec::Fixed)
                .ok_or_else(|| format!("invalid timezone '{}': use local or +HH:MM", other)),
        }
    }
}

impl Serialize for TimeZoneSpec {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeZoneSpec {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The `+00:00` offset.
pub fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// Parse `+HH:MM` / `-HH:MM` (or `UTC` / `Z`) into an offset.
pub fn parse_offset(s: &str) -> Option<FixedOffset> {
    let s = s.trim();
    if matches!(s, "UTC" | "utc" | "Z") {
        return Some(utc_offset());
    }
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    if hours.len() != 2 || minutes.len() != 2 {
        return None;
    }
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Per-run transformation settings.
#[derive(Debug, Clone)]
pub struct TransformOptions {
    pub scheme: MediaPathScheme,
    pub zone: TimeZoneSpec,
    /// Ingestion wall-clock time, stamped into every document.
    pub ingested_at: String,
}

impl TransformOptions {
    /// Options stamped with the current time.
    pub fn now(scheme: MediaPathScheme, zone: TimeZoneSpec) -> Self {
        Self {
            scheme,
            zone,
            ingested_at: zone.render(Utc::now()),
        }
    }
}

/// Undo the export's latin-1 double encoding.
pub fn repair_title(title: &str) -> Result<String, String> {
    let mut bytes = Vec::with_capacity(title.len());
    for (pos, ch) in title.chars().enumerate() {
        let code = ch as u32;
        if code > 0xFF {
            return Err(format!(
                "character {:?} at position {} is outside latin-1",
                ch, pos
            ));
        }
        bytes.push(code as u8);
    }
    String::from_utf8(bytes).map_err(|e| e.to_string())
}

/// Transform one decoded record.
pub fn transform_record(
    record: RawPostRecord,
    opts: &TransformOptions,
) -> Result<NormalizedPost, SkipReason> {
    let title = record.title.ok_or(SkipReason::MissingField("title"))?;
    let created = record
        .creation_timestamp
        .ok_or(SkipReason::MissingField("creation_timestamp"))?;

    let content = repair_title(&title).map_err(SkipReason::UndecodableTitle)?;
    let datetime = opts
        .zone
        .render_epoch(created)
        .ok_or(SkipReason::InvalidTimestamp(created))?;

    let media = record
        .media
        .unwrap_or_default()
        .into_iter()
        .map(|m| rewrite_media(m, opts.scheme))
        .collect();

    Ok(NormalizedPost {
        content,
        datetime,
        timestamp: opts.ingested_at.clone(),
        media,
    })
}

fn rewrite_media(mut media: MediaReference, scheme: MediaPathScheme) -> MediaReference {
    if let Some(uri) = scheme.rewrite_uri(&media.uri) {
        media.uri = uri;
    }
    media
}

/// Transform every element of the posts array, preserving input order.
pub fn transform_records(
    records: Vec<serde_json::Value>,
    opts: &TransformOptions,
) -> TransformReport {
    let mut report = TransformReport::default();
    for (index, value) in records.into_iter().enumerate() {
        let outcome = serde_json::from_value::<RawPostRecord>(value)
            .map_err(|e| SkipReason::Malformed(e.to_string()))
            .and_then(|raw| transform_record(raw, opts));
        match outcome {
            Ok(post) => report.posts.push(post),
            Err(reason) => report.skipped.push(SkippedRecord { index, reason }),
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn opts() -> TransformOptions {
        TransformOptions {
            scheme: MediaPathScheme::DateDir,
            zone: TimeZoneSpec::Fixed(utc_offset()),
            ingested_at: "2025-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn repairs_double_encoded_text() {
        assert_eq!(repair_title("cafÃ©").unwrap(), "café");
        assert_eq!(repair_title("plain ascii").unwrap(), "plain ascii");
        // "日本" encoded as UTF-8 then read back as latin-1
        assert_eq!(
            repair_title("\u{e6}\u{97}\u{a5}\u{e6}\u{9c}\u{ac}").unwrap(),
            "日本"
        );
    }

    #[test]
    fn rejects_invalid_utf8_after_reinterpretation() {
        assert!(repair_title("caf\u{e9}").is_err());
    }

    #[test]
    fn rejects_characters_outside_latin1() {
        let err = repair_title("already 日本").unwrap_err();
        assert!(err.contains("outside latin-1"));
    }

    #[test]
    fn renders_timestamp_in_fixed_offset() {
        let zone: TimeZoneSpec = "+08:00".parse().unwrap();
        assert_eq!(
            zone.render_epoch(1_709_251_200).unwrap(),
            "2024-03-01T08:00:00+08:00"
        );
        let utc = TimeZoneSpec::Fixed(utc_offset());
        assert_eq!(
            utc.render_epoch(1_709_251_200).unwrap(),
            "2024-03-01T00:00:00+00:00"
        );
    }

    #[test]
    fn parses_timezone_specs() {
        assert_eq!("local".parse::<TimeZoneSpec>(), Ok(TimeZoneSpec::Local));
        assert_eq!(
            "-05:30".parse::<TimeZoneSpec>(),
            Ok(TimeZoneSpec::Fixed(FixedOffset::west_opt(5 * 3600 + 1800).unwrap()))
        );
        assert!("+5".parse::<TimeZoneSpec>().is_err());
        assert!("+25:00".parse::<TimeZoneSpec>().is_err());
    }

    #[test]
    fn utc_aliases_parse_as_zero_offset() {
        for alias in ["UTC", "utc", "Z", " +00:00 "] {
            assert_eq!(parse_offset(alias), Some(utc_offset()), "{}", alias);
            assert_eq!(
                alias.parse::<TimeZoneSpec>(),
                Ok(TimeZoneSpec::Fixed(utc_offset()))
            );
        }
        assert_eq!(parse_offset("local"), None);
    }

    #[test]
    fn transforms_full_record() {
        let records = vec![json!({
            "title": "Tokyo trip \u{f0}\u{9f}\u{8c}\u{b8}",
            "creation_timestamp": 1_709_251_200,
            "media": [
                {"uri": "media/posts/202403/a.jpg", "creation_timestamp": 1_709_251_100, "title": ""},
                {"uri": "media/posts/202403/b.mp4"}
            ]
        })];
        let report = transform_records(records, &opts());
        assert!(report.skipped.is_empty(), "{:?}", report.skipped);
        let post = &report.posts[0];
        assert_eq!(post.content, "Tokyo trip 🌸");
        assert_eq!(post.datetime, "2024-03-01T00:00:00+00:00");
        assert_eq!(post.timestamp, "2025-01-01T00:00:00+00:00");
        assert_eq!(post.media.len(), 2);
        assert_eq!(post.media[0].uri, "media/posts/202403/a.jpg");
        assert_eq!(post.media[0].extra["creation_timestamp"], json!(1_709_251_100));
        assert_eq!(post.media[1].uri, "media/posts/202403/b.mp4");
    }

    #[test]
    fn missing_media_is_empty() {
        let records = vec![json!({"title": "hi", "creation_timestamp": 0})];
        let report = transform_records(records, &opts());
        assert_eq!(report.posts.len(), 1);
        assert!(report.posts[0].media.is_empty());
    }

    #[test]
    fn skips_bad_records_and_keeps_order() {
        let records = vec![
            json!({"title": "first", "creation_timestamp": 1}),
            json!({"creation_timestamp": 2}),
            json!({"title": "caf\u{e9}", "creation_timestamp": 3}),
            json!({"title": "no time"}),
            json!("not an object"),
            json!({"title": "last", "creation_timestamp": 5}),
        ];
        let report = transform_records(records, &opts());
        let kept: Vec<&str> = report.posts.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(kept, vec!["first", "last"]);
        assert_eq!(report.seen(), 6);

        let reasons: Vec<(usize, &SkipReason)> =
            report.skipped.iter().map(|s| (s.index, &s.reason)).collect();
        assert_eq!(reasons[0], (1, &SkipReason::MissingField("title")));
        assert!(matches!(reasons[1], (2, SkipReason::UndecodableTitle(_))));
        assert_eq!(
            reasons[2],
            (3, &SkipReason::MissingField("creation_timestamp"))
        );
        assert!(matches!(reasons[3], (4, SkipReason::Malformed(_))));
    }

    #[test]
    fn skips_out_of_range_timestamp() {
        let records = vec![json!({"title": "far future", "creation_timestamp": i64::MAX})];
        let report = transform_records(records, &opts());
        assert!(report.posts.is_empty());
        assert_eq!(
            report.skipped[0].reason,
            SkipReason::InvalidTimestamp(i64::MAX)
        );
    }

    #[test]
    fn flat_scheme_applies_to_media() {
        let mut o = opts();
        o.scheme = MediaPathScheme::Flat;
        let records = vec![json!({
            "title": "x",
            "creation_timestamp": 0,
            "media": [{"uri": "media/posts/202403/a.jpg"}, {"uri": ""}]
        })];
        let report = transform_records(records, &o);
        assert_eq!(report.posts[0].media[0].uri, "media/posts/a.jpg");
        assert_eq!(report.posts[0].media[1].uri, "");
    }
}
