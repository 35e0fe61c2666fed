//! The cache record and its storage encoding.
//!
//! A [`CacheEntry`] captures everything needed to answer a later request for
//! the same URL without refetching: the validators the origin handed out
//! (`ETag`, `Expires`, `Last-Modified`), the retained response headers, and
//! the write timestamp used for the hard TTL ceiling.
//!
//! Entries serialize to an ordered 6-tuple so the persisted layout stays
//! stable across restarts and across backends:
//!
//! ```text
//! [url, headers, etag, expires, last_modified, created_at]
//! ```
//!
//! Timestamps are RFC 3339 strings. All backends share this one encoding.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Reserved ETag value marking an entry as unconditionally stale.
pub const FORCE_STALE_ETAG: &str = "-1";

/// Response headers never retained in a cache record: cache-state headers
/// that would be wrong on replay, plus the RFC 9110 hop-by-hop set.
const UNCACHED_HEADERS: &[&str] = &[
    "age",
    "cache-control",
    "date",
    "x-cache",
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// A record in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Cache key: canonical `proto://host/path?query`, query verbatim.
    pub url: String,
    /// Retained response headers, lowercased names.
    pub headers: BTreeMap<String, String>,
    /// Normalized entity tag, if the origin sent one.
    pub etag: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    /// Set once when the entry is written. Entries are replaced wholesale,
    /// never field-merged, so this never moves for a given record.
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Builds a fresh entry from an origin response's headers.
    ///
    /// Extracts and normalizes the validators, filters out headers that must
    /// not be replayed, and stamps `created_at` with `now`.
    pub fn from_origin_headers(url: String, headers: &HeaderMap, now: DateTime<Utc>) -> Self {
        let etag = header_str(headers, "etag").map(normalize_etag);
        let expires = header_str(headers, "expires").and_then(parse_http_datetime);
        let last_modified = header_str(headers, "last-modified").and_then(parse_http_datetime);

        Self {
            url,
            headers: retained_headers(headers),
            etag,
            expires,
            last_modified,
            created_at: now,
        }
    }

    /// Converts the entry to its ordered 6-tuple form.
    pub fn encode(&self) -> EncodedEntry {
        EncodedEntry(
            self.url.clone(),
            self.headers.clone(),
            self.etag.clone(),
            self.expires.map(|ts| ts.to_rfc3339()),
            self.last_modified.map(|ts| ts.to_rfc3339()),
            self.created_at.to_rfc3339(),
        )
    }

    /// Reconstructs an entry from its 6-tuple form.
    pub fn decode(record: EncodedEntry) -> Result<Self, CacheError> {
        let EncodedEntry(url, headers, etag, expires, last_modified, created_at) = record;

        Ok(Self {
            url,
            headers,
            etag,
            expires: expires.as_deref().map(parse_rfc3339).transpose()?,
            last_modified: last_modified.as_deref().map(parse_rfc3339).transpose()?,
            created_at: parse_rfc3339(&created_at)?,
        })
    }

    pub fn to_json(&self) -> Result<Vec<u8>, CacheError> {
        serde_json::to_vec(&self.encode()).map_err(|err| CacheError::Codec(err.to_string()))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, CacheError> {
        let record: EncodedEntry =
            serde_json::from_slice(bytes).map_err(|err| CacheError::Codec(err.to_string()))?;
        Self::decode(record)
    }
}

/// Serialized form of a [`CacheEntry`]:
/// `(url, headers, etag, expires, last_modified, created_at)`.
#[derive(Debug, Serialize, Deserialize)]
pub struct EncodedEntry(
    String,
    BTreeMap<String, String>,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
);

/// Strips the weak-validator prefix and surrounding quotes from an ETag.
///
/// Applied identically when storing an origin response and when comparing a
/// probe response, so `W/"v1"`, `"v1"`, and `v1` all compare equal.
pub fn normalize_etag(raw: impl AsRef<str>) -> String {
    let raw = raw.as_ref().trim();
    raw.strip_prefix("W/").unwrap_or(raw).replace('"', "")
}

/// Parses an HTTP-date header value (RFC 9110 `IMF-fixdate` and friends).
pub fn parse_http_datetime(value: &str) -> Option<DateTime<Utc>> {
    httpdate::parse_http_date(value).ok().map(DateTime::<Utc>::from)
}

fn parse_rfc3339(value: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| CacheError::Codec(format!("bad timestamp {value:?}: {err}")))
}

fn retained_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| !UNCACHED_HEADERS.contains(&name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_owned(), value.to_owned()))
        })
        .collect()
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use http::{HeaderMap, HeaderValue};

    fn sample_entry() -> CacheEntry {
        CacheEntry {
            url: "http://origin.test/a?b=1&a=2".to_owned(),
            headers: BTreeMap::from([
                ("content-type".to_owned(), "text/plain".to_owned()),
                ("server".to_owned(), "origin/1.0".to_owned()),
            ]),
            etag: Some("abc123".to_owned()),
            expires: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
            last_modified: Some(Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()),
            created_at: Utc.with_ymd_and_hms(2024, 4, 15, 8, 30, 0).unwrap(),
        }
    }

    #[test]
    fn normalize_strips_weak_prefix_and_quotes() {
        assert_eq!(normalize_etag("W/\"v1\""), "v1");
        assert_eq!(normalize_etag("\"v1\""), "v1");
        assert_eq!(normalize_etag("v1"), "v1");
        assert_eq!(normalize_etag(" \"33a64df5\" "), "33a64df5");
    }

    #[test]
    fn round_trip_fully_populated() {
        let entry = sample_entry();
        let decoded = CacheEntry::from_json(&entry.to_json().expect("encodes"))
            .expect("decodes");
        assert_eq!(decoded, entry);
    }

    #[test]
    fn round_trip_all_optionals_empty() {
        let entry = CacheEntry {
            etag: None,
            expires: None,
            last_modified: None,
            headers: BTreeMap::new(),
            ..sample_entry()
        };
        let decoded = CacheEntry::from_json(&entry.to_json().expect("encodes"))
            .expect("decodes");
        assert_eq!(decoded, entry);
    }

    #[test]
    fn encodes_as_six_element_array() {
        let json: serde_json::Value =
            serde_json::from_slice(&sample_entry().to_json().expect("encodes")).expect("json");
        let fields = json.as_array().expect("array form");
        assert_eq!(fields.len(), 6);
        assert_eq!(fields[0], "http://origin.test/a?b=1&a=2");
        assert_eq!(fields[2], "abc123");
    }

    #[test]
    fn decode_rejects_garbage_timestamps() {
        let record = EncodedEntry(
            "http://origin.test/".to_owned(),
            BTreeMap::new(),
            None,
            Some("not a timestamp".to_owned()),
            None,
            "2024-04-15T08:30:00+00:00".to_owned(),
        );
        assert!(matches!(
            CacheEntry::decode(record),
            Err(CacheError::Codec(_))
        ));
    }

    #[test]
    fn from_origin_headers_normalizes_and_filters() {
        let mut headers = HeaderMap::new();
        headers.insert("etag", HeaderValue::from_static("W/\"v7\""));
        headers.insert(
            "last-modified",
            HeaderValue::from_static("Mon, 01 Apr 2024 00:00:00 GMT"),
        );
        headers.insert("content-type", HeaderValue::from_static("text/html"));
        headers.insert("cache-control", HeaderValue::from_static("max-age=60"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));

        let now = Utc::now();
        let entry =
            CacheEntry::from_origin_headers("http://origin.test/".to_owned(), &headers, now);

        assert_eq!(entry.etag.as_deref(), Some("v7"));
        assert_eq!(
            entry.last_modified,
            Some(Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(entry.created_at, now);
        assert!(entry.headers.contains_key("content-type"));
        assert!(entry.headers.contains_key("etag"));
        assert!(!entry.headers.contains_key("cache-control"));
        assert!(!entry.headers.contains_key("transfer-encoding"));
    }
}
