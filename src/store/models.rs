// SPDX-License-Identifier: MIT OR Apache-2.0

//! Solr documents and response bodies.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::highlight::HighlightMap;
use crate::search::{Match, SearchOptions};

/// Length of the hash suffix in document ids.
const DOC_HASH_LEN: usize = 16;

/// Solr dates are ISO-8601 in UTC with at most millisecond precision.
mod solr_date {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => super::serialize(dt, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|raw| {
                    DateTime::parse_from_rfc3339(&raw)
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(serde::de::Error::custom)
                })
                .transpose()
        }
    }
}

/// One persisted match, flattened into the core's schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub session_id: String,
    pub original_query: String,
    #[serde(with = "solr_date")]
    pub search_time: DateTime<Utc>,
    pub search_time_ms: i64,
    pub workspace_root: String,
    pub file_path: String,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(
        default,
        with = "solr_date::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_modified: Option<DateTime<Utc>>,
    pub line_number: u64,
    pub column_number: u64,
    pub match_text: String,
    pub full_line: String,
    #[serde(default)]
    pub context_before: Vec<String>,
    #[serde(default)]
    pub context_after: Vec<String>,
    pub relevance_score: f32,
    pub match_count_in_file: u64,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub whole_word: bool,
    #[serde(default)]
    pub use_regex: bool,
    /// Solr's query score, present only on search results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

/// Best-effort filesystem facts attached to a stored match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileFacts {
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
}

/// Per-batch values shared by every document of one session.
#[derive(Debug, Clone)]
pub struct SessionStamp<'a> {
    pub session_id: &'a str,
    pub original_query: &'a str,
    pub search_time: DateTime<Utc>,
    pub options: &'a SearchOptions,
}

/// `<session>_<hash of path:line:column>`, stable within a session.
pub fn document_id(session_id: &str, path: &Path, line: u64, column: usize) -> String {
    let key = format!("{}:{}:{}", path.display(), line, column);
    let hash = blake3::hash(key.as_bytes()).to_hex();
    format!("{}_{}", session_id, &hash[..DOC_HASH_LEN])
}

impl StoredDocument {
    pub fn from_match(
        m: &Match,
        stamp: &SessionStamp<'_>,
        match_count_in_file: u64,
        facts: FileFacts,
    ) -> Self {
        let match_text = m
            .submatches
            .first()
            .map(|s| s.text.clone())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| m.text.clone());

        Self {
            id: document_id(stamp.session_id, &m.path, m.line, m.column),
            session_id: stamp.session_id.to_string(),
            original_query: stamp.original_query.to_string(),
            search_time: stamp.search_time,
            search_time_ms: stamp.search_time.timestamp_millis(),
            workspace_root: m.root.display().to_string(),
            file_path: m.path.display().to_string(),
            file_name: m.file_name(),
            file_extension: m.extension(),
            file_size: facts.size,
            file_modified: facts.modified,
            line_number: m.line,
            column_number: m.column as u64,
            match_text,
            full_line: m.text.clone(),
            context_before: m.context_before().map(|c| c.text.clone()).collect(),
            context_after: m.context_after().map(|c| c.text.clone()).collect(),
            relevance_score: m.score,
            match_count_in_file,
            case_sensitive: stamp.options.case_sensitive,
            whole_word: stamp.options.whole_word,
            use_regex: stamp.options.use_regex,
            score: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseHeader {
    #[serde(default)]
    pub status: i64,
    #[serde(default, rename = "QTime")]
    pub qtime: i64,
}

/// Body of `/update` (adds and deletes).
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateResponse {
    #[serde(rename = "responseHeader")]
    pub header: ResponseHeader,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentList {
    #[serde(rename = "numFound")]
    pub num_found: u64,
    #[serde(default)]
    pub start: u64,
    #[serde(default, rename = "maxScore")]
    pub max_score: Option<f32>,
    #[serde(default)]
    pub docs: Vec<StoredDocument>,
}

/// Body of `/select`.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectResponse {
    #[serde(rename = "responseHeader", default)]
    pub header: ResponseHeader,
    pub response: DocumentList,
    #[serde(default)]
    pub highlighting: HighlightMap,
    #[serde(default)]
    pub facets: Option<FacetResponse>,
}

/// JSON facet section of a session listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FacetResponse {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub sessions: Option<Buckets<SessionBucket>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Buckets<T> {
    #[serde(default = "Vec::new")]
    pub buckets: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionBucket {
    pub val: String,
    pub count: u64,
    #[serde(default)]
    pub latest: Option<f64>,
    #[serde(default)]
    pub query: Option<Buckets<ValueBucket>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValueBucket {
    pub val: String,
    pub count: u64,
}

/// `{"error": {"msg": ..., "code": ...}}` as returned on failures.
#[derive(Debug, Clone, Deserialize)]
pub struct SolrErrorBody {
    pub error: SolrError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolrError {
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub code: Option<u16>,
}

/// Body of `admin/ping`.
#[derive(Debug, Clone, Deserialize)]
pub struct PingResponse {
    #[serde(default)]
    pub status: String,
}

/// One stored search session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub original_query: String,
    pub match_count: u64,
    pub search_time: Option<DateTime<Utc>>,
}

impl SessionSummary {
    pub fn from_bucket(bucket: SessionBucket) -> Self {
        let original_query = bucket
            .query
            .and_then(|q| q.buckets.into_iter().next())
            .map(|b| b.val)
            .unwrap_or_default();
        let search_time = bucket
            .latest
            .and_then(|ms| Utc.timestamp_millis_opt(ms as i64).single());
        Self {
            session_id: bucket.val,
            original_query,
            match_count: bucket.count,
            search_time,
        }
    }
}
