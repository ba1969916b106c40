// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session store - persists search results in Solr and searches them again
//!
//! Every call goes straight to the store; nothing is cached in process, so
//! other writers may store or delete sessions concurrently.

pub mod client;
pub mod models;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::{Config, HighlightConfig, QueryConfig, StoreConfig};
use crate::errors::{PipelineError, Result};
use crate::highlight::snippets::apply_with_config;
use crate::highlight::RenderedDocument;
use crate::query::translate::quote_term;
use crate::query::QueryTranslator;
use crate::search::{Match, QuerySpec, SearchOptions};
pub use client::SolrClient;
use models::{FileFacts, SessionStamp, SessionSummary, StoredDocument};

/// Text fields the store is asked to highlight.
const HIGHLIGHT_FIELDS: &str = "match_text,full_line,context_before,context_after";
/// Enough fragments per field to cover every value of a context list.
const HIGHLIGHT_SNIPPETS: usize = 128;
const SORT: &str = "score desc,search_time desc";

/// A search over stored sessions.
#[derive(Debug, Clone, Default)]
pub struct StoredQuery {
    pub query: String,
    pub session_id: Option<String>,
    pub case_sensitive: Option<bool>,
    pub whole_word: Option<bool>,
    /// File extensions without the dot; empty means all.
    pub extensions: Vec<String>,
    pub rows: Option<usize>,
}

impl StoredQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Derive from a query spec. Flags only filter when they were turned on.
    pub fn from_spec(spec: &QuerySpec, session_id: Option<&str>) -> Self {
        Self {
            query: spec.query.clone(),
            session_id: session_id.map(str::to_string),
            case_sensitive: spec.options.case_sensitive.then_some(true),
            whole_word: spec.options.whole_word.then_some(true),
            extensions: Vec::new(),
            rows: spec.options.max_results,
        }
    }

    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }
}

/// Ranked, highlighted documents from one stored search.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StoredResults {
    pub native_query: String,
    pub num_found: u64,
    pub documents: Vec<RenderedDocument>,
}

/// Bridge between search results and the Solr core holding sessions.
#[derive(Debug, Clone)]
pub struct SessionStore {
    client: SolrClient,
    translator: QueryTranslator,
    rows: usize,
    highlight: HighlightConfig,
}

impl SessionStore {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_parts(&config.store, &config.query, config.highlight.clone())
    }

    pub fn with_parts(
        store: &StoreConfig,
        query: &QueryConfig,
        highlight: HighlightConfig,
    ) -> Result<Self> {
        Ok(Self {
            client: SolrClient::new(store)?,
            translator: QueryTranslator::from_config(query),
            rows: store.rows.max(1),
            highlight,
        })
    }

    pub fn core_url(&self) -> &str {
        self.client.core_url()
    }

    /// Persist `matches` as a new session and return its id.
    pub async fn store(
        &self,
        matches: &[Match],
        original_query: &str,
        options: &SearchOptions,
    ) -> Result<String> {
        let now = Utc::now();
        let session_id = new_session_id(now);
        if matches.is_empty() {
            tracing::info!("nothing to store for session {}", session_id);
            return Ok(session_id);
        }

        let mut counts: HashMap<&Path, u64> = HashMap::new();
        for m in matches {
            *counts.entry(m.path.as_path()).or_default() += 1;
        }
        let mut facts: HashMap<&Path, FileFacts> = HashMap::with_capacity(counts.len());
        for path in counts.keys() {
            facts.insert(path, file_facts(path).await);
        }

        let stamp = SessionStamp {
            session_id: &session_id,
            original_query,
            search_time: now,
            options,
        };
        let docs: Vec<StoredDocument> = matches
            .iter()
            .map(|m| {
                let path = m.path.as_path();
                StoredDocument::from_match(
                    m,
                    &stamp,
                    counts.get(path).copied().unwrap_or(1),
                    facts.get(path).copied().unwrap_or_default(),
                )
            })
            .collect();

        let ack = self.client.add_documents(&docs).await?;
        if ack.header.status != 0 {
            return Err(PipelineError::StoreResponseInvalid {
                operation: "update",
                message: format!("status {} in response header", ack.header.status),
            });
        }
        tracing::info!(
            "stored {} match(es) from {} file(s) as {}",
            docs.len(),
            counts.len(),
            session_id
        );
        Ok(session_id)
    }

    /// Search stored documents, ranked by store score then recency, with
    /// store highlighting merged into every text field.
    pub async fn query(&self, request: &StoredQuery) -> Result<StoredResults> {
        let native_query = self.translator.translate(&request.query);
        let params = self.select_params(request);
        tracing::debug!("stored search {} with {} param(s)", native_query, params.len());

        let response = self.client.select(&native_query, &params).await?;
        let mut docs = response.response.docs;
        rank_documents(&mut docs);

        let documents = apply_with_config(docs, &response.highlighting, &request.query, &self.highlight);
        Ok(StoredResults {
            native_query,
            num_found: response.response.num_found,
            documents,
        })
    }

    fn select_params(&self, request: &StoredQuery) -> Vec<(String, String)> {
        let rows = request.rows.unwrap_or(self.rows).max(1);
        let mut params: Vec<(String, String)> = vec![
            ("fl".into(), "*,score".into()),
            ("rows".into(), rows.to_string()),
            ("sort".into(), SORT.into()),
            ("hl".into(), "true".into()),
            ("hl.method".into(), "original".into()),
            ("hl.fl".into(), HIGHLIGHT_FIELDS.into()),
            ("hl.simple.pre".into(), crate::highlight::MARK_OPEN.into()),
            ("hl.simple.post".into(), crate::highlight::MARK_CLOSE.into()),
            ("hl.encoder".into(), "html".into()),
            ("hl.preserveMulti".into(), "true".into()),
            ("hl.fragsize".into(), self.highlight.fragment_size.to_string()),
            ("hl.snippets".into(), HIGHLIGHT_SNIPPETS.to_string()),
        ];

        if let Some(session) = &request.session_id {
            params.push(("fq".into(), format!("session_id:{}", quote_term(session))));
        }
        if let Some(flag) = request.case_sensitive {
            params.push(("fq".into(), format!("case_sensitive:{}", flag)));
        }
        if let Some(flag) = request.whole_word {
            params.push(("fq".into(), format!("whole_word:{}", flag)));
        }
        let extensions: Vec<String> = request
            .extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .map(|ext| quote_term(&ext))
            .collect();
        if !extensions.is_empty() {
            params.push((
                "fq".into(),
                format!("file_extension:({})", extensions.join(" OR ")),
            ));
        }
        params
    }

    /// Stored sessions, newest first.
    pub async fn list_sessions(&self, limit: usize) -> Result<Vec<SessionSummary>> {
        let facet = serde_json::json!({
            "sessions": {
                "type": "terms",
                "field": "session_id",
                "limit": limit.max(1),
                "sort": { "latest": "desc" },
                "facet": {
                    "latest": "max(search_time_ms)",
                    "query": { "type": "terms", "field": "original_query", "limit": 1 }
                }
            }
        });
        let params = vec![
            ("rows".to_string(), "0".to_string()),
            ("json.facet".to_string(), facet.to_string()),
        ];
        let response = self.client.select(crate::query::MATCH_ALL, &params).await?;

        let buckets = response
            .facets
            .and_then(|f| f.sessions)
            .map(|s| s.buckets)
            .unwrap_or_default();
        let mut sessions: Vec<SessionSummary> =
            buckets.into_iter().map(SessionSummary::from_bucket).collect();
        sessions.sort_by(|a, b| b.search_time.cmp(&a.search_time));
        Ok(sessions)
    }

    /// Delete every document older than `max_age_days`. Returns how many
    /// documents matched at the time of the call.
    pub async fn cleanup(&self, max_age_days: u32) -> Result<u64> {
        let query = format!("search_time:[* TO NOW-{}DAYS]", max_age_days);
        let removed = self.count(&query).await?;
        self.client.delete_by_query(&query).await?;
        tracing::info!("cleanup removed {} document(s) older than {} day(s)", removed, max_age_days);
        Ok(removed)
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<u64> {
        let query = format!("session_id:{}", quote_term(session_id));
        let removed = self.count(&query).await?;
        self.client.delete_by_query(&query).await?;
        tracing::info!("deleted session {} ({} document(s))", session_id, removed);
        Ok(removed)
    }

    async fn count(&self, query: &str) -> Result<u64> {
        let params = vec![("rows".to_string(), "0".to_string())];
        Ok(self.client.select(query, &params).await?.response.num_found)
    }

    /// True when the core answers its ping handler with `OK`.
    pub async fn ping(&self) -> Result<bool> {
        Ok(self.client.ping().await?.status.eq_ignore_ascii_case("ok"))
    }
}

/// `session_<unix millis>_<random>`, unique across concurrent writers.
pub fn new_session_id(now: DateTime<Utc>) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("session_{}_{}", now.timestamp_millis(), &random[..8])
}

/// Store score descending, then newest first.
pub fn rank_documents(docs: &mut [StoredDocument]) {
    docs.sort_by(|a, b| {
        let sa = a.score.unwrap_or(0.0);
        let sb = b.score.unwrap_or(0.0);
        sb.partial_cmp(&sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.search_time.cmp(&a.search_time))
    });
}

async fn file_facts(path: &Path) -> FileFacts {
    match tokio::fs::metadata(path).await {
        Ok(meta) => FileFacts {
            size: Some(meta.len()),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
        },
        Err(source) => {
            let err = PipelineError::FileMetadataUnavailable {
                path: PathBuf::from(path),
                source,
            };
            tracing::debug!("{}", err);
            FileFacts::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{ContextLine, SubMatch};
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CORE: &str = "/solr/search_results";

    fn store_for(server: &MockServer) -> SessionStore {
        let config = StoreConfig {
            url: format!("{}/solr", server.uri()),
            ..Default::default()
        };
        SessionStore::with_parts(&config, &QueryConfig::default(), HighlightConfig::default())
            .unwrap()
    }

    fn hit(path: &Path, line: u64) -> Match {
        Match {
            path: path.to_path_buf(),
            root: path.parent().unwrap().to_path_buf(),
            line,
            column: 4,
            text: format!("let needle_{line} = 1;"),
            context: vec![
                ContextLine { line, text: format!("let needle_{line} = 1;"), is_match: true },
                ContextLine { line: line + 1, text: "next".into(), is_match: false },
            ],
            score: 0.7,
            submatches: vec![SubMatch { start: 4, end: 10, text: "needle".into() }],
        }
    }

    fn ack() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"responseHeader": {"status": 0, "QTime": 1}}))
    }

    fn select_body(docs: Value, highlighting: Value) -> Value {
        let num_found = docs.as_array().map(|d| d.len()).unwrap_or(0);
        json!({
            "responseHeader": {"status": 0, "QTime": 1},
            "response": {"numFound": num_found, "start": 0, "docs": docs},
            "highlighting": highlighting
        })
    }

    #[tokio::test]
    async fn stored_session_reports_per_file_counts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{CORE}/update")))
            .and(query_param("commit", "true"))
            .respond_with(ack())
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lib.rs");
        std::fs::write(&file, "needle\nneedle\nneedle\n").unwrap();
        let matches = vec![hit(&file, 1), hit(&file, 2), hit(&file, 3)];

        let store = store_for(&server);
        let session = store
            .store(&matches, "needle", &SearchOptions::default())
            .await
            .unwrap();
        assert!(session.starts_with("session_"));

        let requests = server.received_requests().await.unwrap();
        let posted: Vec<Value> = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(posted.len(), 3);
        for doc in &posted {
            assert_eq!(doc["session_id"], session.as_str());
            assert_eq!(doc["match_count_in_file"], 3);
            assert_eq!(doc["file_size"], 21);
            assert_eq!(doc["match_text"], "needle");
        }

        Mock::given(method("GET"))
            .and(path(format!("{CORE}/select")))
            .and(query_param("fq", format!("session_id:\"{session}\"")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(select_body(Value::Array(posted), json!({}))),
            )
            .mount(&server)
            .await;

        let results = store
            .query(&StoredQuery::new("needle").in_session(&session))
            .await
            .unwrap();
        assert_eq!(results.documents.len(), 3);
        assert!(results
            .documents
            .iter()
            .all(|d| d.document.match_count_in_file == 3));
        assert!(results.documents[0].full_line_html.contains("<mark>needle</mark>"));
    }

    #[tokio::test]
    async fn unreadable_files_are_stored_without_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{CORE}/update")))
            .respond_with(ack())
            .mount(&server)
            .await;

        let missing = PathBuf::from("/definitely/not/here/a.rs");
        store_for(&server)
            .store(&[hit(&missing, 1)], "needle", &SearchOptions::default())
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let posted: Vec<Value> = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(posted[0].get("file_size").is_none());
        assert!(posted[0].get("file_modified").is_none());
    }

    #[tokio::test]
    async fn query_sends_filters_and_merges_store_highlighting() {
        let server = MockServer::start().await;
        let doc = |id: &str, score: f32, time: &str| {
            json!({
                "id": id, "session_id": "s1", "original_query": "needle",
                "search_time": time, "search_time_ms": 0,
                "workspace_root": "/w", "file_path": "/w/a.rs", "file_name": "a.rs",
                "file_extension": "rs", "line_number": 1, "column_number": 0,
                "match_text": "needle", "full_line": "a <needle>",
                "relevance_score": 0.5, "match_count_in_file": 1, "score": score
            })
        };
        Mock::given(method("GET"))
            .and(path(format!("{CORE}/select")))
            .and(query_param("sort", SORT))
            .and(query_param("hl.encoder", "html"))
            .and(query_param("fq", "file_extension:(\"rs\" OR \"toml\")"))
            .respond_with(ResponseTemplate::new(200).set_body_json(select_body(
                json!([
                    doc("old", 1.0, "2024-01-01T00:00:00Z"),
                    doc("new", 1.0, "2024-06-01T00:00:00Z"),
                    doc("best", 2.0, "2023-01-01T00:00:00Z"),
                ]),
                json!({"best": {"full_line": ["a &lt;<mark>needle</mark>&gt;"]}}),
            )))
            .mount(&server)
            .await;

        let request = StoredQuery::new("needle").with_extensions(vec![".RS".into(), "toml".into()]);
        let results = store_for(&server).query(&request).await.unwrap();

        let ids: Vec<&str> = results.documents.iter().map(|d| d.document.id.as_str()).collect();
        assert_eq!(ids, vec!["best", "new", "old"]);
        assert_eq!(results.documents[0].full_line_html, "a &lt;<mark>needle</mark>&gt;");
        assert_eq!(results.documents[1].full_line_html, "a &lt;<mark>needle</mark>&gt;");
        assert!(results.native_query.contains("match_text:(needle)"));
    }

    #[tokio::test]
    async fn rejected_query_is_reported_with_the_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{CORE}/select")))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"msg": "Cannot parse 'x'", "code": 400}
            })))
            .mount(&server)
            .await;

        let err = store_for(&server)
            .query(&StoredQuery::new("name:x"))
            .await
            .expect_err("rejected");
        match err {
            PipelineError::StoreQueryRejected { query, status, message } => {
                assert_eq!(query, "name:x");
                assert_eq!(status, 400);
                assert_eq!(message, "Cannot parse 'x'");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unreachable_store_is_typed() {
        let config = StoreConfig {
            url: "http://127.0.0.1:9/solr".to_string(),
            timeout_secs: 2,
            ..Default::default()
        };
        let store =
            SessionStore::with_parts(&config, &QueryConfig::default(), HighlightConfig::default())
                .unwrap();
        let err = store.query(&StoredQuery::new("x")).await.expect_err("down");
        assert!(err.is_store_unreachable(), "{err}");
    }

    #[tokio::test]
    async fn sessions_are_listed_newest_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{CORE}/select")))
            .and(query_param("rows", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "responseHeader": {"status": 0},
                "response": {"numFound": 5, "docs": []},
                "facets": {"count": 5, "sessions": {"buckets": [
                    {"val": "old", "count": 2, "latest": 1.0e12,
                     "query": {"buckets": [{"val": "alpha", "count": 2}]}},
                    {"val": "new", "count": 3, "latest": 1.7e12,
                     "query": {"buckets": [{"val": "beta", "count": 3}]}}
                ]}}
            })))
            .mount(&server)
            .await;

        let sessions = store_for(&server).list_sessions(50).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].session_id, "new");
        assert_eq!(sessions[0].original_query, "beta");
        assert_eq!(sessions[1].match_count, 2);
    }

    #[tokio::test]
    async fn cleanup_deletes_by_age() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{CORE}/select")))
            .and(query_param("q", "search_time:[* TO NOW-7DAYS]"))
            .respond_with(ResponseTemplate::new(200).set_body_json(select_body(json!([]), json!({}))))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{CORE}/update")))
            .respond_with(ack())
            .expect(1)
            .mount(&server)
            .await;

        let removed = store_for(&server).cleanup(7).await.unwrap();
        assert_eq!(removed, 0);

        let requests = server.received_requests().await.unwrap();
        let delete = requests.iter().find(|r| r.method.as_str() == "POST").unwrap();
        let body: Value = serde_json::from_slice(&delete.body).unwrap();
        assert_eq!(body["delete"]["query"], "search_time:[* TO NOW-7DAYS]");
    }

    #[tokio::test]
    async fn ping_reports_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{CORE}/admin/ping")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "OK"})))
            .mount(&server)
            .await;
        assert!(store_for(&server).ping().await.unwrap());
    }

    #[test]
    fn session_ids_are_unique_and_timestamped() {
        let now = Utc::now();
        let a = new_session_id(now);
        let b = new_session_id(now);
        assert_ne!(a, b);
        assert!(a.starts_with(&format!("session_{}_", now.timestamp_millis())));
    }
}
