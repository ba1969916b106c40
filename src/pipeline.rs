// SPDX-License-Identifier: MIT OR Apache-2.0

//! One entry point over the search orchestrator and the session store.

use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::errors::Result;
use crate::highlight;
use crate::search::{Match, QuerySpec, SearchOptions, SearchOrchestrator, SearchOutcome};
use crate::store::models::SessionSummary;
use crate::store::{SessionStore, StoredQuery, StoredResults};

/// Sessions returned by `list_sessions` when the caller sets no limit.
pub const DEFAULT_SESSION_LIMIT: usize = 100;

/// Where a fallback search got its answer from.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum FallbackResults {
    Stored(StoredResults),
    Fresh(SearchOutcome),
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Config,
    orchestrator: SearchOrchestrator,
    store: SessionStore,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let orchestrator = SearchOrchestrator::new(config.search.clone());
        let store = SessionStore::new(&config)?;
        Ok(Self {
            config,
            orchestrator,
            store,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub async fn fresh_search(
        &self,
        roots: &[PathBuf],
        spec: &QuerySpec,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome> {
        self.orchestrator.search(roots, spec, cancel).await
    }

    pub async fn store_and_get_session_id(
        &self,
        matches: &[Match],
        query: &str,
        options: &SearchOptions,
    ) -> Result<String> {
        self.store.store(matches, query, options).await
    }

    pub async fn search_stored(
        &self,
        spec: &QuerySpec,
        session_id: Option<&str>,
    ) -> Result<StoredResults> {
        self.store
            .query(&StoredQuery::from_spec(spec, session_id))
            .await
    }

    pub async fn search_stored_with(&self, request: &StoredQuery) -> Result<StoredResults> {
        self.store.query(request).await
    }

    pub fn render_highlighted(&self, text: &str, query: &str) -> String {
        highlight::highlight(text, query)
    }

    pub async fn list_sessions(&self, limit: Option<usize>) -> Result<Vec<SessionSummary>> {
        self.store
            .list_sessions(limit.unwrap_or(DEFAULT_SESSION_LIMIT))
            .await
    }

    pub async fn cleanup_older_than(&self, days: u32) -> Result<u64> {
        self.store.cleanup(days).await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<u64> {
        self.store.delete_session(session_id).await
    }

    pub async fn ping(&self) -> Result<bool> {
        self.store.ping().await
    }

    pub async fn preview_globs(
        &self,
        roots: &[PathBuf],
        include: &[String],
        exclude: &[String],
    ) -> Result<Vec<PathBuf>> {
        self.orchestrator.preview_globs(roots, include, exclude).await
    }

    /// Search stored results; when the store cannot be reached, run the same
    /// query as a fresh search over `roots`. Any other store error is returned.
    pub async fn search_with_fallback(
        &self,
        roots: &[PathBuf],
        request: &StoredQuery,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<FallbackResults> {
        match self.store.query(request).await {
            Ok(results) => Ok(FallbackResults::Stored(results)),
            Err(err) if err.is_store_unreachable() => {
                tracing::warn!("{}; falling back to a fresh search", err);
                let spec = QuerySpec::new(request.query.clone()).with_options(options.clone());
                let outcome = self.orchestrator.search(roots, &spec, cancel).await?;
                Ok(FallbackResults::Fresh(outcome))
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::errors::PipelineError;
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pipeline_with_store(url: String) -> Pipeline {
        let config = Config {
            store: StoreConfig {
                url,
                timeout_secs: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        Pipeline::new(config).unwrap()
    }

    #[test]
    fn render_highlighted_is_html_safe() {
        let pipeline = pipeline_with_store("http://127.0.0.1:9/solr".into());
        assert_eq!(
            pipeline.render_highlighted("<i>needle</i>", "needle"),
            "&lt;i&gt;<mark>needle</mark>&lt;/i&gt;"
        );
    }

    #[tokio::test]
    async fn unreachable_store_falls_back_to_fresh_search() {
        if which::which("rg").is_err() {
            eprintln!("skipping: rg not installed");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "alpha\nneedle here\n").unwrap();

        let pipeline = pipeline_with_store("http://127.0.0.1:9/solr".into());
        let result = pipeline
            .search_with_fallback(
                &[dir.path().to_path_buf()],
                &StoredQuery::new("needle"),
                &SearchOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        match result {
            FallbackResults::Fresh(outcome) => {
                assert_eq!(outcome.matches.len(), 1);
                assert_eq!(outcome.matches[0].line, 2);
            }
            other => panic!("expected fresh results, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejected_queries_do_not_fall_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": {"msg": "bad"}})),
            )
            .mount(&server)
            .await;

        let pipeline = pipeline_with_store(format!("{}/solr", server.uri()));
        let err = pipeline
            .search_with_fallback(
                &[PathBuf::from(".")],
                &StoredQuery::new("a:"),
                &SearchOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .expect_err("rejected");
        assert!(matches!(err, PipelineError::StoreQueryRejected { .. }));
    }
}
