// SPDX-License-Identifier: MIT OR Apache-2.0

//! Thin HTTP client for one Solr core.

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;

use super::models::{PingResponse, SelectResponse, SolrErrorBody, StoredDocument, UpdateResponse};
use crate::config::StoreConfig;
use crate::errors::{PipelineError, Result};

#[derive(Debug, Clone)]
pub struct SolrClient {
    http: Client,
    core_url: String,
}

impl SolrClient {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| PipelineError::InvalidConfig(format!("HTTP client: {}", e)))?;
        Ok(Self {
            http,
            core_url: config.core_url(),
        })
    }

    pub fn core_url(&self) -> &str {
        &self.core_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.core_url, path)
    }

    fn unreachable(&self, source: reqwest::Error) -> PipelineError {
        PipelineError::StoreUnreachable {
            url: self.core_url.clone(),
            source,
        }
    }

    fn transport_error(&self, operation: &'static str, err: reqwest::Error) -> PipelineError {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            self.unreachable(err)
        } else {
            PipelineError::StoreRequestFailed {
                operation,
                status: err.status().map(|s| s.as_u16()).unwrap_or(0),
                message: err.to_string(),
            }
        }
    }

    /// Add documents and commit so they are searchable immediately.
    pub async fn add_documents(&self, docs: &[StoredDocument]) -> Result<UpdateResponse> {
        tracing::debug!("posting {} document(s) to {}", docs.len(), self.core_url);
        let response = self
            .http
            .post(self.endpoint("update"))
            .query(&[("commit", "true"), ("wt", "json")])
            .json(docs)
            .send()
            .await
            .map_err(|e| self.transport_error("update", e))?;
        self.read_body("update", response).await
    }

    pub async fn delete_by_query(&self, query: &str) -> Result<UpdateResponse> {
        tracing::debug!("deleting by query {}", query);
        let response = self
            .http
            .post(self.endpoint("update"))
            .query(&[("commit", "true"), ("wt", "json")])
            .json(&json!({ "delete": { "query": query } }))
            .send()
            .await
            .map_err(|e| self.transport_error("delete", e))?;
        self.read_body("delete", response).await
    }

    /// Run `/select`. A 400 means Solr could not parse `query`.
    pub async fn select(&self, query: &str, params: &[(String, String)]) -> Result<SelectResponse> {
        let mut all = vec![("q".to_string(), query.to_string()), ("wt".to_string(), "json".to_string())];
        all.extend(params.iter().cloned());

        let response = self
            .http
            .get(self.endpoint("select"))
            .query(&all)
            .send()
            .await
            .map_err(|e| self.transport_error("select", e))?;

        if response.status() == StatusCode::BAD_REQUEST {
            let message = error_message(response).await;
            return Err(PipelineError::StoreQueryRejected {
                query: query.to_string(),
                status: StatusCode::BAD_REQUEST.as_u16(),
                message,
            });
        }
        self.read_body("select", response).await
    }

    pub async fn ping(&self) -> Result<PingResponse> {
        let response = self
            .http
            .get(self.endpoint("admin/ping"))
            .query(&[("wt", "json")])
            .send()
            .await
            .map_err(|e| self.transport_error("ping", e))?;
        self.read_body("ping", response).await
    }

    async fn read_body<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        response: Response,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::StoreRequestFailed {
                operation,
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(operation, e))?;
        serde_json::from_slice(&bytes).map_err(|e| PipelineError::StoreResponseInvalid {
            operation,
            message: e.to_string(),
        })
    }
}

/// Solr's own error message when the body carries one, else the raw body.
async fn error_message(response: Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<SolrErrorBody>(&text) {
        Ok(body) if !body.error.msg.is_empty() => body.error.msg,
        _ if text.trim().is_empty() => status.to_string(),
        _ => text.trim().chars().take(500).collect(),
    }
}
