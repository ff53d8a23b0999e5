use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::*;
use url::Url;

use crate::metrics::Metrics;
use crate::{Error, Result};

/// How the storage answered a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairOutcome {
    Accepted,
    /// The storage was reachable but refused the request
    Rejected { status: u16, body: String },
}

/// The HTTP CRUD API of the key-value storage.
///
/// `put` and `delete` fail only when the storage cannot be reached; a refusal is a [`PairOutcome::Rejected`].
/// `exists` never fails, an unreachable storage simply has no keys.
#[async_trait]
pub trait PairStore: Send + Sync {
    async fn put(&self, key: &str, value: &str) -> Result<PairOutcome>;

    async fn delete(&self, key: &str) -> Result<PairOutcome>;

    async fn exists(&self, key: &str) -> bool;
}

/// Whether `key` can travel as a single `/pairs/{key}` path segment.
///
/// Url parsing folds `.` and `..` (and their percent-encoded forms) into the parent path, and an empty
/// segment names the collection itself, so those keys would hit `/pairs` instead.
pub fn is_addressable(key: &str) -> bool {
    !matches!(key, "" | "." | "..")
}

#[derive(Serialize)]
struct Pair<'a> {
    key: &'a str,
    value: &'a str,
}

/// [`PairStore`] talking to `http://<address>/pairs`
#[derive(Clone)]
pub struct HttpPairStore {
    http_client: reqwest::Client,
    pairs_url: Url,
    metrics: Option<Metrics>,
}

impl HttpPairStore {
    pub fn new(http_client: reqwest::Client, address: &str) -> Result<Self> {
        Ok(Self {
            http_client,
            pairs_url: Url::parse(&format!("http://{address}/pairs"))?,
            metrics: None,
        })
    }

    pub fn with_metrics(self, metrics: Metrics) -> Self {
        Self {
            metrics: Some(metrics),
            ..self
        }
    }

    /// The per-key endpoint, or `None` for keys it cannot name
    fn pair_url(&self, key: &str) -> Option<Url> {
        if !is_addressable(key) {
            return None;
        }
        let mut url = self.pairs_url.clone();
        url.path_segments_mut().ok()?.push(key);
        Some(url)
    }

    fn unaddressable(&self, method: &str, key: &str) -> PairOutcome {
        self.record(method, "unaddressable");
        debug!(method, key, "Key cannot be addressed on the storage");
        PairOutcome::Rejected {
            status: StatusCode::BAD_REQUEST.as_u16(),
            body: format!("key {key:?} cannot be addressed by the storage"),
        }
    }

    fn record(&self, method: &str, result: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.storage_request(method, result);
        }
    }

    async fn outcome(
        &self,
        method: &str,
        key: &str,
        response: reqwest::Result<reqwest::Response>,
        accepted: &[StatusCode],
    ) -> Result<PairOutcome> {
        let response = response.map_err(|err| {
            self.record(method, "unreachable");
            Error::StorageUnreachable {
                key: key.into(),
                message: err.to_string(),
            }
        })?;

        let status = response.status();
        if accepted.contains(&status) {
            self.record(method, "accepted");
            return Ok(PairOutcome::Accepted);
        }

        self.record(method, "rejected");
        let body = response
            .text()
            .await
            .unwrap_or_else(|err| format!("failed to read response body: {err}"));
        debug!(
            method,
            key,
            status = status.as_u16(),
            "Storage rejected request"
        );
        Ok(PairOutcome::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl PairStore for HttpPairStore {
    async fn put(&self, key: &str, value: &str) -> Result<PairOutcome> {
        // a key that cannot be deleted or probed later is never written
        if !is_addressable(key) {
            return Ok(self.unaddressable("PUT", key));
        }
        let body = serde_json::to_vec(&Pair { key, value })?;
        let response = self
            .http_client
            .put(self.pairs_url.clone())
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .body(body)
            .send()
            .await;
        self.outcome("PUT", key, response, &[StatusCode::OK, StatusCode::CREATED])
            .await
    }

    async fn delete(&self, key: &str) -> Result<PairOutcome> {
        let Some(url) = self.pair_url(key) else {
            return Ok(self.unaddressable("DELETE", key));
        };
        let response = self.http_client.delete(url).send().await;
        self.outcome("DELETE", key, response, &[StatusCode::OK])
            .await
    }

    async fn exists(&self, key: &str) -> bool {
        let Some(url) = self.pair_url(key) else {
            self.record("GET", "unaddressable");
            return false;
        };
        let exists = match self.http_client.get(url).send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(err) => {
                debug!(key, "Existence check failed: {err}");
                false
            }
        };
        self.record("GET", if exists { "present" } else { "absent" });
        exists
    }
}
