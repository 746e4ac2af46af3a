//! HTTP bindings for the note server's Data API.
//!
//! Every public method runs as
//! `gateway.submit(|| retry.execute(|| breaker.call(|| http_request)))`, so
//! all traffic is admission-controlled, retried and circuit-broken the same
//! way. The token travels as the `token` query parameter.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::types::{
    FOLDER_FIELDS, Folder, NOTE_FIELDS, Note, NoteSummary, Page, RESOURCE_FIELDS,
    ResourceMetadata, SUMMARY_FIELDS, SearchOptions, Tag,
};
use crate::resolve::is_resource_id;
use crate::telemetry;
use crate::traffic::{CircuitBreaker, RequestGateway, RetryExecutor};
use crate::version;
use crate::{HuginnError, Result};

/// Default base URL of a local note server.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:41184";

/// Longest error body excerpt kept in an error message.
const MAX_ERROR_EXCERPT: usize = 200;

/// Connection settings for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server base URL. Default: `http://127.0.0.1:41184`.
    pub base_url: String,
    /// API token.
    pub token: String,
    /// Per-request transport timeout. Default: 30s.
    pub request_timeout: Duration,
    /// Consecutive transient failures that open an operation's circuit. Default: 5.
    pub circuit_failure_threshold: u32,
    /// Cooldown before an open circuit allows a trial request. Default: 60s.
    pub circuit_reset_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: String::new(),
            request_timeout: Duration::from_secs(30),
            circuit_failure_threshold: 5,
            circuit_reset_timeout: Duration::from_secs(60),
        }
    }
}

/// Operation classes; each has its own circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Search,
    Note,
    NoteTags,
    Folder,
    ResourceMetadata,
    ResourceFile,
    Ping,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::Search,
        Operation::Note,
        Operation::NoteTags,
        Operation::Folder,
        Operation::ResourceMetadata,
        Operation::ResourceFile,
        Operation::Ping,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Search => "search",
            Operation::Note => "note",
            Operation::NoteTags => "note_tags",
            Operation::Folder => "folder",
            Operation::ResourceMetadata => "resource_metadata",
            Operation::ResourceFile => "resource_file",
            Operation::Ping => "ping",
        }
    }
}

/// Client for the note server's Data API.
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: String,
    gateway: RequestGateway,
    retry: RetryExecutor,
    breakers: HashMap<Operation, CircuitBreaker>,
}

impl ApiClient {
    /// Create a client that routes through the given gateway and retry executor.
    pub fn new(config: ApiConfig, gateway: RequestGateway, retry: RetryExecutor) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(version::user_agent())
            .build()
            .map_err(|e| HuginnError::Configuration(format!("failed to build HTTP client: {e}")))?;

        let breakers = Operation::ALL
            .into_iter()
            .map(|op| {
                let breaker = CircuitBreaker::new(
                    op.as_str(),
                    config.circuit_failure_threshold,
                    config.circuit_reset_timeout,
                );
                (op, breaker)
            })
            .collect();

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token,
            gateway,
            retry,
            breakers,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn gateway(&self) -> &RequestGateway {
        &self.gateway
    }

    /// Circuit breaker for an operation class.
    pub fn breaker(&self, op: Operation) -> &CircuitBreaker {
        &self.breakers[&op]
    }

    /// Full-text search over notes, following pagination up to
    /// `options.max_results`.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<NoteSummary>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(HuginnError::InvalidInput("search query is empty".into()));
        }

        let mut results = Vec::new();
        let mut page = 1u32;
        loop {
            let mut params = vec![
                ("query", query.to_string()),
                ("type", "note".to_string()),
                ("fields", SUMMARY_FIELDS.to_string()),
                ("limit", options.limit.to_string()),
                ("page", page.to_string()),
            ];
            if let Some(order_by) = &options.order_by {
                params.push(("order_by", order_by.clone()));
            }
            if let Some(dir) = options.order_dir {
                params.push(("order_dir", dir.as_str().to_string()));
            }

            let batch: Page<NoteSummary> = self
                .call(Operation::Search, query, || self.get_json("/search", &params))
                .await?;
            results.extend(batch.items);

            if !batch.has_more || results.len() >= options.max_results {
                break;
            }
            page += 1;
        }

        results.truncate(options.max_results);
        debug!(query, count = results.len(), pages = page, "search complete");
        Ok(results)
    }

    /// Fetch a note with its body. `Ok(None)` if the note does not exist.
    pub async fn get_note(&self, id: &str) -> Result<Option<Note>> {
        require_id(id)?;
        let path = format!("/notes/{id}");
        let params = [("fields", NOTE_FIELDS.to_string())];
        optional(
            self.call(Operation::Note, id, || self.get_json(&path, &params))
                .await,
        )
    }

    /// Tags attached to a note. Empty if the note does not exist.
    pub async fn get_note_tags(&self, id: &str) -> Result<Vec<Tag>> {
        require_id(id)?;
        let path = format!("/notes/{id}/tags");
        let params = [("fields", "id,title".to_string())];
        let page: Option<Page<Tag>> = optional(
            self.call(Operation::NoteTags, id, || self.get_json(&path, &params))
                .await,
        )?;
        Ok(page.map(|p| p.items).unwrap_or_default())
    }

    /// Fetch a notebook. `Ok(None)` if it does not exist.
    pub async fn get_folder(&self, id: &str) -> Result<Option<Folder>> {
        require_id(id)?;
        let path = format!("/folders/{id}");
        let params = [("fields", FOLDER_FIELDS.to_string())];
        optional(
            self.call(Operation::Folder, id, || self.get_json(&path, &params))
                .await,
        )
    }

    /// Fetch resource metadata. `Ok(None)` if the resource does not exist.
    pub async fn get_resource_metadata(&self, id: &str) -> Result<Option<ResourceMetadata>> {
        require_resource_id(id)?;
        let path = format!("/resources/{id}");
        let params = [("fields", RESOURCE_FIELDS.to_string())];
        optional(
            self.call(Operation::ResourceMetadata, id, || {
                self.get_json(&path, &params)
            })
            .await,
        )
    }

    /// Download a resource's bytes. `Ok(None)` if the resource does not exist.
    pub async fn get_resource_bytes(&self, id: &str) -> Result<Option<Vec<u8>>> {
        require_resource_id(id)?;
        let path = format!("/resources/{id}/file");
        optional(
            self.call(Operation::ResourceFile, id, || self.get_bytes(&path))
                .await,
        )
    }

    /// Whether the server is reachable.
    ///
    /// A 401 still proves reachability, so it counts as success.
    pub async fn test_connection(&self) -> bool {
        self.call(Operation::Ping, "ping", || self.ping())
            .await
            .is_ok()
    }

    /// Route one logical call through gateway, retry and circuit breaker.
    async fn call<T, F, Fut>(&self, op: Operation, target: &str, request: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let label = op.as_str();
        let breaker = self.breaker(op);
        let result = self
            .gateway
            .submit(|| self.retry.execute(label, || breaker.call(&request)))
            .await;

        match &result {
            Ok(_) => {}
            Err(HuginnError::NotFound(_)) => debug!(operation = label, target, "not found"),
            Err(e) => warn!(
                operation = label,
                target,
                kind = e.kind(),
                error = %e,
                "request failed"
            ),
        }
        result
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        let op = operation_for_path(path);
        let response = self.send(op, path, params).await?;
        Ok(response.json::<T>().await?)
    }

    async fn get_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let response = self.send(Operation::ResourceFile, path, &[]).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn ping(&self) -> Result<()> {
        match self.send(Operation::Ping, "/ping", &[]).await {
            Ok(_) | Err(HuginnError::Unauthorized) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Send one GET and map non-success statuses to errors.
    async fn send(&self, op: Operation, path: &str, params: &[(&str, String)]) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        let start = Instant::now();

        let result = match self
            .http
            .get(&url)
            .query(&[("token", self.token.as_str())])
            .query(params)
            .send()
            .await
        {
            Ok(response) => check_status(response, path).await,
            Err(e) => Err(HuginnError::from(e)),
        };

        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS, "operation" => op.as_str())
            .record(start.elapsed().as_secs_f64());
        let status = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "operation" => op.as_str(),
            "status" => status,
        )
        .increment(1);

        result
    }
}

/// Map a response status to the error taxonomy.
async fn check_status(response: Response, path: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED => Err(HuginnError::Unauthorized),
        StatusCode::FORBIDDEN => Err(HuginnError::Forbidden),
        StatusCode::NOT_FOUND => Err(HuginnError::NotFound(path.to_string())),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            Err(HuginnError::RateLimited { retry_after })
        }
        code => {
            let message = error_excerpt(response).await;
            if code.is_server_error() {
                Err(HuginnError::Server {
                    status: code.as_u16(),
                    message,
                })
            } else {
                Err(HuginnError::Api {
                    status: code.as_u16(),
                    message,
                })
            }
        }
    }
}

async fn error_excerpt(response: Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(body) if !body.trim().is_empty() => body.trim().chars().take(MAX_ERROR_EXCERPT).collect(),
        _ => status.to_string(),
    }
}

fn operation_for_path(path: &str) -> Operation {
    if path.starts_with("/search") {
        Operation::Search
    } else if path.starts_with("/folders") {
        Operation::Folder
    } else if path.starts_with("/resources") {
        Operation::ResourceMetadata
    } else if path.ends_with("/tags") {
        Operation::NoteTags
    } else {
        Operation::Note
    }
}

/// Turn `NotFound` into `Ok(None)`.
fn optional<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(HuginnError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn require_id(id: &str) -> Result<()> {
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(HuginnError::InvalidInput(format!("invalid item id: {id:?}")));
    }
    Ok(())
}

fn require_resource_id(id: &str) -> Result<()> {
    if !is_resource_id(id) {
        return Err(HuginnError::InvalidInput(format!("invalid resource id: {id:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_maps_not_found_to_none() {
        let result: Result<u32> = Err(HuginnError::NotFound("/notes/x".into()));
        assert_eq!(optional(result).unwrap(), None);
        assert_eq!(optional(Ok(3)).unwrap(), Some(3));
        assert!(optional::<u32>(Err(HuginnError::Timeout)).is_err());
    }

    #[test]
    fn operation_for_path_picks_metric_label() {
        assert_eq!(operation_for_path("/search"), Operation::Search);
        assert_eq!(operation_for_path("/notes/abc"), Operation::Note);
        assert_eq!(operation_for_path("/notes/abc/tags"), Operation::NoteTags);
        assert_eq!(operation_for_path("/folders/abc"), Operation::Folder);
        assert_eq!(
            operation_for_path("/resources/abc"),
            Operation::ResourceMetadata
        );
    }

    #[test]
    fn require_id_rejects_path_characters() {
        assert!(require_id("abc123").is_ok());
        assert!(require_id("").is_err());
        assert!(require_id("../etc").is_err());
        assert!(require_resource_id("ABC").is_err());
    }
}
