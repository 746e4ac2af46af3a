//! Builder for configuring client instances

use std::sync::Arc;
use std::time::Duration;

use super::HuginnClient;
use crate::api::{ApiClient, ApiConfig};
use crate::cache::{Cache, CacheConfig};
use crate::resolve::{ResolveConfig, ResourcePipeline, StorageSink};
use crate::traffic::{
    AlwaysOnline, ConnectivityProbe, GatewayConfig, RequestGateway, RetryConfig, RetryExecutor,
};
use crate::{HuginnError, Result};

/// Main entry point for creating client instances.
pub struct Huginn;

impl Huginn {
    /// Create a new builder for configuring the client.
    pub fn builder() -> HuginnBuilder {
        HuginnBuilder::new()
    }
}

/// Builder for configuring client instances.
///
/// Each built client owns its own gateway, caches, retry executor and
/// circuit breakers; nothing is shared between clients.
pub struct HuginnBuilder {
    api: ApiConfig,
    gateway: GatewayConfig,
    retry: RetryConfig,
    result_cache: CacheConfig,
    resource_cache: CacheConfig,
    resolve: ResolveConfig,
    probe: Option<Arc<dyn ConnectivityProbe>>,
    sink: Option<Arc<dyn StorageSink>>,
}

impl HuginnBuilder {
    pub fn new() -> Self {
        Self {
            api: ApiConfig::default(),
            gateway: GatewayConfig::default(),
            retry: RetryConfig::default(),
            result_cache: CacheConfig::default(),
            resource_cache: CacheConfig::resources(),
            resolve: ResolveConfig::default(),
            probe: None,
            sink: None,
        }
    }

    /// Server base URL (default: `http://127.0.0.1:41184`).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.api.base_url = url.into();
        self
    }

    /// API token (required).
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.api.token = token.into();
        self
    }

    /// Per-request transport timeout (default: 30s).
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.api.request_timeout = timeout;
        self
    }

    /// Maximum requests executing at once (default: 5).
    pub fn max_concurrent_requests(mut self, n: usize) -> Self {
        self.gateway.max_concurrent = n;
        self
    }

    /// Maximum admissions per trailing minute (default: 60).
    pub fn max_requests_per_minute(mut self, n: usize) -> Self {
        self.gateway.max_per_minute = n;
        self
    }

    /// Replace the whole gateway configuration.
    pub fn gateway(mut self, config: GatewayConfig) -> Self {
        self.gateway = config;
        self
    }

    /// Retry policy for transient failures.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    /// Search-result and note cache (default: 100 entries, 5 minutes).
    pub fn result_cache(mut self, config: CacheConfig) -> Self {
        self.result_cache = config;
        self
    }

    /// Resource cache (default: 200 entries, 30 minutes, 50 MiB).
    pub fn resource_cache(mut self, config: CacheConfig) -> Self {
        self.resource_cache = config;
        self
    }

    /// Distinct resources resolved concurrently (default: 4).
    pub fn fan_out(mut self, n: usize) -> Self {
        self.resolve.fan_out = n;
        self
    }

    /// Folder for externally stored resources (default: `_resources`).
    pub fn resource_dir(mut self, dir: impl Into<String>) -> Self {
        self.resolve.resource_dir = dir.into();
        self
    }

    /// Circuit breaker threshold and cooldown (default: 5 failures, 60s).
    pub fn circuit_breaker(mut self, failure_threshold: u32, reset_timeout: Duration) -> Self {
        self.api.circuit_failure_threshold = failure_threshold;
        self.api.circuit_reset_timeout = reset_timeout;
        self
    }

    /// Connectivity probe consulted before every attempt (default: always online).
    pub fn probe(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Storage sink for external resolution.
    pub fn storage_sink(mut self, sink: Arc<dyn StorageSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<HuginnClient> {
        if self.api.token.trim().is_empty() {
            return Err(HuginnError::Configuration("API token is required".to_string()));
        }
        let base_url = self.api.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(HuginnError::Configuration(format!(
                "base URL must be http(s): {base_url:?}"
            )));
        }

        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(AlwaysOnline) as Arc<dyn ConnectivityProbe>);
        let gateway = RequestGateway::new(self.gateway);
        let retry = RetryExecutor::new(self.retry, probe);
        let api = Arc::new(ApiClient::new(self.api, gateway, retry)?);

        let results = Arc::new(Cache::new("results", self.result_cache));
        let resources = Arc::new(Cache::new("resources", self.resource_cache));
        let pipeline = ResourcePipeline::new(
            Arc::clone(&api),
            Arc::clone(&resources),
            self.sink,
            self.resolve,
        );

        Ok(HuginnClient::new(api, results, pipeline))
    }
}

impl Default for HuginnBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HuginnBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HuginnBuilder")
            .field("base_url", &self.api.base_url)
            .field("gateway", &self.gateway)
            .field("retry", &self.retry)
            .field("resolve", &self.resolve)
            .finish_non_exhaustive()
    }
}
