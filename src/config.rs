//! Configuration loading for huginn.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. explicit path (`--config <path>`)
//! 2. `~/.huginn/config.toml` (user)
//! 3. `/etc/huginn/config.toml` (system)
//!
//! With no explicit path and no file present, defaults are used.
//!
//! The API token is looked up in order:
//! 1. `[server] token` in the config file
//! 2. `~/.huginn/secrets.toml`, then `/etc/huginn/secrets.toml` (must be 0600)
//! 3. `HUGINN_TOKEN`, then `JOPLIN_TOKEN`

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::api::DEFAULT_BASE_URL;
use crate::cache::CacheConfig;
use crate::client::HuginnBuilder;
use crate::resolve::{DEFAULT_FAN_OUT, DEFAULT_RESOURCE_DIR};
use crate::traffic::{GatewayConfig, RetryConfig};
use crate::{Huginn, HuginnError, Result};

/// Environment variables consulted for the API token, in order.
pub const TOKEN_ENV_VARS: &[&str] = &["HUGINN_TOKEN", "JOPLIN_TOKEN"];

/// Client configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HuginnConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub circuit: CircuitSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub resolve: ResolveSection,
}

/// Note server connection.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Base URL (default: http://127.0.0.1:41184).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            request_timeout_secs: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Admission limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum concurrent requests (default: 5).
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    /// Maximum requests per minute (default: 60).
    #[serde(default = "default_per_minute")]
    pub max_requests_per_minute: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent(),
            max_requests_per_minute: default_per_minute(),
        }
    }
}

fn default_max_concurrent() -> usize {
    5
}

fn default_per_minute() -> usize {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_multiplier(),
            jitter: true,
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircuitSection {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_reset_secs")]
    pub reset_timeout_secs: u64,
}

impl Default for CircuitSection {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_secs(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_secs() -> u64 {
    60
}

/// `[cache.results]` and `[cache.resources]`; unset fields keep the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheSection {
    #[serde(default)]
    pub results: CacheLimits,
    #[serde(default)]
    pub resources: CacheLimits,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheLimits {
    pub max_entries: Option<usize>,
    pub max_bytes: Option<u64>,
    pub ttl_secs: Option<u64>,
}

impl CacheLimits {
    fn apply(&self, mut config: CacheConfig) -> CacheConfig {
        if let Some(n) = self.max_entries {
            config = config.max_entries(n);
        }
        if let Some(bytes) = self.max_bytes {
            config = config.max_bytes(bytes);
        }
        if let Some(secs) = self.ttl_secs {
            config = config.ttl(Duration::from_secs(secs));
        }
        config
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveSection {
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,
    #[serde(default = "default_resource_dir")]
    pub resource_dir: String,
}

impl Default for ResolveSection {
    fn default() -> Self {
        Self {
            fan_out: default_fan_out(),
            resource_dir: default_resource_dir(),
        }
    }
}

fn default_fan_out() -> usize {
    DEFAULT_FAN_OUT
}

fn default_resource_dir() -> String {
    DEFAULT_RESOURCE_DIR.to_string()
}

/// Secrets file (`secrets.toml`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub token: Option<String>,
}

impl HuginnConfig {
    /// Load configuration from the standard locations.
    ///
    /// An explicit path must exist. Without one, a missing file means defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            HuginnError::Configuration(msg) => {
                HuginnError::Configuration(format!("{msg} (in {path:?})"))
            }
            other => other,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| HuginnError::Configuration(format!("Failed to parse config: {e}")))
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(HuginnError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".huginn").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/huginn/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// Token from the config file, falling back to `secrets` and then the environment.
    pub fn token(&self, secrets: &Secrets) -> Option<String> {
        self.server
            .token
            .clone()
            .or_else(|| secrets.token.clone())
            .or_else(|| {
                TOKEN_ENV_VARS
                    .iter()
                    .find_map(|var| std::env::var(var).ok())
            })
            .filter(|t| !t.trim().is_empty())
    }

    /// A builder carrying every setting from this file.
    ///
    /// The token is set when [`token`](Self::token) finds one.
    pub fn to_builder(&self, secrets: &Secrets) -> HuginnBuilder {
        let retry = RetryConfig::new()
            .max_retries(self.retry.max_retries)
            .base_delay(Duration::from_millis(self.retry.base_delay_ms))
            .max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .backoff_multiplier(self.retry.backoff_multiplier)
            .jitter(self.retry.jitter);

        let mut builder = Huginn::builder()
            .base_url(&self.server.base_url)
            .request_timeout(Duration::from_secs(self.server.request_timeout_secs))
            .gateway(
                GatewayConfig::new()
                    .max_concurrent(self.limits.max_concurrent_requests)
                    .max_per_minute(self.limits.max_requests_per_minute),
            )
            .retry(retry)
            .circuit_breaker(
                self.circuit.failure_threshold,
                Duration::from_secs(self.circuit.reset_timeout_secs),
            )
            .result_cache(self.cache.results.apply(CacheConfig::default()))
            .resource_cache(self.cache.resources.apply(CacheConfig::resources()))
            .fan_out(self.resolve.fan_out)
            .resource_dir(&self.resolve.resource_dir);

        if let Some(token) = self.token(secrets) {
            builder = builder.token(token);
        }
        builder
    }
}

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Returns empty secrets if no file exists (the token may come from env vars).
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".huginn").join("secrets.toml");
            if user_secrets.exists() {
                Self::check_permissions(&user_secrets)?;
                return Self::load_from_file(&user_secrets);
            }
        }

        let system_secrets = PathBuf::from("/etc/huginn/secrets.toml");
        if system_secrets.exists() {
            Self::check_permissions(&system_secrets)?;
            return Self::load_from_file(&system_secrets);
        }

        Ok(Secrets::default())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            HuginnError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// The secrets file must not be readable by group or others.
    #[cfg(unix)]
    pub fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(HuginnError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    pub fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }
}
