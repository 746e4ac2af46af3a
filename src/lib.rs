//! Huginn - rate-limited, cached client for Joplin-style note servers
//!
//! This crate wraps a note server's HTTP Data API with client-side traffic
//! control (FIFO admission with concurrency and per-minute caps, retry with
//! backoff, per-operation circuit breakers), two LRU+TTL caches, and a
//! pipeline that turns the resource references embedded in note bodies into
//! inline data URIs or locally stored files.
//!
//! # Example
//!
//! ```rust,no_run
//! use huginn::{Huginn, ResolveMode, SearchOptions};
//!
//! #[tokio::main]
//! async fn main() -> huginn::Result<()> {
//!     let client = Huginn::builder()
//!         .token("your-api-token")
//!         .max_concurrent_requests(3)
//!         .build()?;
//!
//!     let hits = client.search("meeting notes", &SearchOptions::default()).await?;
//!     if let Some(summary) = hits.first()
//!         && let Some(note) = client.get_note(&summary.id).await?
//!     {
//!         let resolved = client.resolve_body(&note.body, ResolveMode::Inline).await?;
//!         println!("{}", resolved.summary());
//!         println!("{}", resolved.body);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Progress
//!
//! ```rust,no_run
//! use futures_util::StreamExt;
//! use huginn::{HuginnClient, ResolveMode, progress_channel};
//!
//! async fn render(client: &HuginnClient, body: &str) -> huginn::Result<String> {
//!     let (tx, mut events) = progress_channel(16);
//!     let printer = tokio::spawn(async move {
//!         while let Some(event) = events.next().await {
//!             println!("{event:?}");
//!         }
//!     });
//!     let resolved = client
//!         .resolve_body_with_progress(body, ResolveMode::Inline, tx)
//!         .await?;
//!     let _ = printer.await;
//!     Ok(resolved.body)
//! }
//! ```

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod resolve;
pub mod telemetry;
pub mod traffic;
pub mod version;

// Re-export main types at crate root
pub use error::{HuginnError, Result};

pub use api::{
    ApiClient, ApiConfig, DEFAULT_BASE_URL, Folder, Note, NoteSummary, Operation, OrderDir,
    ResourceMetadata, SearchOptions, Tag,
};
pub use cache::{Cache, CacheConfig, CacheKind, CacheStats, CachedResult};
pub use client::{Huginn, HuginnBuilder, HuginnClient};
pub use config::{HuginnConfig, Secrets};
pub use resolve::{
    FsStorageSink, ResolutionResult, ResolveConfig, ResolveMode, ResolveProgress, ResolvedBody,
    ResolvedResource, ResourcePipeline, StorageSink, progress_channel,
};
pub use traffic::{
    AlwaysOnline, CircuitBreaker, CircuitState, ConnectivityProbe, GatewayConfig, GatewayStatus,
    ManualProbe, RequestGateway, RetryConfig, RetryExecutor,
};
