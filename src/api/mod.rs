//! Bindings for the note server's HTTP Data API.
//!
//! Every call goes through the shared [`RequestGateway`](crate::RequestGateway),
//! a [`RetryExecutor`](crate::RetryExecutor) and a per-operation
//! [`CircuitBreaker`](crate::CircuitBreaker).

mod client;
mod types;

pub use client::{ApiClient, ApiConfig, DEFAULT_BASE_URL, Operation};
pub use types::{Folder, Note, NoteSummary, OrderDir, ResourceMetadata, SearchOptions, Tag};
