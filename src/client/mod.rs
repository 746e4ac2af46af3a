//! The public client.
//!
//! [`HuginnClient`] ties the pieces together: result cache in front of the
//! API for searches and notes, the resolution pipeline (with its resource
//! cache) for note bodies, and the gateway for queue inspection.

mod builder;

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

pub use builder::{Huginn, HuginnBuilder};

use crate::api::{ApiClient, Folder, Note, NoteSummary, SearchOptions, Tag};
use crate::cache::{CacheKind, CacheStats, CachedResult, ResultCache, note_key, search_key};
use crate::resolve::{ResolveMode, ResolveProgress, ResolvedBody, ResourcePipeline};
use crate::traffic::GatewayStatus;
use crate::Result;

/// Client for a note server. Build with [`Huginn::builder()`].
pub struct HuginnClient {
    api: Arc<ApiClient>,
    results: Arc<ResultCache>,
    pipeline: ResourcePipeline,
}

impl HuginnClient {
    pub(crate) fn new(api: Arc<ApiClient>, results: Arc<ResultCache>, pipeline: ResourcePipeline) -> Self {
        Self {
            api,
            results,
            pipeline,
        }
    }

    /// The underlying API client (uncached).
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Search notes. Results are cached per query and options.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<NoteSummary>> {
        let key = search_key(query, options);
        if let Some(CachedResult::Search(hits)) = self.results.get(&key) {
            debug!(query, hits = hits.len(), "search served from cache");
            return Ok(hits);
        }
        let hits = self.api.search(query, options).await?;
        self.results.set(key, CachedResult::Search(hits.clone()), 0);
        Ok(hits)
    }

    /// Fetch a note. `Ok(None)` if it does not exist; absent notes are not cached.
    pub async fn get_note(&self, id: &str) -> Result<Option<Note>> {
        let key = note_key(id);
        if let Some(CachedResult::Note(note)) = self.results.get(&key) {
            debug!(note_id = id, "note served from cache");
            return Ok(Some(note));
        }
        let note = self.api.get_note(id).await?;
        if let Some(note) = &note {
            self.results.set(key, CachedResult::Note(note.clone()), 0);
        }
        Ok(note)
    }

    /// Tags attached to a note.
    pub async fn get_note_tags(&self, id: &str) -> Result<Vec<Tag>> {
        self.api.get_note_tags(id).await
    }

    /// A notebook.
    pub async fn get_folder(&self, id: &str) -> Result<Option<Folder>> {
        self.api.get_folder(id).await
    }

    /// Resolve the resource references in a note body.
    pub async fn resolve_body(&self, body: &str, mode: ResolveMode) -> Result<ResolvedBody> {
        self.pipeline.resolve_body(body, mode).await
    }

    /// Resolve with progress events (see [`progress_channel`](crate::progress_channel)).
    pub async fn resolve_body_with_progress(
        &self,
        body: &str,
        mode: ResolveMode,
        progress: mpsc::Sender<ResolveProgress>,
    ) -> Result<ResolvedBody> {
        self.pipeline
            .resolve_body_with_progress(body, mode, progress)
            .await
    }

    pub fn queue_status(&self) -> GatewayStatus {
        self.api.gateway().status()
    }

    /// Cancel every queued request. Returns how many were cancelled.
    pub fn clear_queue(&self) -> usize {
        self.api.gateway().clear_queue()
    }

    pub fn cache_stats(&self, kind: CacheKind) -> CacheStats {
        match kind {
            CacheKind::Results => self.results.stats(),
            CacheKind::Resources => self.pipeline.cache().stats(),
        }
    }

    /// Drop every entry of a cache and reset its counters.
    pub fn clear_cache(&self, kind: CacheKind) {
        match kind {
            CacheKind::Results => self.results.clear(),
            CacheKind::Resources => self.pipeline.cache().clear(),
        }
        debug!(cache = kind.as_str(), "cache cleared");
    }

    /// Whether the server answers at all (a 401 counts as reachable).
    pub async fn test_connection(&self) -> bool {
        self.api.test_connection().await
    }
}

impl fmt::Debug for HuginnClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HuginnClient")
            .field("base_url", &self.api.base_url())
            .field("resolve", self.pipeline.config())
            .finish_non_exhaustive()
    }
}
