//! Resource resolution for note bodies.
//!
//! [`ResourcePipeline::resolve_body`] finds embedded resource references,
//! fetches each distinct resource once (resource cache first, then the API),
//! and rewrites the body so every reference either points at resolved
//! content or is replaced by a visible placeholder.
//!
//! Two output modes:
//!
//! - [`ResolveMode::Inline`] embeds images as base64 data URIs. Non-image
//!   resources are left as placeholders without downloading them.
//! - [`ResolveMode::External`] writes each resource through a
//!   [`StorageSink`] to `<resource_dir>/<id><ext>` and points the reference
//!   at that relative path.

mod mime;
mod rewrite;
mod scan;
mod sink;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use futures_util::{StreamExt, stream};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

pub use mime::{extension_for, extension_for_mime};
pub use rewrite::{BROKEN_IMAGE_DATA_URI, data_uri};
pub use scan::{
    HtmlAttribute, ReferenceSyntax, ResourceReference, is_resource_id, scan, unique_ids,
};
pub use sink::{FsStorageSink, StorageSink};

use crate::api::ApiClient;
use crate::cache::ResourceCache;
use crate::telemetry;
use crate::{HuginnError, Result};

/// Default number of resources resolved concurrently.
pub const DEFAULT_FAN_OUT: usize = 4;

/// Default directory (relative to the sink) for external resources.
pub const DEFAULT_RESOURCE_DIR: &str = "_resources";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolveMode {
    /// Embed images as data URIs.
    #[default]
    Inline,
    /// Store resources through the sink and reference them by path.
    External,
}

impl ResolveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolveMode::Inline => "inline",
            ResolveMode::External => "external",
        }
    }
}

/// Configuration for [`ResourcePipeline`].
#[derive(Debug, Clone)]
pub struct ResolveConfig {
    /// Distinct resources resolved at once. Default: 4.
    pub fan_out: usize,
    /// Folder for external resources. Default: `_resources`.
    pub resource_dir: String,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            fan_out: DEFAULT_FAN_OUT,
            resource_dir: DEFAULT_RESOURCE_DIR.to_string(),
        }
    }
}

impl ResolveConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fan_out(mut self, n: usize) -> Self {
        self.fan_out = n;
        self
    }

    pub fn resource_dir(mut self, dir: impl Into<String>) -> Self {
        self.resource_dir = dir.into();
        self
    }
}

/// A downloaded resource, as held in the resource cache.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedResource {
    pub id: String,
    pub mime: String,
    pub filename: String,
    /// File extension with leading dot (may be empty for attachments).
    pub extension: String,
    pub bytes: Vec<u8>,
}

impl ResolvedResource {
    pub fn is_image(&self) -> bool {
        mime::is_image(&self.mime)
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn data_uri(&self) -> String {
        rewrite::data_uri(&self.mime, &self.bytes)
    }
}

impl fmt::Debug for ResolvedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedResource")
            .field("id", &self.id)
            .field("mime", &self.mime)
            .field("filename", &self.filename)
            .field("extension", &self.extension)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Outcome for one distinct resource id.
#[derive(Debug, Clone)]
pub struct ResolutionResult {
    pub resource_id: String,
    pub success: bool,
    pub error: Option<HuginnError>,
}

/// A rewritten body plus one result per distinct resource, in first-seen order.
#[derive(Debug, Clone)]
pub struct ResolvedBody {
    pub body: String,
    pub results: Vec<ResolutionResult>,
}

impl ResolvedBody {
    pub fn resolved(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ResolutionResult> {
        self.results.iter().filter(|r| !r.success)
    }

    /// e.g. "8/10 resources resolved".
    pub fn summary(&self) -> String {
        format!("{}/{} resources resolved", self.resolved(), self.total())
    }
}

/// Progress events emitted by
/// [`resolve_body_with_progress`](ResourcePipeline::resolve_body_with_progress).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveProgress {
    Started {
        total: usize,
    },
    Resolved {
        resource_id: String,
        success: bool,
        completed: usize,
        total: usize,
    },
    Finished {
        resolved: usize,
        total: usize,
    },
}

/// Bounded progress channel: the sender goes to the pipeline, the stream to the UI.
pub fn progress_channel(
    buffer: usize,
) -> (mpsc::Sender<ResolveProgress>, ReceiverStream<ResolveProgress>) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (tx, ReceiverStream::new(rx))
}

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<ResolvedResource>>>>;

/// Finds, fetches and rewrites resource references in note bodies.
pub struct ResourcePipeline {
    api: Arc<ApiClient>,
    cache: Arc<ResourceCache>,
    sink: Option<Arc<dyn StorageSink>>,
    config: ResolveConfig,
    in_flight: Arc<Mutex<HashMap<String, SharedFetch>>>,
}

impl ResourcePipeline {
    pub fn new(
        api: Arc<ApiClient>,
        cache: Arc<ResourceCache>,
        sink: Option<Arc<dyn StorageSink>>,
        config: ResolveConfig,
    ) -> Self {
        Self {
            api,
            cache,
            sink,
            config,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &ResolveConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// Resolve every resource reference in `body`.
    ///
    /// Individual failures become placeholders and are reported in
    /// [`ResolvedBody::results`]. The only error is a configuration one:
    /// external mode without a storage sink.
    pub async fn resolve_body(&self, body: &str, mode: ResolveMode) -> Result<ResolvedBody> {
        self.resolve(body, mode, None).await
    }

    /// Like [`resolve_body`](Self::resolve_body), reporting progress on `progress`.
    ///
    /// Events are dropped rather than waited for when the channel is full or
    /// closed, so a slow or absent reader never affects resolution.
    pub async fn resolve_body_with_progress(
        &self,
        body: &str,
        mode: ResolveMode,
        progress: mpsc::Sender<ResolveProgress>,
    ) -> Result<ResolvedBody> {
        self.resolve(body, mode, Some(progress)).await
    }

    async fn resolve(
        &self,
        body: &str,
        mode: ResolveMode,
        progress: Option<mpsc::Sender<ResolveProgress>>,
    ) -> Result<ResolvedBody> {
        let sink = match (mode, &self.sink) {
            (ResolveMode::External, None) => {
                return Err(HuginnError::Configuration(
                    "external resolution requires a storage sink".to_string(),
                ));
            }
            (ResolveMode::External, Some(sink)) => Some(sink.as_ref()),
            (ResolveMode::Inline, _) => None,
        };

        let references = scan(body);
        let ids = unique_ids(&references);
        let total = ids.len();
        emit(&progress, ResolveProgress::Started { total });

        if total == 0 {
            emit(&progress, ResolveProgress::Finished { resolved: 0, total });
            return Ok(ResolvedBody {
                body: body.to_string(),
                results: Vec::new(),
            });
        }

        let folder_ready = match sink {
            Some(sink) => sink.ensure_folder(&self.config.resource_dir).await,
            None => Ok(()),
        };

        let mut targets: HashMap<String, Result<String>> = HashMap::with_capacity(total);
        let mut completed = 0;
        let mut outcomes = stream::iter(ids.iter().cloned())
            .map(|id| {
                let folder_ready = &folder_ready;
                async move {
                    let target = self.resolve_target(&id, mode, sink, folder_ready).await;
                    (id, target)
                }
            })
            .buffer_unordered(self.config.fan_out.max(1));

        while let Some((id, target)) = outcomes.next().await {
            completed += 1;
            let status = if target.is_ok() { "ok" } else { "error" };
            metrics::counter!(telemetry::RESOURCES_RESOLVED_TOTAL,
                "mode" => mode.as_str(),
                "status" => status,
            )
            .increment(1);
            if let Err(e) = &target {
                warn!(resource_id = %id, kind = e.kind(), error = %e, "resource not resolved");
            }
            emit(
                &progress,
                ResolveProgress::Resolved {
                    resource_id: id.clone(),
                    success: target.is_ok(),
                    completed,
                    total,
                },
            );
            targets.insert(id, target);
        }
        drop(outcomes);

        let mut rewritten = String::with_capacity(body.len());
        let mut cursor = 0;
        for reference in &references {
            rewritten.push_str(&body[cursor..reference.span.start]);
            match targets.get(&reference.resource_id) {
                Some(Ok(target)) => rewritten.push_str(&rewrite::render_resolved(reference, target)),
                Some(Err(e)) => {
                    rewritten.push_str(&rewrite::render_placeholder(reference, &e.to_string()))
                }
                None => rewritten.push_str(&rewrite::render_placeholder(reference, "not resolved")),
            }
            cursor = reference.span.end;
        }
        rewritten.push_str(&body[cursor..]);

        let results: Vec<ResolutionResult> = ids
            .into_iter()
            .map(|id| {
                let error = match targets.remove(&id) {
                    Some(Ok(_)) => None,
                    Some(Err(e)) => Some(e),
                    None => Some(HuginnError::Cancelled),
                };
                ResolutionResult {
                    resource_id: id,
                    success: error.is_none(),
                    error,
                }
            })
            .collect();

        let resolved = ResolvedBody {
            body: rewritten,
            results,
        };
        info!(
            mode = mode.as_str(),
            resolved = resolved.resolved(),
            total,
            "{}",
            resolved.summary()
        );
        emit(
            &progress,
            ResolveProgress::Finished {
                resolved: resolved.resolved(),
                total,
            },
        );
        Ok(resolved)
    }

    /// Resolve one id to the string that replaces its reference target.
    async fn resolve_target(
        &self,
        id: &str,
        mode: ResolveMode,
        sink: Option<&dyn StorageSink>,
        folder_ready: &Result<()>,
    ) -> Result<String> {
        let resource = self.fetch(id, mode).await?;
        match (mode, sink) {
            (ResolveMode::Inline, _) | (ResolveMode::External, None) => {
                if !resource.is_image() {
                    return Err(not_an_image(id, &resource.mime));
                }
                Ok(resource.data_uri())
            }
            (ResolveMode::External, Some(sink)) => {
                folder_ready.clone()?;
                let path = format!(
                    "{}/{}{}",
                    self.config.resource_dir.trim_end_matches('/'),
                    resource.id,
                    resource.extension
                );
                if sink.exists(&path).await? {
                    debug!(resource_id = id, path, "resource already stored");
                } else {
                    sink.write_binary(&path, &resource.bytes).await?;
                    debug!(resource_id = id, path, bytes = resource.bytes.len(), "resource stored");
                }
                Ok(path)
            }
        }
    }

    /// Resource-cache lookup, falling back to a shared in-flight download.
    async fn fetch(&self, id: &str, mode: ResolveMode) -> Result<Arc<ResolvedResource>> {
        if let Some(resource) = self.cache.get(&id.to_string()) {
            debug!(resource_id = id, "resource cache hit");
            return Ok(resource);
        }

        let with_attachments = mode == ResolveMode::External;
        let key = format!("{id}:{}", mode.as_str());
        let fetch = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(&key) {
                Some(existing) => {
                    debug!(resource_id = id, "joining in-flight fetch");
                    existing.clone()
                }
                None => {
                    let api = Arc::clone(&self.api);
                    let cache = Arc::clone(&self.cache);
                    let registry = Arc::clone(&self.in_flight);
                    let id = id.to_string();
                    let entry = key.clone();
                    let fetch = async move {
                        let result = download(&api, &cache, &id, with_attachments).await;
                        lock(&registry).remove(&entry);
                        result
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(key, fetch.clone());
                    fetch
                }
            }
        };
        fetch.await
    }
}

/// Metadata, then bytes, then cache insertion.
async fn download(
    api: &ApiClient,
    cache: &ResourceCache,
    id: &str,
    with_attachments: bool,
) -> Result<Arc<ResolvedResource>> {
    let metadata = api
        .get_resource_metadata(id)
        .await?
        .ok_or_else(|| HuginnError::NotFound(format!("resource {id}")))?;

    let image = metadata.is_image();
    if !image && !with_attachments {
        return Err(not_an_image(id, &metadata.mime));
    }

    let bytes = api
        .get_resource_bytes(id)
        .await?
        .ok_or_else(|| HuginnError::NotFound(format!("resource file {id}")))?;
    if bytes.is_empty() {
        return Err(HuginnError::Unresolvable {
            resource_id: id.to_string(),
            reason: "empty payload".to_string(),
        });
    }
    if image && !mime::matches_signature(&metadata.mime, &bytes) {
        return Err(HuginnError::Unresolvable {
            resource_id: id.to_string(),
            reason: format!("payload is not valid {}", metadata.mime),
        });
    }

    let resource = Arc::new(ResolvedResource {
        id: id.to_string(),
        extension: mime::extension_for(&metadata.mime, &metadata.file_extension),
        mime: metadata.mime,
        filename: metadata.filename,
        bytes,
    });
    cache.set(id.to_string(), Arc::clone(&resource), resource.size_bytes());
    debug!(resource_id = id, bytes = resource.size_bytes(), "resource fetched");
    Ok(resource)
}

fn not_an_image(id: &str, mime: &str) -> HuginnError {
    HuginnError::Unresolvable {
        resource_id: id.to_string(),
        reason: format!("not an image ({mime})"),
    }
}

/// Progress is advisory: a full or closed channel drops the event.
fn emit(progress: &Option<mpsc::Sender<ResolveProgress>>, event: ResolveProgress) {
    if let Some(tx) = progress
        && let Err(e) = tx.try_send(event)
    {
        debug!(error = %e, "progress event dropped");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
