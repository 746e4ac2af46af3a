//! Telemetry metric name constants.
//!
//! Centralised metric names for huginn operations. Consumers install their
//! own `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `huginn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `operation`: API operation class (e.g. "search", "note", "resource_file")
//! - `status`: outcome: "ok" or the error kind
//! - `cache`: "results" or "resources"

/// Total HTTP requests sent to the note server (one per attempt).
///
/// Labels: `operation`, `status`.
pub const REQUESTS_TOTAL: &str = "huginn_requests_total";

/// HTTP request duration in seconds.
///
/// Labels: `operation`.
pub const REQUEST_DURATION_SECONDS: &str = "huginn_request_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `operation`.
pub const RETRIES_TOTAL: &str = "huginn_retries_total";

/// Calls rejected by an open circuit without touching the network.
///
/// Labels: `operation`.
pub const CIRCUIT_REJECTIONS_TOTAL: &str = "huginn_circuit_rejections_total";

/// Requests waiting for gateway admission.
pub const GATEWAY_QUEUE_DEPTH: &str = "huginn_gateway_queue_depth";

/// Queued requests rejected by `clear_queue`.
pub const GATEWAY_CANCELLED_TOTAL: &str = "huginn_gateway_cancelled_total";

/// Total cache hits.
///
/// Labels: `cache`.
pub const CACHE_HITS_TOTAL: &str = "huginn_cache_hits_total";

/// Total cache misses.
///
/// Labels: `cache`.
pub const CACHE_MISSES_TOTAL: &str = "huginn_cache_misses_total";

/// Total entries evicted for count or byte budget.
///
/// Labels: `cache`.
pub const CACHE_EVICTIONS_TOTAL: &str = "huginn_cache_evictions_total";

/// Resource references resolved by the pipeline.
///
/// Labels: `mode` ("inline" | "external"), `status` ("ok" | "error").
pub const RESOURCES_RESOLVED_TOTAL: &str = "huginn_resources_resolved_total";
