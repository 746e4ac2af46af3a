//! Wire types for the note server's Data API.

use serde::{Deserialize, Serialize};

/// Fields requested for search results.
pub(crate) const SUMMARY_FIELDS: &str = "id,parent_id,title,created_time,updated_time";

/// Fields requested for a full note.
pub(crate) const NOTE_FIELDS: &str =
    "id,parent_id,title,body,created_time,updated_time,source_url,author";

/// Fields requested for resource metadata.
pub(crate) const RESOURCE_FIELDS: &str = "id,title,mime,filename,file_extension,size";

/// Fields requested for a folder (notebook).
pub(crate) const FOLDER_FIELDS: &str = "id,parent_id,title";

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteSummary {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub parent_id: String,
    /// Milliseconds since the epoch.
    #[serde(default)]
    pub created_time: i64,
    #[serde(default)]
    pub updated_time: i64,
}

/// A full note, including its markdown body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub created_time: i64,
    #[serde(default)]
    pub updated_time: i64,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub author: String,
}

/// Metadata of a binary resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub mime: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub file_extension: String,
    #[serde(default)]
    pub size: u64,
}

impl ResourceMetadata {
    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }
}

/// A notebook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub parent_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

/// Paginated list envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDir {
    Asc,
    Desc,
}

impl OrderDir {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderDir::Asc => "ASC",
            OrderDir::Desc => "DESC",
        }
    }
}

/// Options for [`ApiClient::search`](super::ApiClient::search).
///
/// ```rust
/// # use huginn::{OrderDir, SearchOptions};
/// let options = SearchOptions::new()
///     .limit(25)
///     .max_results(100)
///     .order_by("updated_time", OrderDir::Desc);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    /// Page size requested from the server (1..=100). Default: 20.
    pub limit: u32,
    /// Stop paginating once this many results are collected. Default: 50.
    pub max_results: usize,
    pub order_by: Option<String>,
    pub order_dir: Option<OrderDir>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 20,
            max_results: 50,
            order_by: None,
            order_dir: None,
        }
    }
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit.clamp(1, 100);
        self
    }

    pub fn max_results(mut self, n: usize) -> Self {
        self.max_results = n;
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, dir: OrderDir) -> Self {
        self.order_by = Some(field.into());
        self.order_dir = Some(dir);
        self
    }

    /// Stable string form used in result-cache keys.
    pub(crate) fn cache_fragment(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.limit,
            self.max_results,
            self.order_by.as_deref().unwrap_or(""),
            self.order_dir.map_or("", |d| d.as_str())
        )
    }
}
