use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Open metadata mapping stored alongside every document
pub type JsonMap = serde_json::Map<String, Value>;

/// Vectorization status of a document record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }
}

/// Ingestion request for a single document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveDocumentRequest {
    /// Document identifier, unique per tenant
    pub doc_id: String,
    /// Raw text content
    pub content: String,
    /// Caller-supplied metadata
    #[serde(default)]
    pub metadata: Option<JsonMap>,
    /// Optional grouping tag mirrored into the vector payload
    #[serde(default)]
    pub tag: Option<String>,
    /// Whether to persist the metadata record (default true)
    #[serde(default = "default_true")]
    pub update_metadata: bool,
    /// Whether to run auto-tag enrichment (default true)
    #[serde(default = "default_true")]
    pub auto_tag: bool,
}

/// One document in a batch ingestion call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInput {
    pub doc_id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Option<JsonMap>,
}

/// Per-document outcome of a vectorization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorizeOutcome {
    pub status: String,
    pub doc_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock latency of the whole per-document flow
    pub latency_ms: u64,
    /// Whether the latency SLO annotation was met
    pub performance_target_met: bool,
}

impl VectorizeOutcome {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Collated result of a batch vectorization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchVectorizeResult {
    pub status: String,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<VectorizeOutcome>,
}

/// Hybrid retrieval request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagSearchRequest {
    /// Natural language query
    pub query_text: String,
    /// Maximum number of results to return
    #[serde(default = "default_k")]
    pub k: usize,
    /// Minimum similarity score threshold
    #[serde(default = "default_score_min")]
    pub score_min: f32,
    /// Exact-match payload tag filter pushed down to the engine
    #[serde(default)]
    pub tag: Option<String>,
    /// Metadata equality post-filters
    #[serde(default)]
    pub filters: Option<JsonMap>,
    /// Tag intersection post-filter (matches `tags` or `auto_tags`)
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Case-insensitive substring filter over `path` / `file_path`
    #[serde(default)]
    pub path_query: Option<String>,
}

/// A single retrieval hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagHit {
    pub doc_id: String,
    pub score: f32,
    pub content_preview: String,
    pub metadata: JsonMap,
    pub hierarchy_path: String,
}

/// Retrieval response; `failed` responses always carry empty results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagSearchResponse {
    pub status: String,
    pub results: Vec<RagHit>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RagSearchResponse {
    pub fn success(results: Vec<RagHit>) -> Self {
        let count = results.len();
        RagSearchResponse {
            status: "success".to_string(),
            results,
            count,
            error: None,
        }
    }

    pub fn failed(error: String) -> Self {
        RagSearchResponse {
            status: "failed".to_string(),
            results: Vec::new(),
            count: 0,
            error: Some(error),
        }
    }
}

/// Filter-only listing request (no similarity score)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrollSearchRequest {
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub filters: Option<JsonMap>,
    #[serde(default = "default_k")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_true() -> bool {
    true
}

fn default_k() -> usize {
    10
}

fn default_score_min() -> f32 {
    0.5
}

/// Truncate content at a word boundary for preview fields
pub fn content_preview(content: &str) -> String {
    const MAX_PREVIEW_LENGTH: usize = 300;

    if content.len() <= MAX_PREVIEW_LENGTH {
        return content.to_string();
    }

    let max_content_length = MAX_PREVIEW_LENGTH - 3;

    // Back off to a char boundary before searching for whitespace
    let mut boundary = max_content_length;
    while !content.is_char_boundary(boundary) {
        boundary -= 1;
    }

    let truncate_at = content[..boundary]
        .rfind(char::is_whitespace)
        .unwrap_or(boundary);

    format!("{}...", content[..truncate_at].trim_end())
}
