/// Hybrid retrieval module
///
/// Implements RAG search: embed the query, over-fetch from the
/// similarity engine, hydrate hits with metadata, then post-filter by
/// metadata equality, tag intersection and hierarchical path. Engine or
/// embedder failures return a failed response with no results, never a
/// partial list.


use crate::embedding::Embedder;
use crate::error::ApiError;
use crate::metadata::MetadataStore;
use crate::types::{content_preview, JsonMap, RagHit, RagSearchRequest, RagSearchResponse, ScrollSearchRequest};
use crate::vector_store::{PayloadFilter, ScoredPoint, VectorStore};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const HIERARCHY_LEVELS: [&str; 6] = [
    "level_1", "level_2", "level_3", "level_4", "level_5", "level_6",
];

/// Hybrid retrieval engine
pub struct RetrievalService {
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
    metadata_store: Arc<dyn MetadataStore>,
    timeout: Duration,
}

impl RetrievalService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<dyn VectorStore>,
        metadata_store: Arc<dyn MetadataStore>,
        timeout: Duration,
    ) -> Self {
        RetrievalService {
            embedder,
            vector_store,
            metadata_store,
            timeout,
        }
    }

    /// Run a hybrid search under the retrieval deadline
    pub async fn rag_search(&self, request: &RagSearchRequest) -> RagSearchResponse {
        if request.query_text.trim().is_empty() {
            return RagSearchResponse::failed(
                ApiError::InvalidInput("query_text must be non-empty".to_string()).to_string(),
            );
        }

        match tokio::time::timeout(self.timeout, self.rag_search_inner(request)).await {
            Ok(response) => response,
            Err(_) => RagSearchResponse::failed(ApiError::Timeout.to_string()),
        }
    }

    async fn rag_search_inner(&self, request: &RagSearchRequest) -> RagSearchResponse {
        let embedding = match self.embedder.embed(&request.query_text).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Query embedding failed: {}", e);
                return RagSearchResponse::failed(e.to_string());
            }
        };

        let engine_filter = request
            .tag
            .as_ref()
            .map(|tag| PayloadFilter::new().eq("tag", tag.clone()));

        // Over-fetch to compensate for post-filtering
        let fetch_limit = request.k + request.k.max(1);

        let points = match self
            .vector_store
            .search(
                &embedding.vector,
                fetch_limit,
                request.score_min,
                engine_filter.as_ref(),
            )
            .await
        {
            Ok(points) => points,
            Err(e) => {
                warn!("Vector search failed: {}", e);
                return RagSearchResponse::failed(e.to_string());
            }
        };

        debug!("Vector search returned {} candidates", points.len());

        // Hydration is best-effort; a missing record only leaves a hit
        // without its stored fields.
        let doc_ids: Vec<String> = points
            .iter()
            .filter_map(|point| point.payload.get("doc_id").and_then(|v| v.as_str()))
            .map(String::from)
            .collect();

        let records = match self.metadata_store.batch_get(&doc_ids).await {
            Ok(records) => records,
            Err(e) => {
                warn!("Metadata hydration failed, continuing without it: {}", e);
                HashMap::new()
            }
        };

        let mut hits: Vec<(String, f32, JsonMap)> = points
            .into_iter()
            .filter_map(|point| {
                let doc_id = point
                    .payload
                    .get("doc_id")
                    .and_then(|v| v.as_str())
                    .map(String::from)?;
                let mut metadata = point.payload;
                if let Some(record) = records.get(&doc_id) {
                    for (key, value) in record {
                        metadata.insert(key.clone(), value.clone());
                    }
                }
                Some((doc_id, point.score, metadata))
            })
            .collect();

        if let Some(filters) = &request.filters {
            hits.retain(|(_, _, metadata)| matches_metadata(metadata, filters));
        }
        if let Some(tags) = &request.tags {
            hits.retain(|(_, _, metadata)| matches_tags(metadata, tags));
        }
        if let Some(path_query) = &request.path_query {
            hits.retain(|(_, _, metadata)| matches_path(metadata, path_query));
        }
        hits.retain(|(_, score, _)| *score >= request.score_min);

        // Stable on equal scores, so engine tie-breaking order survives
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(request.k);

        let results: Vec<RagHit> = hits
            .into_iter()
            .map(|(doc_id, score, metadata)| {
                let hierarchy_path = build_hierarchy_path(&metadata);
                let preview = metadata
                    .get("content_preview")
                    .and_then(|v| v.as_str())
                    .map(String::from)
                    .or_else(|| {
                        metadata
                            .get("original_text")
                            .and_then(|v| v.as_str())
                            .map(content_preview)
                    })
                    .unwrap_or_default();
                RagHit {
                    doc_id,
                    score,
                    content_preview: preview,
                    metadata,
                    hierarchy_path,
                }
            })
            .collect();

        info!("RAG search produced {} hits", results.len());
        RagSearchResponse::success(results)
    }

    /// Filter-only listing against the similarity engine; scores are 1.0
    pub async fn scroll_search(
        &self,
        request: &ScrollSearchRequest,
    ) -> crate::error::ApiResult<Vec<ScoredPoint>> {
        let mut filter = PayloadFilter::new();
        if let Some(tag) = &request.tag {
            filter = filter.eq("tag", tag.clone());
        }
        if let Some(filters) = &request.filters {
            for (key, value) in filters {
                filter = filter.eq(key.clone(), value.clone());
            }
        }

        let filter = (!filter.is_empty()).then_some(filter);
        self.vector_store
            .scroll(filter.as_ref(), request.limit, request.offset)
            .await
    }
}

/// Metadata equality filter: every requested key must be present and
/// equal
pub(crate) fn matches_metadata(metadata: &JsonMap, filters: &JsonMap) -> bool {
    filters
        .iter()
        .all(|(key, value)| metadata.get(key) == Some(value))
}

/// Tag filter: the hit's `tags` or `auto_tags` must intersect the
/// requested set
pub(crate) fn matches_tags(metadata: &JsonMap, requested: &[String]) -> bool {
    if requested.is_empty() {
        return true;
    }

    let mut hit_tags = Vec::new();
    for field in ["tags", "auto_tags"] {
        match metadata.get(field) {
            Some(Value::Array(tags)) => {
                hit_tags.extend(tags.iter().filter_map(|t| t.as_str()));
            }
            Some(Value::String(tag)) => hit_tags.push(tag),
            _ => {}
        }
    }

    requested.iter().any(|tag| hit_tags.contains(&tag.as_str()))
}

/// Path filter: `path` or `file_path` contains the query,
/// case-insensitive
pub(crate) fn matches_path(metadata: &JsonMap, path_query: &str) -> bool {
    let needle = path_query.to_lowercase();
    ["path", "file_path"].iter().any(|field| {
        metadata
            .get(*field)
            .and_then(|v| v.as_str())
            .map(|path| path.to_lowercase().contains(&needle))
            .unwrap_or(false)
    })
}

/// Coarse navigational path for a hit: hierarchy levels first, then a
/// slash-split of the stored path, else "Uncategorized"
pub(crate) fn build_hierarchy_path(metadata: &JsonMap) -> String {
    let levels: Vec<&str> = HIERARCHY_LEVELS
        .iter()
        .filter_map(|level| metadata.get(*level).and_then(|v| v.as_str()))
        .filter(|level| !level.is_empty())
        .collect();

    if !levels.is_empty() {
        return levels.join(" > ");
    }

    for field in ["path", "file_path"] {
        if let Some(path) = metadata.get(field).and_then(|v| v.as_str()) {
            let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
            if !segments.is_empty() {
                return segments.join(" > ");
            }
        }
    }

    "Uncategorized".to_string()
}
