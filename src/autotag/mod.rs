/// Auto-tag enrichment module
///
/// Derives tags for document content through the embedding provider's
/// chat endpoint, with a document-store-backed result cache keyed by the
/// SHA-256 of the content. Tag generation is best-effort: ingestion
/// proceeds unchanged when it fails.


use crate::embedding::Embedder;
use crate::error::ApiResult;
use crate::metadata::{versioner::timestamp_age, MetadataStore};
use crate::types::JsonMap;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One tag-generation result
#[derive(Debug, Clone)]
pub struct TagGeneration {
    pub tags: Vec<String>,
    /// `"cache"` or `"provider"`
    pub source: String,
    pub content_hash: String,
}

/// Tag generator with a content-hash-keyed result cache
pub struct AutoTagger {
    embedder: Arc<dyn Embedder>,
    cache_store: Arc<dyn MetadataStore>,
    cache_ttl: Duration,
}

impl AutoTagger {
    /// Create an auto-tagger. `cache_store` is a document-store handle
    /// scoped to the tag cache collection.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        cache_store: Arc<dyn MetadataStore>,
        cache_ttl_hours: u64,
    ) -> Self {
        AutoTagger {
            embedder,
            cache_store,
            cache_ttl: Duration::hours(cache_ttl_hours as i64),
        }
    }

    /// SHA-256 hex digest used as the cache key
    pub fn content_hash(content: &str) -> String {
        hex::encode(Sha256::digest(content.as_bytes()))
    }

    /// Short context string derived from existing metadata, appended to
    /// the generation prompt
    fn context_string(existing: &JsonMap) -> String {
        let mut parts = Vec::new();
        for (field, label) in [
            ("author", "Author"),
            ("category", "Category"),
            ("source", "Source"),
            ("year", "Year"),
        ] {
            match existing.get(field) {
                Some(Value::String(value)) => parts.push(format!("{}: {}", label, value)),
                Some(Value::Number(value)) => parts.push(format!("{}: {}", label, value)),
                _ => {}
            }
        }

        if parts.is_empty() {
            String::new()
        } else {
            format!("\n\nExisting metadata: {}", parts.join(", "))
        }
    }

    /// Look up cached tags; expired entries are removed and miss
    async fn cached_tags(&self, content_hash: &str) -> Option<Vec<String>> {
        let entry = match self.cache_store.get(content_hash).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!("Tag cache lookup failed: {}", e);
                return None;
            }
        };

        let fresh = entry
            .get("cached_at")
            .and_then(|v| v.as_str())
            .and_then(timestamp_age)
            .map(|age| age <= self.cache_ttl)
            .unwrap_or(false);

        if !fresh {
            if let Err(e) = self.cache_store.delete(content_hash).await {
                warn!("Failed to drop expired tag cache entry: {}", e);
            }
            return None;
        }

        entry.get("tags").and_then(|tags| {
            tags.as_array().map(|tags| {
                tags.iter()
                    .filter_map(|t| t.as_str())
                    .map(|t| t.to_string())
                    .collect()
            })
        })
    }

    async fn cache_tags(&self, content_hash: &str, tags: &[String], content_len: usize) {
        let mut entry = JsonMap::new();
        entry.insert("tags".to_string(), json!(tags));
        entry.insert("cached_at".to_string(), json!(Utc::now().to_rfc3339()));
        entry.insert("content_hash".to_string(), json!(content_hash));
        entry.insert(
            "metadata".to_string(),
            json!({
                "generated_at": Utc::now().to_rfc3339(),
                "content_length": content_len,
            }),
        );

        if let Err(e) = self.cache_store.set(content_hash, entry).await {
            warn!("Failed to cache generated tags: {}", e);
        } else {
            debug!("Cached tags for content hash {}", content_hash);
        }
    }

    /// Generate tags for `content`, consulting the cache first
    pub async fn generate(
        &self,
        content: &str,
        existing_metadata: &JsonMap,
        max_tags: usize,
    ) -> ApiResult<TagGeneration> {
        let content_hash = Self::content_hash(content);

        if let Some(tags) = self.cached_tags(&content_hash).await {
            debug!("Tag cache hit for {}", content_hash);
            return Ok(TagGeneration {
                tags,
                source: "cache".to_string(),
                content_hash,
            });
        }

        let context = Self::context_string(existing_metadata);
        let tags = self
            .embedder
            .generate_tags(content, &context, max_tags)
            .await?;

        self.cache_tags(&content_hash, &tags, content.len()).await;

        Ok(TagGeneration {
            tags,
            source: "provider".to_string(),
            content_hash,
        })
    }

    /// Enhance metadata with generated tags. Failures are non-fatal and
    /// return the metadata unchanged.
    pub async fn enhance_with_tags(
        &self,
        doc_id: &str,
        content: &str,
        existing_metadata: JsonMap,
        max_tags: usize,
    ) -> JsonMap {
        let generation = match self.generate(content, &existing_metadata, max_tags).await {
            Ok(generation) => generation,
            Err(e) => {
                warn!("Auto-tagging failed for doc_id {}: {}", doc_id, e);
                return existing_metadata;
            }
        };

        let mut enhanced = existing_metadata;
        let auto_tags = generation.tags;

        enhanced.insert(
            "auto_tag_metadata".to_string(),
            json!({
                "generated_at": Utc::now().to_rfc3339(),
                "source": generation.source,
                "content_hash": generation.content_hash,
                "tag_count": auto_tags.len(),
            }),
        );

        // Union of existing tags and the generated ones, existing first
        let mut merged: Vec<String> = match enhanced.get("tags") {
            Some(Value::String(tag)) => vec![tag.clone()],
            Some(Value::Array(tags)) => tags
                .iter()
                .filter_map(|t| t.as_str())
                .map(|t| t.to_string())
                .collect(),
            _ => Vec::new(),
        };
        for tag in &auto_tags {
            if !merged.contains(tag) {
                merged.push(tag.clone());
            }
        }
        enhanced.insert("tags".to_string(), json!(merged));

        let level_2_missing = enhanced
            .get("level_2")
            .map(|v| v.is_null())
            .unwrap_or(true);
        if level_2_missing {
            if let Some(first) = auto_tags.first() {
                enhanced.insert("level_2".to_string(), json!(first));
            }
        }

        info!(
            "Enhanced metadata for doc_id {} with {} auto-generated tags",
            doc_id,
            auto_tags.len()
        );
        enhanced.insert("auto_tags".to_string(), json!(auto_tags));

        enhanced
    }
}
