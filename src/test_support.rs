//! Shared stubs for module tests: a deterministic embedder and failure
//! wrappers around the in-memory stores.

use crate::embedding::{Embedder, Embedding};
use crate::error::{ApiError, ApiResult};
use crate::metadata::MetadataStore;
use crate::types::JsonMap;
use crate::vector_store::{PayloadFilter, ScoredPoint, VectorStore};
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Deterministic embedder: the vector for a text is derived from its
/// SHA-256, so identical texts embed identically. Specific texts can be
/// programmed to fixed vectors, and whole call classes can be scripted
/// to fail.
pub struct StubEmbedder {
    dimension: usize,
    programmed: Mutex<HashMap<String, Vec<f32>>>,
    tags: Mutex<Vec<String>>,
    fail_embed: AtomicBool,
    fail_tags: AtomicBool,
    embed_calls: AtomicUsize,
    tag_calls: AtomicUsize,
}

impl StubEmbedder {
    pub fn new(dimension: usize) -> Self {
        StubEmbedder {
            dimension,
            programmed: Mutex::new(HashMap::new()),
            tags: Mutex::new(vec!["stub-tag".to_string()]),
            fail_embed: AtomicBool::new(false),
            fail_tags: AtomicBool::new(false),
            embed_calls: AtomicUsize::new(0),
            tag_calls: AtomicUsize::new(0),
        }
    }

    /// Fix the vector returned for a specific text
    pub fn program(&self, text: &str, vector: Vec<f32>) {
        self.programmed
            .lock()
            .unwrap()
            .insert(text.to_string(), vector);
    }

    /// Set the tags returned by `generate_tags`
    pub fn set_tags(&self, tags: Vec<String>) {
        *self.tags.lock().unwrap() = tags;
    }

    pub fn fail_embeddings(&self, fail: bool) {
        self.fail_embed.store(fail, Ordering::SeqCst);
    }

    pub fn fail_tag_generation(&self, fail: bool) {
        self.fail_tags.store(fail, Ordering::SeqCst);
    }

    pub fn embed_call_count(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    pub fn tag_call_count(&self) -> usize {
        self.tag_calls.load(Ordering::SeqCst)
    }

    fn derive_vector(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        (0..self.dimension)
            .map(|i| {
                let byte = digest[i % digest.len()];
                (byte as f32 + (i % 7) as f32) / 255.0
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> ApiResult<Embedding> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_embed.load(Ordering::SeqCst) {
            return Err(ApiError::EmbeddingUnavailable(
                "stub embedder offline".to_string(),
            ));
        }

        let vector = self
            .programmed
            .lock()
            .unwrap()
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.derive_vector(text));

        Ok(Embedding {
            vector,
            token_count: text.split_whitespace().count() as u64,
            model: "stub-embedding-model".to_string(),
        })
    }

    async fn generate_tags(
        &self,
        _content: &str,
        _context: &str,
        max_tags: usize,
    ) -> ApiResult<Vec<String>> {
        self.tag_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_tags.load(Ordering::SeqCst) {
            return Err(ApiError::EmbeddingUnavailable(
                "stub tag generation offline".to_string(),
            ));
        }

        let tags = self.tags.lock().unwrap().clone();
        Ok(tags.into_iter().take(max_tags).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn health_check(&self) -> bool {
        !self.fail_embed.load(Ordering::SeqCst)
    }
}

/// Vector store wrapper that fails upserts for selected doc_ids (or all
/// operations), delegating everything else to the inner store.
pub struct FailingVectorStore {
    inner: Arc<dyn VectorStore>,
    fail_doc_ids: Mutex<HashSet<String>>,
    fail_all: AtomicBool,
}

impl FailingVectorStore {
    pub fn wrap(inner: Arc<dyn VectorStore>) -> Self {
        FailingVectorStore {
            inner,
            fail_doc_ids: Mutex::new(HashSet::new()),
            fail_all: AtomicBool::new(false),
        }
    }

    pub fn fail_doc(&self, doc_id: &str) {
        self.fail_doc_ids.lock().unwrap().insert(doc_id.to_string());
    }

    pub fn fail_everything(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    fn should_fail(&self, payload: &JsonMap) -> bool {
        if self.fail_all.load(Ordering::SeqCst) {
            return true;
        }
        payload
            .get("doc_id")
            .and_then(|v| v.as_str())
            .map(|doc_id| self.fail_doc_ids.lock().unwrap().contains(doc_id))
            .unwrap_or(false)
    }
}

#[async_trait]
impl VectorStore for FailingVectorStore {
    async fn ensure_collection(&self) -> ApiResult<()> {
        self.inner.ensure_collection().await
    }

    async fn upsert(
        &self,
        id: Option<Uuid>,
        vector: Vec<f32>,
        payload: JsonMap,
    ) -> ApiResult<Uuid> {
        if self.should_fail(&payload) {
            return Err(ApiError::VectorStoreUnavailable(
                "scripted upsert failure".to_string(),
            ));
        }
        self.inner.upsert(id, vector, payload).await
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        score_min: f32,
        filter: Option<&PayloadFilter>,
    ) -> ApiResult<Vec<ScoredPoint>> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(ApiError::VectorStoreUnavailable(
                "scripted search failure".to_string(),
            ));
        }
        self.inner.search(vector, limit, score_min, filter).await
    }

    async fn scroll(
        &self,
        filter: Option<&PayloadFilter>,
        limit: usize,
        offset: usize,
    ) -> ApiResult<Vec<ScoredPoint>> {
        self.inner.scroll(filter, limit, offset).await
    }

    async fn delete_by_filter(&self, filter: &PayloadFilter) -> ApiResult<()> {
        self.inner.delete_by_filter(filter).await
    }

    async fn count(&self) -> ApiResult<u64> {
        self.inner.count().await
    }

    async fn health_check(&self) -> bool {
        !self.fail_all.load(Ordering::SeqCst)
    }
}

/// Metadata store wrapper that can fail writes, for exercising the
/// compensating-delete path.
pub struct FailingMetadataStore {
    inner: Arc<dyn MetadataStore>,
    fail_writes: AtomicBool,
}

impl FailingMetadataStore {
    pub fn wrap(inner: Arc<dyn MetadataStore>) -> Self {
        FailingMetadataStore {
            inner,
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn write_error(&self) -> ApiError {
        ApiError::MetadataStoreUnavailable("scripted write failure".to_string())
    }
}

#[async_trait]
impl MetadataStore for FailingMetadataStore {
    async fn get(&self, doc_id: &str) -> ApiResult<Option<JsonMap>> {
        self.inner.get(doc_id).await
    }

    async fn set(&self, doc_id: &str, record: JsonMap) -> ApiResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(self.write_error());
        }
        self.inner.set(doc_id, record).await
    }

    async fn batch_get(&self, doc_ids: &[String]) -> ApiResult<HashMap<String, JsonMap>> {
        self.inner.batch_get(doc_ids).await
    }

    async fn batch_set(&self, records: HashMap<String, JsonMap>) -> ApiResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(self.write_error());
        }
        self.inner.batch_set(records).await
    }

    async fn delete(&self, doc_id: &str) -> ApiResult<()> {
        self.inner.delete(doc_id).await
    }

    async fn batch_delete(&self, doc_ids: &[String]) -> ApiResult<()> {
        self.inner.batch_delete(doc_ids).await
    }

    async fn exists(&self, doc_id: &str) -> ApiResult<bool> {
        self.inner.exists(doc_id).await
    }

    async fn batch_exists(&self, doc_ids: &[String]) -> ApiResult<HashMap<String, bool>> {
        self.inner.batch_exists(doc_ids).await
    }

    async fn query(
        &self,
        filter: &[(String, Value)],
        projection: Option<&[String]>,
    ) -> ApiResult<Vec<JsonMap>> {
        self.inner.query(filter, projection).await
    }

    async fn health_check(&self) -> bool {
        self.inner.health_check().await
    }
}
