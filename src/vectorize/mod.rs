/// Vectorization orchestration module
///
/// Composes the embedding client, auto-tagger, similarity engine and
/// document store into the single-document and batch ingestion flows.
/// The write order is vector first, metadata second; when the metadata
/// write fails the vector is compensating-deleted so no `completed`
/// record ever points at a missing vector.


use crate::autotag::AutoTagger;
use crate::embedding::Embedder;
use crate::error::{ApiError, ApiResult};
use crate::metadata::{MetadataStore, Versioner};
use crate::types::{
    content_preview, BatchVectorizeResult, DocumentInput, DocumentStatus, JsonMap,
    VectorizeOutcome,
};
use crate::vector_store::{PayloadFilter, VectorStore};
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Latency SLO annotation attached to every outcome; never asserted
pub const LATENCY_TARGET_MS: u64 = 700;

/// Number of tags requested from the auto-tagger
const MAX_AUTO_TAGS: usize = 5;

/// Upper bound on concurrent per-document vectorizations in a batch
const BATCH_CONCURRENCY: usize = 10;

/// Options for a vectorization call
#[derive(Debug, Clone)]
pub struct VectorizeOptions {
    pub tag: Option<String>,
    pub update_metadata: bool,
    pub auto_tag: bool,
}

impl Default for VectorizeOptions {
    fn default() -> Self {
        VectorizeOptions {
            tag: None,
            update_metadata: true,
            auto_tag: true,
        }
    }
}

/// Orchestrator for document ingestion
pub struct VectorizationService {
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
    metadata_store: Arc<dyn MetadataStore>,
    auto_tagger: Arc<AutoTagger>,
    dimension: usize,
    timeout: Duration,
}

impl VectorizationService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<dyn VectorStore>,
        metadata_store: Arc<dyn MetadataStore>,
        auto_tagger: Arc<AutoTagger>,
        dimension: usize,
        timeout: Duration,
    ) -> Self {
        VectorizationService {
            embedder,
            vector_store,
            metadata_store,
            auto_tagger,
            dimension,
            timeout,
        }
    }

    /// Stable point id for a document, so a re-ingest replaces the
    /// existing point instead of accumulating duplicates
    fn point_id_for(doc_id: &str) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, doc_id.as_bytes())
    }

    /// Vectorize one document end to end, bounded by the configured
    /// deadline. Failures are reported as per-document outcomes, never
    /// as panics or escaped adapter errors.
    pub async fn vectorize(
        &self,
        doc_id: &str,
        content: &str,
        metadata: Option<JsonMap>,
        options: &VectorizeOptions,
    ) -> VectorizeOutcome {
        let start = Instant::now();

        // Shape checks consume no embedding quota
        if doc_id.is_empty() || content.is_empty() {
            return Self::failure_outcome(
                doc_id,
                &ApiError::InvalidInput("doc_id and content must be non-empty".to_string()),
                start,
            );
        }

        match tokio::time::timeout(
            self.timeout,
            self.vectorize_inner(doc_id, content, metadata.unwrap_or_default(), options),
        )
        .await
        {
            Ok(Ok((vector_id, version))) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                info!(
                    "Vectorized doc_id '{}' in {}ms (vector {})",
                    doc_id, latency_ms, vector_id
                );
                VectorizeOutcome {
                    status: "success".to_string(),
                    doc_id: doc_id.to_string(),
                    vector_id: Some(vector_id),
                    version,
                    error: None,
                    latency_ms,
                    performance_target_met: latency_ms <= LATENCY_TARGET_MS,
                }
            }
            Ok(Err(e)) => {
                if options.update_metadata {
                    self.record_failure(doc_id, &e).await;
                }
                Self::failure_outcome(doc_id, &e, start)
            }
            Err(_) => {
                // Deadline crossed: roll the vector back so neither
                // store ends up ahead of the other.
                self.compensate_vector(doc_id).await;
                let e = ApiError::Timeout;
                if options.update_metadata {
                    self.record_failure(doc_id, &e).await;
                }
                Self::failure_outcome(doc_id, &e, start)
            }
        }
    }

    async fn vectorize_inner(
        &self,
        doc_id: &str,
        content: &str,
        metadata: JsonMap,
        options: &VectorizeOptions,
    ) -> ApiResult<(Uuid, Option<u64>)> {
        let metadata = if options.auto_tag {
            self.auto_tagger
                .enhance_with_tags(doc_id, content, metadata, MAX_AUTO_TAGS)
                .await
        } else {
            metadata
        };

        let embedding = self.embedder.embed(content).await?;

        if embedding.vector.len() != self.dimension {
            return Err(ApiError::Internal(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                embedding.vector.len()
            )));
        }

        // Vector first. The payload mirrors the metadata plus doc_id and
        // the optional grouping tag.
        let mut payload = metadata.clone();
        payload.insert("doc_id".to_string(), json!(doc_id));
        if let Some(tag) = &options.tag {
            payload.insert("tag".to_string(), json!(tag));
        }

        let vector_id = self
            .vector_store
            .upsert(Some(Self::point_id_for(doc_id)), embedding.vector, payload)
            .await?;

        // Metadata second; any failure from here on rolls the vector back
        if !options.update_metadata {
            return Ok((vector_id, None));
        }

        let version = match self
            .persist_metadata(doc_id, content, metadata, options, vector_id, &embedding.model)
            .await
        {
            Ok(version) => version,
            Err(e) => {
                self.compensate_vector(doc_id).await;
                return Err(e);
            }
        };

        Ok((vector_id, Some(version)))
    }

    async fn persist_metadata(
        &self,
        doc_id: &str,
        content: &str,
        metadata: JsonMap,
        options: &VectorizeOptions,
        vector_id: Uuid,
        model: &str,
    ) -> ApiResult<u64> {
        let mut record = metadata;
        record.insert("doc_id".to_string(), json!(doc_id));
        record.insert("original_text".to_string(), json!(content));
        record.insert("content_preview".to_string(), json!(content_preview(content)));
        record.insert(
            "vectorStatus".to_string(),
            json!(DocumentStatus::Completed.as_str()),
        );
        record.insert("vector_id".to_string(), json!(vector_id.to_string()));
        record.insert("embedding_model".to_string(), json!(model));
        if let Some(tag) = &options.tag {
            record.insert("tag".to_string(), json!(tag));
        }

        let prior = self.metadata_store.get(doc_id).await?;
        let composed = Versioner::compose(record, prior.as_ref())?;
        let version = composed
            .get("version")
            .and_then(|v| v.as_u64())
            .unwrap_or(1);

        self.metadata_store.set(doc_id, composed).await?;
        Ok(version)
    }

    /// Delete any vector point carrying this doc_id. Used for both
    /// compensation and explicit deletes; a failure here leaves an
    /// orphan, which is logged for async reconciliation.
    async fn compensate_vector(&self, doc_id: &str) {
        let filter = PayloadFilter::new().eq("doc_id", doc_id);
        if let Err(e) = self.vector_store.delete_by_filter(&filter).await {
            error!(
                "CRITICAL: failed to roll back vector for doc_id '{}' (point {}): {}; \
                 manual reconciliation required",
                doc_id,
                Self::point_id_for(doc_id),
                e
            );
        } else {
            debug!("Rolled back vector for doc_id '{}'", doc_id);
        }
    }

    /// Best-effort failed-status record; the ingest error already owns
    /// the outcome so store errors here only warn
    async fn record_failure(&self, doc_id: &str, cause: &ApiError) {
        let result: ApiResult<()> = async {
            let prior = self.metadata_store.get(doc_id).await?;

            let mut record = JsonMap::new();
            record.insert("doc_id".to_string(), json!(doc_id));
            record.insert(
                "vectorStatus".to_string(),
                json!(DocumentStatus::Failed.as_str()),
            );
            record.insert("error".to_string(), json!(cause.to_string()));

            let composed = Versioner::compose(record, prior.as_ref())?;
            self.metadata_store.set(doc_id, composed).await
        }
        .await;

        if let Err(e) = result {
            warn!(
                "Could not record failed status for doc_id '{}': {}",
                doc_id, e
            );
        }
    }

    fn failure_outcome(doc_id: &str, error: &ApiError, start: Instant) -> VectorizeOutcome {
        let latency_ms = start.elapsed().as_millis() as u64;
        warn!("Vectorization failed for doc_id '{}': {}", doc_id, error);
        VectorizeOutcome {
            status: "failed".to_string(),
            doc_id: doc_id.to_string(),
            vector_id: None,
            version: None,
            error: Some(error.to_string()),
            latency_ms,
            performance_target_met: latency_ms <= LATENCY_TARGET_MS,
        }
    }

    /// Vectorize a batch with bounded fan-out and an overall deadline.
    /// Invalid entries fail individually without aborting the batch.
    pub async fn batch_vectorize(
        &self,
        documents: &[DocumentInput],
        options: &VectorizeOptions,
    ) -> ApiResult<BatchVectorizeResult> {
        if documents.is_empty() {
            return Err(ApiError::InvalidInput(
                "batch must contain at least one document".to_string(),
            ));
        }

        // Per-document timeouts already bound each flow; the batch
        // deadline covers queueing behind the concurrency cap as well.
        let batch_deadline = self.timeout * 2;
        let deadline = tokio::time::sleep(batch_deadline);
        tokio::pin!(deadline);

        let mut outcomes: Vec<Option<VectorizeOutcome>> = vec![None; documents.len()];
        let mut in_flight = stream::iter(documents.iter().enumerate().map(|(index, doc)| {
            let doc = doc.clone();
            async move {
                let outcome = self
                    .vectorize(&doc.doc_id, &doc.content, doc.metadata.clone(), options)
                    .await;
                (index, outcome)
            }
        }))
        .buffer_unordered(BATCH_CONCURRENCY);

        loop {
            tokio::select! {
                next = in_flight.next() => match next {
                    Some((index, outcome)) => outcomes[index] = Some(outcome),
                    None => break,
                },
                _ = &mut deadline => {
                    warn!("Batch deadline crossed with work outstanding");
                    break;
                }
            }
        }
        drop(in_flight);

        let results: Vec<VectorizeOutcome> = outcomes
            .into_iter()
            .enumerate()
            .map(|(index, outcome)| {
                outcome.unwrap_or_else(|| {
                    Self::failure_outcome(&documents[index].doc_id, &ApiError::Timeout, Instant::now())
                })
            })
            .collect();

        let successful = results.iter().filter(|r| r.is_success()).count();
        let failed = results.len() - successful;
        let status = if failed == 0 {
            "success"
        } else if successful == 0 {
            "failed"
        } else {
            "partial_success"
        };

        info!(
            "Batch vectorization finished: {}/{} successful",
            successful,
            results.len()
        );

        Ok(BatchVectorizeResult {
            status: status.to_string(),
            total: results.len(),
            successful,
            failed,
            results,
        })
    }

    /// Explicit delete: vector point first, then the metadata record
    pub async fn delete_document(&self, doc_id: &str) -> ApiResult<()> {
        let filter = PayloadFilter::new().eq("doc_id", doc_id);
        self.vector_store.delete_by_filter(&filter).await?;
        self.metadata_store.delete(doc_id).await?;
        info!("Deleted document '{}'", doc_id);
        Ok(())
    }
}
