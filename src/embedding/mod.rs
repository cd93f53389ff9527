/// Embedding provider module
///
/// Defines the `Embedder` seam used by the vectorization and retrieval
/// pipelines, plus the HTTP client for OpenAI-style providers. All calls
/// are paced through the shared `Pacer` and retried on transient
/// failures.

mod openai_client;

#[cfg(test)]
mod tests;

pub use openai_client::OpenAiEmbedder;

use crate::error::ApiResult;
use async_trait::async_trait;

/// One embedding result
#[derive(Debug, Clone)]
pub struct Embedding {
    /// Fixed-dimension float vector
    pub vector: Vec<f32>,
    /// Token count reported by the provider
    pub token_count: u64,
    /// Model that produced the vector
    pub model: String,
}

/// Interface to the external embedding provider
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for one text
    async fn embed(&self, text: &str) -> ApiResult<Embedding>;

    /// Generate embeddings for several texts. The default fans out to
    /// `embed` so the per-client pacing is preserved.
    async fn embed_batch(&self, texts: &[String]) -> ApiResult<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Generate up to `max_tags` lowercase tags describing `content`,
    /// optionally steered by a short context string
    async fn generate_tags(
        &self,
        content: &str,
        context: &str,
        max_tags: usize,
    ) -> ApiResult<Vec<String>>;

    /// Embedding dimension this provider is configured for
    fn dimension(&self) -> usize;

    /// Whether the provider currently responds
    async fn health_check(&self) -> bool;
}

/// Collapse newline sequences to spaces before sending text upstream
pub(crate) fn normalize_text(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

/// Parse a comma-separated tag list: trimmed, lowercased, empties
/// dropped, truncated to `max_tags`
pub(crate) fn parse_tag_list(raw: &str, max_tags: usize) -> Vec<String> {
    raw.split(',')
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .take(max_tags)
        .collect()
}
