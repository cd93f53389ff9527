use super::{normalize_text, parse_tag_list, Embedder, Embedding};
use crate::config::EmbeddingConfig;
use crate::error::{ApiError, ApiResult, ErrorClass};
use crate::retry::{Pacer, RetryExecutor};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP client for OpenAI-style embedding providers
pub struct OpenAiEmbedder {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    tag_model: String,
    dimension: usize,
    pacer: Pacer,
    retry: RetryExecutor,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    input: Vec<&'a str>,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
    #[serde(default)]
    usage: Usage,
    #[serde(default)]
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiEmbedder {
    /// Create a client from configuration. `min_interval` seeds the
    /// adaptive pacer baseline.
    pub fn new(config: &EmbeddingConfig, dimension: usize, min_interval: Duration) -> Self {
        OpenAiEmbedder {
            http: reqwest::Client::new(),
            base_url: config.provider_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            tag_model: config.tag_model.clone(),
            dimension,
            pacer: Pacer::new(min_interval),
            retry: RetryExecutor::with_defaults(),
        }
    }

    /// Map an upstream response status to an error kind. Rate-limit and
    /// 5xx responses are transient; authentication problems are
    /// configuration errors and must not be retried.
    pub(super) fn classify_status(status: reqwest::StatusCode, body: &str) -> ApiError {
        match status.as_u16() {
            429 => ApiError::EmbeddingUnavailable(format!("rate limit (HTTP 429): {}", body)),
            401 | 403 => ApiError::Config(format!(
                "embedding provider authentication failed (HTTP {})",
                status.as_u16()
            )),
            400..=499 => ApiError::InvalidInput(format!(
                "embedding provider rejected request (HTTP {}): {}",
                status.as_u16(),
                body
            )),
            _ => ApiError::EmbeddingUnavailable(format!("HTTP {}: {}", status.as_u16(), body)),
        }
    }

    async fn embed_once(&self, text: &str) -> ApiResult<Embedding> {
        self.pacer.pause().await;

        let request = EmbedRequest {
            input: vec![text],
            model: &self.model,
        };

        let response = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::EmbeddingUnavailable(format!("connection error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &body));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| ApiError::EmbeddingUnavailable(format!("malformed response: {}", e)))?;

        let data = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::EmbeddingUnavailable("empty embedding data".to_string()))?;

        if data.embedding.len() != self.dimension {
            return Err(ApiError::Internal(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                data.embedding.len()
            )));
        }

        Ok(Embedding {
            vector: data.embedding,
            token_count: parsed.usage.total_tokens,
            model: if parsed.model.is_empty() {
                self.model.clone()
            } else {
                parsed.model
            },
        })
    }

    pub(super) fn tag_prompt(content: &str, context: &str, max_tags: usize) -> String {
        // Bound the content sent upstream to the first 2 KB
        let mut budget = content.len().min(2048);
        while !content.is_char_boundary(budget) {
            budget -= 1;
        }
        let excerpt = &content[..budget];

        format!(
            "Analyze the following document content and generate {max_tags} relevant, \
             specific tags that best describe the content, topics, and themes.\n\n\
             Tags should be:\n\
             - Specific and descriptive (not generic)\n\
             - Relevant to the main topics and themes\n\
             - Useful for categorization and search\n\
             - Single words or short phrases (2-3 words max)\n\
             - Lowercase\n\n\
             Document content:\n{excerpt}...{context}\n\n\
             Generate exactly {max_tags} tags as a comma-separated list:"
        )
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> ApiResult<Embedding> {
        let normalized = normalize_text(text);

        let result = self
            .retry
            .execute_observed(
                || self.embed_once(&normalized),
                |err| {
                    if err.class() == ErrorClass::RateLimit {
                        self.pacer.penalize();
                    }
                },
            )
            .await;

        if result.is_ok() {
            self.pacer.reward();
        }

        result
    }

    async fn generate_tags(
        &self,
        content: &str,
        context: &str,
        max_tags: usize,
    ) -> ApiResult<Vec<String>> {
        let prompt = Self::tag_prompt(content, context, max_tags);

        let body = json!({
            "model": self.tag_model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are an expert document analyzer that generates precise, \
                                relevant tags for content categorization and search.",
                },
                {"role": "user", "content": prompt},
            ],
            "max_tokens": 100,
            "temperature": 0.3,
        });

        let call = || async {
            self.pacer.pause().await;

            let response = self
                .http
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| ApiError::EmbeddingUnavailable(format!("connection error: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(Self::classify_status(status, &text));
            }

            response
                .json::<ChatResponse>()
                .await
                .map_err(|e| ApiError::EmbeddingUnavailable(format!("malformed response: {}", e)))
        };

        let parsed = self
            .retry
            .execute_observed(call, |err| {
                if err.class() == ErrorClass::RateLimit {
                    self.pacer.penalize();
                }
            })
            .await?;

        let raw = parsed
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .unwrap_or_default();

        let tags = parse_tag_list(raw, max_tags);
        if tags.is_empty() {
            warn!("Tag generation returned no usable tags");
        } else {
            debug!("Generated {} tags", tags.len());
        }

        self.pacer.reward();
        Ok(tags)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn health_check(&self) -> bool {
        let response = self
            .http
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await;

        matches!(response, Ok(r) if r.status().is_success())
    }
}
