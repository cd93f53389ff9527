use super::{
    sort_scored_points, FieldMatch, MatchValue, PayloadFilter, ScoredPoint, VectorStore,
};
use crate::config::VectorConfig;
use crate::error::{ApiError, ApiResult};
use crate::retry::RetryExecutor;
use crate::types::JsonMap;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// HTTP client for Qdrant-style similarity engines
pub struct QdrantHttpStore {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
    dimension: usize,
    retry: RetryExecutor,
}

impl QdrantHttpStore {
    pub fn new(config: &VectorConfig) -> Self {
        QdrantHttpStore {
            http: reqwest::Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            collection: config.collection.clone(),
            dimension: config.dimension,
            retry: RetryExecutor::with_defaults(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            builder = builder.header("api-key", key);
        }
        builder
    }

    /// Send a JSON request and surface engine failures as
    /// `VectorStoreUnavailable` so the retry primitive can classify them.
    async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&Value>,
    ) -> ApiResult<Value> {
        let mut builder = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::VectorStoreUnavailable(format!("connection error: {}", e)))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        match status.as_u16() {
            200..=299 => serde_json::from_str(&text).map_err(|e| {
                ApiError::VectorStoreUnavailable(format!("malformed response: {}", e))
            }),
            404 => Err(ApiError::NotFound(format!(
                "similarity engine path {} not found",
                path
            ))),
            429 => Err(ApiError::VectorStoreUnavailable(format!(
                "rate limit (HTTP 429): {}",
                text
            ))),
            400..=499 => Err(ApiError::Internal(format!(
                "similarity engine rejected request (HTTP {}): {}",
                status.as_u16(),
                text
            ))),
            _ => Err(ApiError::VectorStoreUnavailable(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text
            ))),
        }
    }

    /// Serialize the filter into the engine's wire format
    pub(super) fn filter_json(filter: &PayloadFilter) -> Value {
        let must: Vec<Value> = filter
            .must
            .iter()
            .map(|FieldMatch { key, value }| match value {
                MatchValue::Eq(v) => json!({"key": key, "match": {"value": v}}),
                MatchValue::In(vs) => json!({"key": key, "match": {"any": vs}}),
            })
            .collect();
        json!({ "must": must })
    }

    fn parse_points(result: &Value) -> Vec<ScoredPoint> {
        let points = result
            .as_array()
            .cloned()
            .or_else(|| {
                result
                    .get("points")
                    .and_then(|p| p.as_array())
                    .cloned()
            })
            .unwrap_or_default();

        points
            .iter()
            .filter_map(|point| {
                let id = point.get("id")?.as_str()?.parse().ok()?;
                let score = point
                    .get("score")
                    .and_then(|s| s.as_f64())
                    .unwrap_or(1.0) as f32;
                let payload = point
                    .get("payload")
                    .and_then(|p| p.as_object())
                    .cloned()
                    .unwrap_or_default();
                Some(ScoredPoint { id, score, payload })
            })
            .collect()
    }
}

#[async_trait]
impl VectorStore for QdrantHttpStore {
    async fn ensure_collection(&self) -> ApiResult<()> {
        let path = format!("/collections/{}", self.collection);

        let exists = self
            .retry
            .execute(|| async {
                match self.send(reqwest::Method::GET, &path, None).await {
                    Ok(_) => Ok(true),
                    Err(ApiError::NotFound(_)) => Ok(false),
                    Err(e) => Err(e),
                }
            })
            .await?;

        if !exists {
            let body = json!({
                "vectors": {"size": self.dimension, "distance": "Cosine"}
            });
            self.retry
                .execute(|| self.send(reqwest::Method::PUT, &path, Some(&body)))
                .await?;
            info!("Created collection: {}", self.collection);
        }

        // Keyword index on the tag payload field; an already-existing
        // index is not an error.
        let index_body = json!({"field_name": "tag", "field_schema": "keyword"});
        let index_path = format!("/collections/{}/index", self.collection);
        if let Err(e) = self
            .send(reqwest::Method::PUT, &index_path, Some(&index_body))
            .await
        {
            if matches!(e, ApiError::VectorStoreUnavailable(_)) {
                return Err(e);
            }
            debug!("Tag index already present or rejected: {}", e);
        }

        Ok(())
    }

    async fn upsert(
        &self,
        id: Option<Uuid>,
        vector: Vec<f32>,
        payload: JsonMap,
    ) -> ApiResult<Uuid> {
        let point_id = id.unwrap_or_else(Uuid::new_v4);
        let path = format!("/collections/{}/points", self.collection);
        let body = json!({
            "points": [{
                "id": point_id.to_string(),
                "vector": vector,
                "payload": payload,
            }]
        });

        self.retry
            .execute(|| self.send(reqwest::Method::PUT, &path, Some(&body)))
            .await?;

        Ok(point_id)
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        score_min: f32,
        filter: Option<&PayloadFilter>,
    ) -> ApiResult<Vec<ScoredPoint>> {
        let path = format!("/collections/{}/points/search", self.collection);
        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "score_threshold": score_min,
            "with_payload": true,
        });
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            body["filter"] = Self::filter_json(filter);
        }

        let response = self
            .retry
            .execute(|| self.send(reqwest::Method::POST, &path, Some(&body)))
            .await?;

        let mut points = Self::parse_points(response.get("result").unwrap_or(&Value::Null));
        sort_scored_points(&mut points);
        Ok(points)
    }

    async fn scroll(
        &self,
        filter: Option<&PayloadFilter>,
        limit: usize,
        offset: usize,
    ) -> ApiResult<Vec<ScoredPoint>> {
        let path = format!("/collections/{}/points/scroll", self.collection);
        let mut body = json!({
            "limit": limit,
            "offset": offset,
            "with_payload": true,
        });
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            body["filter"] = Self::filter_json(filter);
        }

        let response = self
            .retry
            .execute(|| self.send(reqwest::Method::POST, &path, Some(&body)))
            .await?;

        let mut points = Self::parse_points(response.get("result").unwrap_or(&Value::Null));
        for point in &mut points {
            point.score = 1.0;
        }
        Ok(points)
    }

    async fn delete_by_filter(&self, filter: &PayloadFilter) -> ApiResult<()> {
        let path = format!("/collections/{}/points/delete", self.collection);
        let body = json!({ "filter": Self::filter_json(filter) });

        self.retry
            .execute(|| self.send(reqwest::Method::POST, &path, Some(&body)))
            .await?;

        Ok(())
    }

    async fn count(&self) -> ApiResult<u64> {
        let path = format!("/collections/{}/points/count", self.collection);
        let body = json!({"exact": true});

        let response = self
            .retry
            .execute(|| self.send(reqwest::Method::POST, &path, Some(&body)))
            .await?;

        Ok(response
            .pointer("/result/count")
            .and_then(|c| c.as_u64())
            .unwrap_or(0))
    }

    async fn health_check(&self) -> bool {
        match self.send(reqwest::Method::GET, "/collections", None).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Similarity engine health check failed: {}", e);
                false
            }
        }
    }
}
