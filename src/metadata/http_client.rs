use super::{MetadataStore, BATCH_OP_LIMIT};
use crate::config::MetadataConfig;
use crate::error::{ApiError, ApiResult};
use crate::retry::RetryExecutor;
use crate::types::JsonMap;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

/// HTTP client for the external document store. One instance is scoped
/// to a single collection; paths embed the project and database IDs.
///
/// Existence checks go through projection queries that select only the
/// document identifier, which keeps the read-unit cost of `batch_get`
/// proportional to the documents that actually exist.
pub struct HttpDocumentStore {
    http: reqwest::Client,
    base_url: String,
    collection: String,
    retry: RetryExecutor,
}

impl HttpDocumentStore {
    /// Create a handle scoped to `collection`
    pub fn new(config: &MetadataConfig, collection: &str) -> Self {
        let base_url = format!(
            "{}/v1/projects/{}/databases/{}",
            config.backend_url.trim_end_matches('/'),
            config.project_id,
            config.database_id,
        );

        HttpDocumentStore {
            http: reqwest::Client::new(),
            base_url,
            collection: collection.to_string(),
            retry: RetryExecutor::with_defaults(),
        }
    }

    fn doc_url(&self, doc_id: &str) -> String {
        format!("{}/collections/{}/docs/{}", self.base_url, self.collection, doc_id)
    }

    fn op_url(&self, op: &str) -> String {
        format!("{}/collections/{}/docs:{}", self.base_url, self.collection, op)
    }

    async fn send(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&Value>,
    ) -> ApiResult<Option<Value>> {
        let mut builder = self.http.request(method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            ApiError::MetadataStoreUnavailable(format!("connection error: {}", e))
        })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        match status.as_u16() {
            200..=299 => {
                if text.is_empty() {
                    Ok(None)
                } else {
                    serde_json::from_str(&text).map(Some).map_err(|e| {
                        ApiError::MetadataStoreUnavailable(format!("malformed response: {}", e))
                    })
                }
            }
            404 => Ok(None),
            429 => Err(ApiError::MetadataStoreUnavailable(format!(
                "rate limit (HTTP 429): {}",
                text
            ))),
            400..=499 => Err(ApiError::Internal(format!(
                "document store rejected request (HTTP {}): {}",
                status.as_u16(),
                text
            ))),
            _ => Err(ApiError::MetadataStoreUnavailable(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text
            ))),
        }
    }

    /// Projection query returning the IDs (out of `doc_ids`) that exist
    async fn existing_ids(&self, doc_ids: &[String]) -> ApiResult<Vec<String>> {
        let body = json!({
            "select": ["__name__"],
            "where": {"field": "__name__", "op": "in", "value": doc_ids},
        });

        let url = self.op_url("query");
        let response = self
            .retry
            .execute(|| self.send(reqwest::Method::POST, &url, Some(&body)))
            .await?;

        let ids = response
            .as_ref()
            .and_then(|r| r.get("docs"))
            .and_then(|d| d.as_array())
            .map(|docs| {
                docs.iter()
                    .filter_map(|doc| doc.get("__name__").and_then(|n| n.as_str()))
                    .map(|id| id.to_string())
                    .collect()
            })
            .unwrap_or_default();

        Ok(ids)
    }
}

#[async_trait]
impl MetadataStore for HttpDocumentStore {
    async fn get(&self, doc_id: &str) -> ApiResult<Option<JsonMap>> {
        let url = self.doc_url(doc_id);
        let response = self
            .retry
            .execute(|| self.send(reqwest::Method::GET, &url, None))
            .await?;

        Ok(response.and_then(|value| value.as_object().cloned()))
    }

    async fn set(&self, doc_id: &str, record: JsonMap) -> ApiResult<()> {
        let url = self.doc_url(doc_id);
        let body = Value::Object(record);
        self.retry
            .execute(|| self.send(reqwest::Method::PUT, &url, Some(&body)))
            .await?;
        debug!("Saved metadata record for doc_id '{}'", doc_id);
        Ok(())
    }

    async fn batch_get(&self, doc_ids: &[String]) -> ApiResult<HashMap<String, JsonMap>> {
        if doc_ids.is_empty() {
            return Ok(HashMap::new());
        }

        // Existence first: the projection query is far cheaper than
        // fetching documents that are not there.
        let existing = self.existing_ids(doc_ids).await?;
        if existing.is_empty() {
            return Ok(HashMap::new());
        }

        let url = self.op_url("batchGet");
        let body = json!({ "ids": existing });
        let response = self
            .retry
            .execute(|| self.send(reqwest::Method::POST, &url, Some(&body)))
            .await?;

        let mut records = HashMap::new();
        if let Some(docs) = response
            .as_ref()
            .and_then(|r| r.get("docs"))
            .and_then(|d| d.as_object())
        {
            for (doc_id, record) in docs {
                if let Some(record) = record.as_object() {
                    records.insert(doc_id.clone(), record.clone());
                }
            }
        }

        Ok(records)
    }

    async fn batch_set(&self, records: HashMap<String, JsonMap>) -> ApiResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let url = self.op_url("batchWrite");
        let entries: Vec<(String, JsonMap)> = records.into_iter().collect();
        for chunk in entries.chunks(BATCH_OP_LIMIT) {
            let set: serde_json::Map<String, Value> = chunk
                .iter()
                .map(|(doc_id, record)| (doc_id.clone(), Value::Object(record.clone())))
                .collect();
            let body = json!({ "set": set });

            self.retry
                .execute(|| self.send(reqwest::Method::POST, &url, Some(&body)))
                .await?;
        }

        Ok(())
    }

    async fn delete(&self, doc_id: &str) -> ApiResult<()> {
        let url = self.doc_url(doc_id);
        self.retry
            .execute(|| self.send(reqwest::Method::DELETE, &url, None))
            .await?;
        Ok(())
    }

    async fn batch_delete(&self, doc_ids: &[String]) -> ApiResult<()> {
        let url = self.op_url("batchWrite");
        for chunk in doc_ids.chunks(BATCH_OP_LIMIT) {
            let body = json!({ "delete": chunk });
            self.retry
                .execute(|| self.send(reqwest::Method::POST, &url, Some(&body)))
                .await?;
        }
        Ok(())
    }

    async fn exists(&self, doc_id: &str) -> ApiResult<bool> {
        let ids = self.existing_ids(&[doc_id.to_string()]).await?;
        Ok(!ids.is_empty())
    }

    async fn batch_exists(&self, doc_ids: &[String]) -> ApiResult<HashMap<String, bool>> {
        if doc_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let existing = self.existing_ids(doc_ids).await?;
        let existing: std::collections::HashSet<&str> =
            existing.iter().map(|id| id.as_str()).collect();

        Ok(doc_ids
            .iter()
            .map(|id| (id.clone(), existing.contains(id.as_str())))
            .collect())
    }

    async fn query(
        &self,
        filter: &[(String, Value)],
        projection: Option<&[String]>,
    ) -> ApiResult<Vec<JsonMap>> {
        let conditions: Vec<Value> = filter
            .iter()
            .map(|(field, value)| json!({"field": field, "op": "==", "value": value}))
            .collect();

        let mut body = json!({ "where": {"and": conditions} });
        if let Some(fields) = projection {
            body["select"] = json!(fields);
        }

        let url = self.op_url("query");
        let response = self
            .retry
            .execute(|| self.send(reqwest::Method::POST, &url, Some(&body)))
            .await?;

        Ok(response
            .as_ref()
            .and_then(|r| r.get("docs"))
            .and_then(|d| d.as_array())
            .map(|docs| {
                docs.iter()
                    .filter_map(|doc| doc.as_object().cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/collections/{}", self.base_url, self.collection);
        match self.send(reqwest::Method::GET, &url, None).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Document store health check failed: {}", e);
                false
            }
        }
    }
}
