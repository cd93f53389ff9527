/// Similarity engine module
///
/// Defines the `VectorStore` seam plus the payload filter model shared by
/// search, scroll and delete operations. Two implementations live here:
/// the HTTP client for Qdrant-style engines and an in-memory store used
/// by tests and local development.

mod memory;
mod qdrant_client;


pub use memory::InMemoryVectorStore;
pub use qdrant_client::QdrantHttpStore;

use crate::error::ApiResult;
use crate::types::JsonMap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Predicate value: exact equality or membership
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchValue {
    /// Payload value equals this value
    Eq(Value),
    /// Payload value equals any of these values
    In(Vec<Value>),
}

/// One field predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMatch {
    pub key: String,
    pub value: MatchValue,
}

/// Conjunction of field predicates over point payloads. For a payload
/// value that is itself a list, a predicate matches when any element
/// does.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadFilter {
    pub must: Vec<FieldMatch>,
}

impl PayloadFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality predicate
    pub fn eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.must.push(FieldMatch {
            key: key.into(),
            value: MatchValue::Eq(value.into()),
        });
        self
    }

    /// Add a membership predicate
    pub fn any(mut self, key: impl Into<String>, values: Vec<Value>) -> Self {
        self.must.push(FieldMatch {
            key: key.into(),
            value: MatchValue::In(values),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
    }

    /// Evaluate the conjunction against a payload
    pub fn matches(&self, payload: &JsonMap) -> bool {
        self.must.iter().all(|predicate| {
            let Some(actual) = payload.get(&predicate.key) else {
                return false;
            };
            match &predicate.value {
                MatchValue::Eq(expected) => value_matches(actual, expected),
                MatchValue::In(options) => {
                    options.iter().any(|expected| value_matches(actual, expected))
                }
            }
        })
    }
}

/// Equality with list-payload semantics: a list value matches when any
/// element equals the predicate value.
fn value_matches(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::Array(elements) => elements.iter().any(|element| element == expected),
        other => other == expected,
    }
}

/// A scored point returned by search or scroll
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: Uuid,
    pub score: f32,
    pub payload: JsonMap,
}

/// Interface to the external similarity engine
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Idempotently create the collection and its `tag` keyword index
    async fn ensure_collection(&self) -> ApiResult<()>;

    /// Upsert one point; a fresh UUID is assigned when `id` is None
    async fn upsert(&self, id: Option<Uuid>, vector: Vec<f32>, payload: JsonMap)
        -> ApiResult<Uuid>;

    /// Similarity search, sorted by score descending with ties broken by
    /// point id
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        score_min: f32,
        filter: Option<&PayloadFilter>,
    ) -> ApiResult<Vec<ScoredPoint>>;

    /// Filter-only retrieval; scores are reported as 1.0
    async fn scroll(
        &self,
        filter: Option<&PayloadFilter>,
        limit: usize,
        offset: usize,
    ) -> ApiResult<Vec<ScoredPoint>>;

    /// Bulk delete of every point matching the filter
    async fn delete_by_filter(&self, filter: &PayloadFilter) -> ApiResult<()>;

    /// Total number of stored points
    async fn count(&self) -> ApiResult<u64>;

    /// Whether the engine currently responds
    async fn health_check(&self) -> bool;
}

/// Sort search results by score descending, ties broken by point id so
/// paging is deterministic across calls.
pub(crate) fn sort_scored_points(points: &mut [ScoredPoint]) {
    points.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.to_string().cmp(&b.id.to_string()))
    });
}
