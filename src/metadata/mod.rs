/// Document store module
///
/// Defines the `MetadataStore` seam for the external document store plus
/// the pure metadata versioner applied on every write. The HTTP client
/// keeps read cost down with projection-based existence checks; the
/// in-memory implementation substitutes for it in tests and local
/// development.

mod http_client;
mod memory;
pub mod tree;
pub mod versioner;

#[cfg(test)]
mod tests;

pub use http_client::HttpDocumentStore;
pub use memory::InMemoryMetadataStore;
pub use tree::{CollectionStatistics, TreeNode};
pub use versioner::Versioner;

use crate::error::ApiResult;
use crate::types::JsonMap;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Maximum operations per batch commit accepted by the document store
pub const BATCH_OP_LIMIT: usize = 500;

/// Interface to the external document store. One handle is scoped to one
/// collection.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Fetch a record, `None` when absent
    async fn get(&self, doc_id: &str) -> ApiResult<Option<JsonMap>>;

    /// Create or replace a record
    async fn set(&self, doc_id: &str, record: JsonMap) -> ApiResult<()>;

    /// Fetch many records. Implementations check existence first with a
    /// projection query and fetch only the IDs that exist.
    async fn batch_get(&self, doc_ids: &[String]) -> ApiResult<HashMap<String, JsonMap>>;

    /// Write many records in batch commits of at most [`BATCH_OP_LIMIT`]
    async fn batch_set(&self, records: HashMap<String, JsonMap>) -> ApiResult<()>;

    /// Delete a record; deleting an absent record is not an error
    async fn delete(&self, doc_id: &str) -> ApiResult<()>;

    /// Delete many records in batch commits
    async fn batch_delete(&self, doc_ids: &[String]) -> ApiResult<()>;

    /// Existence check fetching only the identifier
    async fn exists(&self, doc_id: &str) -> ApiResult<bool>;

    /// Batched existence check fetching only identifiers
    async fn batch_exists(&self, doc_ids: &[String]) -> ApiResult<HashMap<String, bool>>;

    /// Equality query over indexed fields with an optional field
    /// projection
    async fn query(
        &self,
        filter: &[(String, Value)],
        projection: Option<&[String]>,
    ) -> ApiResult<Vec<JsonMap>>;

    /// Whether the store currently responds
    async fn health_check(&self) -> bool;
}
