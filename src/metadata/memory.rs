use super::MetadataStore;
use crate::error::ApiResult;
use crate::types::JsonMap;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory document store. Substitutes for the HTTP client in tests
/// and local development.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    docs: RwLock<HashMap<String, JsonMap>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.docs.read().expect("metadata lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get(&self, doc_id: &str) -> ApiResult<Option<JsonMap>> {
        Ok(self
            .docs
            .read()
            .expect("metadata lock poisoned")
            .get(doc_id)
            .cloned())
    }

    async fn set(&self, doc_id: &str, record: JsonMap) -> ApiResult<()> {
        self.docs
            .write()
            .expect("metadata lock poisoned")
            .insert(doc_id.to_string(), record);
        Ok(())
    }

    async fn batch_get(&self, doc_ids: &[String]) -> ApiResult<HashMap<String, JsonMap>> {
        // Mirror the HTTP client's shape: existence first, then fetch
        let existence = self.batch_exists(doc_ids).await?;
        let docs = self.docs.read().expect("metadata lock poisoned");

        Ok(doc_ids
            .iter()
            .filter(|id| existence.get(*id).copied().unwrap_or(false))
            .filter_map(|id| docs.get(id).map(|record| (id.clone(), record.clone())))
            .collect())
    }

    async fn batch_set(&self, records: HashMap<String, JsonMap>) -> ApiResult<()> {
        let mut docs = self.docs.write().expect("metadata lock poisoned");
        for (doc_id, record) in records {
            docs.insert(doc_id, record);
        }
        Ok(())
    }

    async fn delete(&self, doc_id: &str) -> ApiResult<()> {
        self.docs
            .write()
            .expect("metadata lock poisoned")
            .remove(doc_id);
        Ok(())
    }

    async fn batch_delete(&self, doc_ids: &[String]) -> ApiResult<()> {
        let mut docs = self.docs.write().expect("metadata lock poisoned");
        for doc_id in doc_ids {
            docs.remove(doc_id);
        }
        Ok(())
    }

    async fn exists(&self, doc_id: &str) -> ApiResult<bool> {
        Ok(self
            .docs
            .read()
            .expect("metadata lock poisoned")
            .contains_key(doc_id))
    }

    async fn batch_exists(&self, doc_ids: &[String]) -> ApiResult<HashMap<String, bool>> {
        let docs = self.docs.read().expect("metadata lock poisoned");
        Ok(doc_ids
            .iter()
            .map(|id| (id.clone(), docs.contains_key(id)))
            .collect())
    }

    async fn query(
        &self,
        filter: &[(String, Value)],
        projection: Option<&[String]>,
    ) -> ApiResult<Vec<JsonMap>> {
        let docs = self.docs.read().expect("metadata lock poisoned");

        Ok(docs
            .values()
            .filter(|record| {
                filter
                    .iter()
                    .all(|(field, value)| record.get(field) == Some(value))
            })
            .map(|record| match projection {
                Some(fields) => fields
                    .iter()
                    .filter_map(|field| {
                        record
                            .get(field)
                            .map(|value| (field.clone(), value.clone()))
                    })
                    .collect(),
                None => record.clone(),
            })
            .collect())
    }

    async fn health_check(&self) -> bool {
        true
    }
}
