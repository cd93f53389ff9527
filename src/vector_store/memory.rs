use super::{sort_scored_points, PayloadFilter, ScoredPoint, VectorStore};
use crate::error::{ApiError, ApiResult};
use crate::types::JsonMap;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// In-memory similarity store backed by brute-force cosine scoring.
/// Substitutes for the HTTP engine in tests and local development.
pub struct InMemoryVectorStore {
    dimension: usize,
    points: RwLock<HashMap<Uuid, (Vec<f32>, JsonMap)>>,
}

impl InMemoryVectorStore {
    pub fn new(dimension: usize) -> Self {
        InMemoryVectorStore {
            dimension,
            points: RwLock::new(HashMap::new()),
        }
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(&self) -> ApiResult<()> {
        Ok(())
    }

    async fn upsert(
        &self,
        id: Option<Uuid>,
        vector: Vec<f32>,
        payload: JsonMap,
    ) -> ApiResult<Uuid> {
        if vector.len() != self.dimension {
            return Err(ApiError::Internal(format!(
                "vector dimension mismatch: expected {}, got {}",
                self.dimension,
                vector.len()
            )));
        }

        let point_id = id.unwrap_or_else(Uuid::new_v4);
        self.points
            .write()
            .expect("vector store lock poisoned")
            .insert(point_id, (vector, payload));
        Ok(point_id)
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        score_min: f32,
        filter: Option<&PayloadFilter>,
    ) -> ApiResult<Vec<ScoredPoint>> {
        let points = self.points.read().expect("vector store lock poisoned");

        let mut hits: Vec<ScoredPoint> = points
            .iter()
            .filter(|(_, (_, payload))| filter.map_or(true, |f| f.matches(payload)))
            .map(|(id, (stored, payload))| ScoredPoint {
                id: *id,
                score: Self::cosine_similarity(vector, stored),
                payload: payload.clone(),
            })
            .filter(|hit| hit.score >= score_min)
            .collect();

        sort_scored_points(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }

    async fn scroll(
        &self,
        filter: Option<&PayloadFilter>,
        limit: usize,
        offset: usize,
    ) -> ApiResult<Vec<ScoredPoint>> {
        let points = self.points.read().expect("vector store lock poisoned");

        let mut hits: Vec<ScoredPoint> = points
            .iter()
            .filter(|(_, (_, payload))| filter.map_or(true, |f| f.matches(payload)))
            .map(|(id, (_, payload))| ScoredPoint {
                id: *id,
                score: 1.0,
                payload: payload.clone(),
            })
            .collect();

        // Deterministic paging order
        hits.sort_by_key(|hit| hit.id.to_string());
        Ok(hits.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete_by_filter(&self, filter: &PayloadFilter) -> ApiResult<()> {
        self.points
            .write()
            .expect("vector store lock poisoned")
            .retain(|_, (_, payload)| !filter.matches(payload));
        Ok(())
    }

    async fn count(&self) -> ApiResult<u64> {
        Ok(self.points.read().expect("vector store lock poisoned").len() as u64)
    }

    async fn health_check(&self) -> bool {
        true
    }
}
