use crate::chunking::chunk_id;
use crate::config::DistanceMetric;
use crate::traits::VectorIndex;
use crate::{Chunk, DocumentRef, DocumentScope, PipelineError, VectorRow};
use async_trait::async_trait;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredChunk {
    row: VectorRow,
    vector: Vec<f32>,
}

/// Exact nearest-neighbour index kept in process memory.
pub struct InMemoryVectorIndex {
    metric: DistanceMetric,
    vector_size: usize,
    rows: RwLock<Vec<StoredChunk>>,
}

impl InMemoryVectorIndex {
    pub fn new(metric: DistanceMetric, vector_size: usize) -> Self {
        Self {
            metric,
            vector_size,
            rows: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), PipelineError> {
        if vector.len() != self.vector_size {
            return Err(PipelineError::Request(format!(
                "vector dimension {} != {}",
                vector.len(),
                self.vector_size
            )));
        }
        Ok(())
    }
}

pub fn euclidean_distance(left: &[f32], right: &[f32]) -> f64 {
    left.iter()
        .zip(right)
        .map(|(a, b)| {
            let delta = f64::from(*a) - f64::from(*b);
            delta * delta
        })
        .sum::<f64>()
        .sqrt()
}

pub fn cosine_distance(left: &[f32], right: &[f32]) -> f64 {
    let mut dot = 0f64;
    let mut left_norm = 0f64;
    let mut right_norm = 0f64;
    for (a, b) in left.iter().zip(right) {
        let (a, b) = (f64::from(*a), f64::from(*b));
        dot += a * b;
        left_norm += a * a;
        right_norm += b * b;
    }

    if left_norm == 0.0 || right_norm == 0.0 {
        return 1.0;
    }
    1.0 - dot / (left_norm.sqrt() * right_norm.sqrt())
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn replace_document(
        &self,
        document: &DocumentRef,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), PipelineError> {
        if chunks.len() != embeddings.len() {
            return Err(PipelineError::CountMismatch {
                expected: chunks.len(),
                actual: embeddings.len(),
            });
        }

        let mut fresh = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            self.check_dimensions(embedding)?;
            fresh.push(StoredChunk {
                row: VectorRow {
                    chunk_id: chunk_id(&document.document_id, chunk.chunk_index),
                    document_id: document.document_id.clone(),
                    file_name: document.file_name.clone(),
                    chunk_index: chunk.chunk_index,
                    content: chunk.content.clone(),
                    distance: 0.0,
                },
                vector: embedding.clone(),
            });
        }

        let mut rows = self.rows.write().await;
        rows.retain(|stored| stored.row.document_id != document.document_id);
        rows.extend(fresh);
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), PipelineError> {
        self.rows
            .write()
            .await
            .retain(|stored| stored.row.document_id != document_id);
        Ok(())
    }

    async fn query_nearest(
        &self,
        query_vector: &[f32],
        top_k: usize,
        scope: &DocumentScope,
    ) -> Result<Vec<VectorRow>, PipelineError> {
        self.check_dimensions(query_vector)?;

        let rows = self.rows.read().await;
        let mut hits = rows
            .iter()
            .filter(|stored| scope.contains(&stored.row.document_id))
            .map(|stored| {
                let distance = match self.metric {
                    DistanceMetric::Euclid => euclidean_distance(query_vector, &stored.vector),
                    DistanceMetric::Cosine => cosine_distance(query_vector, &stored.vector),
                };
                VectorRow {
                    distance,
                    ..stored.row.clone()
                }
            })
            .collect::<Vec<_>>();

        hits.sort_by(|left, right| left.distance.total_cmp(&right.distance));
        hits.truncate(top_k);
        Ok(hits)
    }
}
