use crate::chunking::chunk_id;
use crate::config::{DistanceMetric, QdrantConfig};
use crate::traits::VectorIndex;
use crate::{Chunk, DocumentRef, DocumentScope, PipelineError, VectorRow};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
    distance: DistanceMetric,
}

impl QdrantStore {
    pub fn new(config: &QdrantConfig) -> Self {
        Self {
            endpoint: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            client: Client::new(),
            vector_size: config.vector_size,
            distance: config.distance,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }

    /// Creates the collection with the configured size and metric unless it exists.
    pub async fn ensure_collection(&self) -> Result<(), PipelineError> {
        let response = self.client.get(self.collection_url()).send().await?;

        if response.status() == StatusCode::OK {
            return Ok(());
        }

        if response.status() != StatusCode::NOT_FOUND {
            return Err(backend_error(response.status().to_string()));
        }

        let distance = match self.distance {
            DistanceMetric::Euclid => "Euclid",
            DistanceMetric::Cosine => "Cosine",
        };

        let response = self
            .client
            .put(self.collection_url())
            .json(&json!({
                "vectors": { "size": self.vector_size, "distance": distance }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status().to_string()));
        }

        Ok(())
    }

    async fn delete_points(&self, filter: Value) -> Result<(), PipelineError> {
        let response = self
            .client
            .post(format!("{}/points/delete?wait=true", self.collection_url()))
            .json(&json!({ "filter": filter }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status().to_string()));
        }

        Ok(())
    }

    /// Qdrant scores Euclid hits by distance and Cosine hits by similarity.
    fn score_to_distance(&self, score: f64) -> f64 {
        match self.distance {
            DistanceMetric::Euclid => score,
            DistanceMetric::Cosine => 1.0 - score,
        }
    }
}

fn backend_error(details: impl Into<String>) -> PipelineError {
    PipelineError::BackendResponse {
        backend: "qdrant".to_string(),
        details: details.into(),
    }
}

/// Point ids must be unsigned integers or UUIDs; derive a UUID from the chunk's hash.
pub fn point_id(document_id: &str, chunk_index: usize) -> Uuid {
    let mut hasher = Sha256::new();
    hasher.update(chunk_id(document_id, chunk_index).as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

fn document_filter(key_values: &[String]) -> Value {
    json!({
        "must": [
            { "key": "document_id", "match": { "any": key_values } }
        ]
    })
}

/// Points of `document_id` left over from a longer previous chunk set.
fn stale_chunks_filter(document_id: &str, chunk_count: usize) -> Value {
    json!({
        "must": [
            { "key": "document_id", "match": { "value": document_id } },
            { "key": "chunk_index", "range": { "gte": chunk_count } }
        ]
    })
}

fn parse_hit(hit: &Value) -> VectorRow {
    let text = |pointer: &str| {
        hit.pointer(pointer)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    VectorRow {
        chunk_id: text("/payload/chunk_id"),
        document_id: text("/payload/document_id"),
        file_name: text("/payload/file_name"),
        chunk_index: hit
            .pointer("/payload/chunk_index")
            .and_then(Value::as_u64)
            .unwrap_or_default() as usize,
        content: text("/payload/content"),
        distance: hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0),
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
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

        let points = chunks
            .iter()
            .zip(embeddings.iter())
            .map(|(chunk, embedding)| {
                if embedding.len() != self.vector_size {
                    return Err(PipelineError::Request(format!(
                        "embedding dimension {} != {}",
                        embedding.len(),
                        self.vector_size
                    )));
                }

                Ok(json!({
                    "id": point_id(&document.document_id, chunk.chunk_index),
                    "vector": embedding,
                    "payload": {
                        "chunk_id": chunk_id(&document.document_id, chunk.chunk_index),
                        "document_id": document.document_id,
                        "file_name": document.file_name,
                        "source_path": document.source_path,
                        "chunk_index": chunk.chunk_index,
                        "start_char": chunk.start_char,
                        "end_char": chunk.end_char,
                        "content": chunk.content,
                    },
                }))
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;

        if points.is_empty() {
            return self.delete_document(&document.document_id).await;
        }

        // Ids are keyed by chunk index: the upsert overwrites in place and only the
        // tail past the new chunk count is removed afterwards.
        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status().to_string()));
        }

        self.delete_points(stale_chunks_filter(&document.document_id, chunks.len()))
            .await
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), PipelineError> {
        self.delete_points(document_filter(&[document_id.to_string()]))
            .await
    }

    async fn query_nearest(
        &self,
        query_vector: &[f32],
        top_k: usize,
        scope: &DocumentScope,
    ) -> Result<Vec<VectorRow>, PipelineError> {
        if query_vector.len() != self.vector_size {
            return Err(PipelineError::Request(format!(
                "query vector dim {} is not {}",
                query_vector.len(),
                self.vector_size
            )));
        }

        let mut body = json!({
            "vector": query_vector,
            "limit": top_k,
            "with_payload": true,
        });
        if !scope.is_unrestricted() {
            body["filter"] = document_filter(&scope.document_ids);
        }

        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status().to_string()));
        }

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .ok_or_else(|| backend_error("search response has no result array"))?;

        Ok(hits
            .iter()
            .map(|hit| {
                let row = parse_hit(hit);
                VectorRow {
                    distance: self.score_to_distance(row.distance),
                    ..row
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_are_deterministic_uuids() {
        assert_eq!(point_id("doc", 3), point_id("doc", 3));
        assert_ne!(point_id("doc", 3), point_id("doc", 4));
    }

    #[test]
    fn search_hit_payload_maps_to_row() {
        let hit = json!({
            "id": "5f0c8a56-7d2b-4c1e-9f5a-2b7e1c3d4e5f",
            "score": 0.25,
            "payload": {
                "chunk_id": "abc",
                "document_id": "doc-1",
                "file_name": "manual.txt",
                "chunk_index": 7,
                "content": "torque settings",
            }
        });

        let row = parse_hit(&hit);
        assert_eq!(row.document_id, "doc-1");
        assert_eq!(row.file_name, "manual.txt");
        assert_eq!(row.chunk_index, 7);
        assert_eq!(row.content, "torque settings");
        assert_eq!(row.distance, 0.25);
    }

    #[test]
    fn cosine_scores_become_distances() {
        let store = QdrantStore::new(&QdrantConfig {
            distance: DistanceMetric::Cosine,
            ..QdrantConfig::default()
        });
        assert!((store.score_to_distance(0.9) - 0.1).abs() < 1e-9);

        let store = QdrantStore::new(&QdrantConfig::default());
        assert_eq!(store.score_to_distance(1.5), 1.5);
    }

    #[test]
    fn scope_filter_matches_any_document() {
        let filter = document_filter(&["a".to_string(), "b".to_string()]);
        assert_eq!(filter["must"][0]["match"]["any"], json!(["a", "b"]));
    }

    #[test]
    fn stale_filter_keeps_the_new_chunk_range() {
        let filter = stale_chunks_filter("doc-1", 3);
        assert_eq!(
            filter,
            json!({
                "must": [
                    { "key": "document_id", "match": { "value": "doc-1" } },
                    { "key": "chunk_index", "range": { "gte": 3 } }
                ]
            })
        );
    }
}
