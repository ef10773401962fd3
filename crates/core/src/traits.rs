use crate::{Chunk, DocumentRef, DocumentScope, PipelineError, VectorRow};
use async_trait::async_trait;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Replaces every stored chunk of `document` with `chunks`, paired index-wise with
    /// `embeddings`.
    async fn replace_document(
        &self,
        document: &DocumentRef,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), PipelineError>;

    async fn delete_document(&self, document_id: &str) -> Result<(), PipelineError>;

    /// Nearest rows first. Rows at equal distance keep the order the store produced.
    async fn query_nearest(
        &self,
        query_vector: &[f32],
        top_k: usize,
        scope: &DocumentScope,
    ) -> Result<Vec<VectorRow>, PipelineError>;
}
