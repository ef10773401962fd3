use crate::embeddings::Embedder;
use crate::traits::VectorIndex;
use crate::{Candidate, DocumentScope, PipelineError, VectorRow};
use tracing::debug;

/// Embeds a question and turns nearest-neighbour rows into ranked candidates.
pub struct Retriever<'a, E: ?Sized, V: ?Sized> {
    embedder: &'a E,
    index: &'a V,
}

impl<'a, E, V> Retriever<'a, E, V>
where
    E: Embedder + ?Sized,
    V: VectorIndex + ?Sized,
{
    pub fn new(embedder: &'a E, index: &'a V) -> Self {
        Self { embedder, index }
    }

    /// Best-first candidates. An empty result means "no relevant context", not a fault.
    pub async fn retrieve(
        &self,
        question: &str,
        top_k: usize,
        scope: &DocumentScope,
    ) -> Result<Vec<Candidate>, PipelineError> {
        if question.trim().is_empty() {
            return Err(PipelineError::Request("question is empty".to_string()));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(question).await?;
        let rows = self.index.query_nearest(&query_vector, top_k, scope).await?;
        debug!(rows = rows.len(), top_k, "vector query returned");

        Ok(rank_rows(rows, top_k))
    }
}

/// Orders rows by ascending distance, keeping store order for ties, and numbers them
/// 1..=N. Similarity is `1 - distance`.
pub fn rank_rows(mut rows: Vec<VectorRow>, top_k: usize) -> Vec<Candidate> {
    rows.sort_by(|left, right| left.distance.total_cmp(&right.distance));
    rows.truncate(top_k);

    rows.into_iter()
        .enumerate()
        .map(|(index, row)| Candidate {
            local_id: index + 1,
            original_rank: index + 1,
            similarity_score: 1.0 - row.distance,
            file_name: row.file_name,
            chunk_index: row.chunk_index,
            content: row.content,
        })
        .collect()
}
