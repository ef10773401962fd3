use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One segment of a document, in document order by `chunk_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub chunk_index: usize,
    pub start_char: usize,
    pub end_char: usize,
    pub source_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub document_id: String,
    pub file_name: String,
    pub source_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub document: DocumentRef,
    pub chunk_count: usize,
    pub content_digest: String,
    pub indexed_at: DateTime<Utc>,
}

/// A nearest-neighbour row as returned by a vector index, before ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRow {
    pub chunk_id: String,
    pub document_id: String,
    pub file_name: String,
    pub chunk_index: usize,
    pub content: String,
    pub distance: f64,
}

/// Restricts a similarity query to a set of documents. An empty scope means "everything".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentScope {
    pub document_ids: Vec<String>,
}

impl DocumentScope {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn documents(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            document_ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.document_ids.is_empty()
    }

    pub fn contains(&self, document_id: &str) -> bool {
        self.is_unrestricted() || self.document_ids.iter().any(|id| id == document_id)
    }
}

/// A retrieval hit for one query. `local_id` is 1..N within that query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub local_id: usize,
    pub original_rank: usize,
    pub similarity_score: f64,
    pub file_name: String,
    pub chunk_index: usize,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    /// 1-based position after reranking.
    pub position: usize,
    pub rerank_score: Option<f64>,
}

impl RankedCandidate {
    /// Ranks candidates in the order given, without a secondary score.
    pub fn identity(candidates: Vec<Candidate>) -> Vec<Self> {
        candidates
            .into_iter()
            .enumerate()
            .map(|(index, candidate)| Self {
                candidate,
                position: index + 1,
                rerank_score: None,
            })
            .collect()
    }

    /// Score shown next to the chunk: the rerank score when one exists.
    pub fn display_score(&self) -> f64 {
        self.rerank_score.unwrap_or(self.candidate.similarity_score)
    }
}

/// One formatted citation block of the answer context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub local_id: usize,
    pub file_name: String,
    pub chunk_index: usize,
    pub score: f64,
    pub text: String,
    pub truncated: bool,
    pub formatted: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextBlock {
    pub entries: Vec<ContextEntry>,
}

impl ContextBlock {
    pub const SEPARATOR: &'static str = "\n\n";

    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|entry| entry.formatted.as_str())
            .collect::<Vec<_>>()
            .join(Self::SEPARATOR)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitedChunk {
    pub local_id: usize,
    pub original_rank: usize,
    pub position: usize,
    pub similarity_score: f64,
    pub rerank_score: Option<f64>,
    pub file_name: String,
    pub chunk_index: usize,
    pub snippet: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStage {
    Retrieving,
    Reranking,
    Assembling,
    Generating,
    Done,
    NoContext,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackReason {
    NotJson,
    NotAList,
    NoValidIds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaAnswer {
    pub question: String,
    pub answer: String,
    pub citations: Vec<CitedChunk>,
    pub stages: Vec<PipelineStage>,
    pub rerank_fallback: Option<FallbackReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_scope_matches_every_document() {
        let scope = DocumentScope::all();
        assert!(scope.contains("doc-1"));

        let scope = DocumentScope::documents(["doc-2"]);
        assert!(!scope.contains("doc-1"));
        assert!(scope.contains("doc-2"));
    }

    #[test]
    fn display_score_prefers_rerank_score() {
        let candidate = Candidate {
            local_id: 1,
            original_rank: 1,
            similarity_score: 0.42,
            file_name: "a.txt".to_string(),
            chunk_index: 0,
            content: "alpha".to_string(),
        };
        let mut ranked = RankedCandidate::identity(vec![candidate]);
        assert_eq!(ranked[0].display_score(), 0.42);
        ranked[0].rerank_score = Some(0.9);
        assert_eq!(ranked[0].display_score(), 0.9);
    }
}
