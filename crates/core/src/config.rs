//! Explicit configuration for every pipeline component.
//!
//! Components receive the relevant section at construction time; nothing in the
//! library reads the environment. Every field has a serde default so a partial JSON
//! file is enough.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_ollama_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_embed_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_chat_model() -> String {
    "llama3.2".to_string()
}

fn default_embed_timeout_secs() -> u64 {
    60
}

fn default_chat_timeout_secs() -> u64 {
    120
}

fn default_max_words() -> usize {
    220
}

fn default_overlap_words() -> usize {
    40
}

fn default_top_k() -> usize {
    5
}

fn default_top_n_candidates() -> usize {
    15
}

fn default_max_chars_per_chunk() -> usize {
    700
}

fn default_rerank_preview_chars() -> usize {
    400
}

fn default_citation_snippet_chars() -> usize {
    140
}

fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}

fn default_collection() -> String {
    "document_chunks".to_string()
}

fn default_vector_size() -> usize {
    768
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub qdrant: QdrantConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embed_timeout_secs")]
    pub embed_timeout_secs: u64,
    #[serde(default = "default_chat_timeout_secs")]
    pub chat_timeout_secs: u64,
}

/// Word-based chunk sizing.
///
/// `carry_paragraph_overlap` seeds each chunk that starts at a paragraph boundary with
/// the last `overlap_words` words of the previous chunk. Off by default, in which case
/// overlap is only carried between slices of a single oversized paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_words")]
    pub max_words: usize,
    #[serde(default = "default_overlap_words")]
    pub overlap_words: usize,
    #[serde(default)]
    pub carry_paragraph_overlap: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidates returned by a plain search.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Candidates pulled from the vector store before reranking.
    #[serde(default = "default_top_n_candidates")]
    pub top_n_candidates: usize,
    /// Chunks that make it into the answer context.
    #[serde(default = "default_top_k")]
    pub top_k_final: usize,
    #[serde(default)]
    pub use_rerank: bool,
    #[serde(default = "default_max_chars_per_chunk")]
    pub max_chars_per_chunk: usize,
    #[serde(default = "default_rerank_preview_chars")]
    pub rerank_preview_chars: usize,
    #[serde(default = "default_citation_snippet_chars")]
    pub citation_snippet_chars: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DistanceMetric {
    #[default]
    Euclid,
    Cosine,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_vector_size")]
    pub vector_size: usize,
    #[serde(default)]
    pub distance: DistanceMetric,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            embed_model: default_embed_model(),
            chat_model: default_chat_model(),
            embed_timeout_secs: default_embed_timeout_secs(),
            chat_timeout_secs: default_chat_timeout_secs(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_words: default_max_words(),
            overlap_words: default_overlap_words(),
            carry_paragraph_overlap: false,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            top_n_candidates: default_top_n_candidates(),
            top_k_final: default_top_k(),
            use_rerank: false,
            max_chars_per_chunk: default_max_chars_per_chunk(),
            rerank_preview_chars: default_rerank_preview_chars(),
            citation_snippet_chars: default_citation_snippet_chars(),
        }
    }
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            collection: default_collection(),
            vector_size: default_vector_size(),
            distance: DistanceMetric::default(),
        }
    }
}

impl OllamaConfig {
    /// Base URL without trailing slashes or an OpenAI-style `/v1` suffix.
    pub fn normalized_base_url(&self) -> String {
        let trimmed = self.base_url.trim().trim_end_matches('/');
        trimmed
            .strip_suffix("/v1")
            .unwrap_or(trimmed)
            .trim_end_matches('/')
            .to_string()
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_words == 0 {
            return Err("max_words must be at least 1".to_string());
        }
        if self.overlap_words >= self.max_words {
            return Err(format!(
                "overlap_words ({}) must be smaller than max_words ({})",
                self.overlap_words, self.max_words
            ));
        }
        Ok(())
    }
}

impl RagConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path).map_err(|error| {
            PipelineError::InvalidConfig(format!("cannot read {}: {error}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        self.chunking.validate().map_err(PipelineError::InvalidConfig)?;

        let retrieval = &self.retrieval;
        if retrieval.top_k == 0 || retrieval.top_k_final == 0 {
            return Err(PipelineError::InvalidConfig(
                "top_k and top_k_final must be at least 1".to_string(),
            ));
        }
        if retrieval.use_rerank && retrieval.top_n_candidates < retrieval.top_k_final {
            return Err(PipelineError::InvalidConfig(format!(
                "top_n_candidates ({}) must be >= top_k_final ({}) when reranking",
                retrieval.top_n_candidates, retrieval.top_k_final
            )));
        }
        if retrieval.max_chars_per_chunk == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_chars_per_chunk must be at least 1".to_string(),
            ));
        }
        if self.qdrant.vector_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "qdrant vector_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
