pub mod chunking;
pub mod config;
pub mod context;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod reranker;
pub mod retriever;
pub mod stores;
pub mod traits;

pub use chunking::{chunk_id, chunk_text, normalize_text, split_paragraphs};
pub use config::{
    ChunkingConfig, DistanceMetric, OllamaConfig, QdrantConfig, RagConfig, RetrievalConfig,
};
pub use context::{assemble, build_answer_prompt, make_snippet};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, OllamaEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{IngestError, PipelineError};
pub use extractor::{FileTextExtractor, TextExtractor};
pub use generation::{OllamaChatClient, TextGenerator};
pub use ingest::{
    discover_documents, document_ref_for_path, index_document, index_folder_best_effort,
    IngestionReport, SkippedDocument,
};
pub use models::{
    Candidate, Chunk, CitedChunk, ContextBlock, ContextEntry, DocumentRef, DocumentScope,
    FallbackReason, IndexedDocument, PipelineStage, QaAnswer, RankedCandidate, VectorRow,
};
pub use pipeline::{AskOptions, RagPipeline, NO_CONTEXT_ANSWER};
pub use reranker::{LlmReranker, ParsedIds, RerankOutcome};
pub use retriever::Retriever;
pub use stores::{InMemoryVectorIndex, QdrantStore};
pub use traits::VectorIndex;
