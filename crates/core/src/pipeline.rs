use crate::config::{RagConfig, RetrievalConfig};
use crate::context::{assemble, build_answer_prompt, make_snippet};
use crate::embeddings::Embedder;
use crate::generation::TextGenerator;
use crate::ingest::index_document;
use crate::reranker::{LlmReranker, RerankOutcome};
use crate::retriever::Retriever;
use crate::traits::VectorIndex;
use crate::{
    chunk_text, Candidate, Chunk, CitedChunk, DocumentRef, DocumentScope, IndexedDocument,
    IngestError, PipelineError, PipelineStage, QaAnswer, RankedCandidate,
};
use tracing::debug;

pub const NO_CONTEXT_ANSWER: &str = "No relevant context found for this question.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AskOptions {
    pub use_rerank: bool,
    pub top_n_candidates: usize,
    pub top_k_final: usize,
    pub scope: DocumentScope,
}

impl AskOptions {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            use_rerank: config.use_rerank,
            top_n_candidates: config.top_n_candidates,
            top_k_final: config.top_k_final,
            scope: DocumentScope::all(),
        }
    }

    /// How many candidates to pull from the index before any reranking.
    pub fn retrieval_depth(&self) -> usize {
        if self.use_rerank {
            self.top_n_candidates.max(self.top_k_final)
        } else {
            self.top_k_final
        }
    }
}

/// Question answering over one embedder, vector index and text generator.
///
/// Each call builds its own candidates; nothing is shared between requests except the
/// collaborators themselves.
pub struct RagPipeline<E, V, G> {
    embedder: E,
    index: V,
    generator: G,
    config: RagConfig,
}

impl<E, V, G> RagPipeline<E, V, G>
where
    E: Embedder,
    V: VectorIndex,
    G: TextGenerator,
{
    pub fn new(embedder: E, index: V, generator: G, config: RagConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            embedder,
            index,
            generator,
            config,
        })
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn index(&self) -> &V {
        &self.index
    }

    pub fn ask_options(&self) -> AskOptions {
        AskOptions::from_config(&self.config.retrieval)
    }

    pub fn chunk(&self, text: &str, source_id: Option<&str>) -> Result<Vec<Chunk>, IngestError> {
        chunk_text(text, self.config.chunking, source_id)
    }

    pub async fn index_document(
        &self,
        document: &DocumentRef,
        text: &str,
    ) -> Result<IndexedDocument, IngestError> {
        index_document(&self.embedder, &self.index, document, text, self.config.chunking).await
    }

    pub async fn retrieve(
        &self,
        question: &str,
        top_k: usize,
        scope: &DocumentScope,
    ) -> Result<Vec<Candidate>, PipelineError> {
        Retriever::new(&self.embedder, &self.index)
            .retrieve(question, top_k, scope)
            .await
    }

    pub async fn rerank(
        &self,
        question: &str,
        candidates: Vec<Candidate>,
    ) -> Result<RerankOutcome, PipelineError> {
        LlmReranker::new(&self.generator, self.config.retrieval.rerank_preview_chars)
            .rerank(question, candidates)
            .await
    }

    /// Builds the context from `selected`, already in final order, and generates the
    /// answer. An empty selection yields [`NO_CONTEXT_ANSWER`] without a generation call.
    pub async fn assemble_and_answer(
        &self,
        question: &str,
        selected: Vec<RankedCandidate>,
    ) -> Result<QaAnswer, PipelineError> {
        let mut stages = Vec::new();
        self.generate(question, selected, &mut stages).await
    }

    /// Retrieve, optionally rerank, then assemble and generate.
    pub async fn answer(&self, question: &str, options: &AskOptions) -> Result<QaAnswer, PipelineError> {
        let mut stages = vec![PipelineStage::Retrieving];

        let candidates = self
            .retrieve(question, options.retrieval_depth(), &options.scope)
            .await?;
        debug!(candidates = candidates.len(), rerank = options.use_rerank, "retrieved");

        if candidates.is_empty() {
            return self.generate(question, Vec::new(), &mut stages).await;
        }

        let mut rerank_fallback = None;
        let mut ranked = if options.use_rerank {
            stages.push(PipelineStage::Reranking);
            let outcome = self.rerank(question, candidates).await?;
            rerank_fallback = outcome.parse.fallback_reason().cloned();
            outcome.ranked
        } else {
            RankedCandidate::identity(candidates)
        };
        ranked.truncate(options.top_k_final);

        let mut answer = self.generate(question, ranked, &mut stages).await?;
        answer.rerank_fallback = rerank_fallback;
        Ok(answer)
    }

    async fn generate(
        &self,
        question: &str,
        selected: Vec<RankedCandidate>,
        stages: &mut Vec<PipelineStage>,
    ) -> Result<QaAnswer, PipelineError> {
        if selected.is_empty() {
            stages.push(PipelineStage::NoContext);
            debug!("no context, skipping generation");
            return Ok(QaAnswer {
                question: question.to_string(),
                answer: NO_CONTEXT_ANSWER.to_string(),
                citations: Vec::new(),
                stages: std::mem::take(stages),
                rerank_fallback: None,
            });
        }

        stages.push(PipelineStage::Assembling);
        let retrieval = &self.config.retrieval;
        let context = assemble(&selected, retrieval.max_chars_per_chunk);
        let prompt = build_answer_prompt(question, &context.render());

        stages.push(PipelineStage::Generating);
        debug!(blocks = context.entries.len(), prompt_chars = prompt.len(), "generating");
        let answer = self.generator.complete(&prompt).await?;
        stages.push(PipelineStage::Done);

        let citations = selected
            .into_iter()
            .map(|ranked| cite(ranked, retrieval.citation_snippet_chars))
            .collect();

        Ok(QaAnswer {
            question: question.to_string(),
            answer: answer.trim().to_string(),
            citations,
            stages: std::mem::take(stages),
            rerank_fallback: None,
        })
    }
}

fn cite(ranked: RankedCandidate, snippet_chars: usize) -> CitedChunk {
    let (snippet, _) = make_snippet(&ranked.candidate.content, snippet_chars);
    let candidate = ranked.candidate;
    CitedChunk {
        local_id: candidate.local_id,
        original_rank: candidate.original_rank,
        position: ranked.position,
        similarity_score: candidate.similarity_score,
        rerank_score: ranked.rerank_score,
        file_name: candidate.file_name,
        chunk_index: candidate.chunk_index,
        snippet,
    }
}
