//! Second-stage ordering of retrieval candidates by a text-generation model.
//!
//! The model sees every candidate with its local id and must reply with a JSON array of
//! ids, best first. Whatever it replies, the output is a permutation of the input:
//! unusable replies fall back to the retrieval order, and candidates the model left out
//! are appended in retrieval order.

use crate::context::make_snippet;
use crate::generation::TextGenerator;
use crate::models::{Candidate, FallbackReason, RankedCandidate};
use crate::PipelineError;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Outcome of reading the model's reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedIds {
    /// Valid ids in the order the model gave them, without duplicates.
    Parsed(Vec<usize>),
    /// The reply was unusable; the identity order applies.
    Fallback(FallbackReason),
}

impl ParsedIds {
    /// Full order over `1..=count`: parsed ids first, then the ones the model skipped.
    pub fn order(&self, count: usize) -> Vec<usize> {
        match self {
            Self::Parsed(ids) => {
                let listed = ids.iter().copied().collect::<HashSet<_>>();
                ids.iter()
                    .copied()
                    .chain((1..=count).filter(|id| !listed.contains(id)))
                    .collect()
            }
            Self::Fallback(_) => (1..=count).collect(),
        }
    }

    pub fn fallback_reason(&self) -> Option<&FallbackReason> {
        match self {
            Self::Parsed(_) => None,
            Self::Fallback(reason) => Some(reason),
        }
    }
}

/// Reads a JSON array of ids in `1..=max_id`. Non-integers and out-of-range values are
/// dropped, duplicates keep their first occurrence.
pub fn parse_id_list(raw: &str, max_id: usize) -> ParsedIds {
    let value: Value = match serde_json::from_str(raw.trim()) {
        Ok(value) => value,
        Err(_) => return ParsedIds::Fallback(FallbackReason::NotJson),
    };

    let Value::Array(items) = value else {
        return ParsedIds::Fallback(FallbackReason::NotAList);
    };

    let mut seen = HashSet::new();
    let ids = items
        .iter()
        .filter_map(Value::as_u64)
        .filter_map(|id| usize::try_from(id).ok())
        .filter(|id| (1..=max_id).contains(id))
        .filter(|id| seen.insert(*id))
        .collect::<Vec<_>>();

    if ids.is_empty() {
        ParsedIds::Fallback(FallbackReason::NoValidIds)
    } else {
        ParsedIds::Parsed(ids)
    }
}

pub fn build_rerank_prompt(question: &str, candidates: &[Candidate], preview_chars: usize) -> String {
    let candidates_text = candidates
        .iter()
        .map(|candidate| {
            let (preview, _) = make_snippet(&candidate.content, preview_chars);
            format!(
                "ID: {}\nOriginalRank: {}\nOriginalScore: {:.3}\nFile: {}\nChunkIndex: {}\nText: {}\n",
                candidate.local_id,
                candidate.original_rank,
                candidate.similarity_score,
                candidate.file_name,
                candidate.chunk_index,
                preview
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a reranking assistant.

You are given a QUESTION and a list of CANDIDATE text chunks.
Your task is to rank the chunks from most relevant to least relevant to answer the QUESTION.

Return ONLY a JSON array of candidate IDs in best-first order.
Do NOT include any other text.
Example: [3, 1, 2]

QUESTION:
{question}

CANDIDATES:
{candidates_text}
"
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct RerankOutcome {
    pub ranked: Vec<RankedCandidate>,
    pub parse: ParsedIds,
}

pub struct LlmReranker<'a, G: ?Sized> {
    generator: &'a G,
    preview_chars: usize,
}

impl<'a, G> LlmReranker<'a, G>
where
    G: TextGenerator + ?Sized,
{
    pub fn new(generator: &'a G, preview_chars: usize) -> Self {
        Self {
            generator,
            preview_chars,
        }
    }

    /// Makes exactly one generation call for a non-empty list. A failed call is returned
    /// as an error; an unusable reply is not.
    pub async fn rerank(
        &self,
        question: &str,
        candidates: Vec<Candidate>,
    ) -> Result<RerankOutcome, PipelineError> {
        if candidates.is_empty() {
            return Ok(RerankOutcome {
                ranked: Vec::new(),
                parse: ParsedIds::Parsed(Vec::new()),
            });
        }

        let prompt = build_rerank_prompt(question, &candidates, self.preview_chars);
        let raw = self.generator.complete(&prompt).await?;

        let parse = parse_id_list(&raw, candidates.len());
        match &parse {
            ParsedIds::Parsed(ids) => {
                debug!(returned = ids.len(), total = candidates.len(), "rerank order parsed")
            }
            ParsedIds::Fallback(reason) => {
                warn!(?reason, "rerank reply unusable, keeping retrieval order")
            }
        }

        let ranked = apply_order(candidates, &parse);
        Ok(RerankOutcome { ranked, parse })
    }
}

/// Reorders candidates by local id. Ids with no matching candidate are skipped and any
/// candidate not reached is appended in input order.
fn apply_order(candidates: Vec<Candidate>, parse: &ParsedIds) -> Vec<RankedCandidate> {
    let order = parse.order(candidates.len());
    let positions = candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| (candidate.local_id, index))
        .collect::<HashMap<_, _>>();

    let mut slots = candidates.into_iter().map(Some).collect::<Vec<_>>();
    let mut ordered = Vec::with_capacity(slots.len());

    for id in order {
        if let Some(candidate) = positions.get(&id).and_then(|index| slots[*index].take()) {
            ordered.push(candidate);
        }
    }
    ordered.extend(slots.into_iter().flatten());

    RankedCandidate::identity(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedGenerator {
        reply: Result<String, u16>,
        calls: AtomicUsize,
        last_prompt: Mutex<String>,
    }

    impl ScriptedGenerator {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(String::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                reply: Err(status),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(String::new()),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn complete(&self, prompt: &str) -> Result<String, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = prompt.to_string();
            match &self.reply {
                Ok(reply) => Ok(reply.clone()),
                Err(status) => Err(PipelineError::unavailable("fake", Some(*status), "down")),
            }
        }
    }

    fn candidates(count: usize) -> Vec<Candidate> {
        (1..=count)
            .map(|id| Candidate {
                local_id: id,
                original_rank: id,
                similarity_score: 1.0 - id as f64 / 10.0,
                file_name: format!("file-{id}.txt"),
                chunk_index: id,
                content: format!("content of candidate {id}"),
            })
            .collect()
    }

    fn ids(outcome: &RerankOutcome) -> Vec<usize> {
        outcome
            .ranked
            .iter()
            .map(|ranked| ranked.candidate.local_id)
            .collect()
    }

    #[tokio::test]
    async fn model_order_is_applied() {
        let generator = ScriptedGenerator::replying("[3,1,2]");
        let outcome = LlmReranker::new(&generator, 400)
            .rerank("q", candidates(3))
            .await
            .unwrap();

        assert_eq!(ids(&outcome), vec![3, 1, 2]);
        assert_eq!(outcome.parse, ParsedIds::Parsed(vec![3, 1, 2]));
        let positions = outcome.ranked.iter().map(|r| r.position).collect::<Vec<_>>();
        assert_eq!(positions, vec![1, 2, 3]);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_json_reply_keeps_retrieval_order() {
        let generator = ScriptedGenerator::replying("not json");
        let outcome = LlmReranker::new(&generator, 400)
            .rerank("q", candidates(3))
            .await
            .unwrap();

        assert_eq!(ids(&outcome), vec![1, 2, 3]);
        assert_eq!(outcome.parse, ParsedIds::Fallback(FallbackReason::NotJson));
    }

    #[tokio::test]
    async fn missing_ids_are_appended_in_original_order() {
        let generator = ScriptedGenerator::replying("[4, 2]");
        let outcome = LlmReranker::new(&generator, 400)
            .rerank("q", candidates(5))
            .await
            .unwrap();

        assert_eq!(ids(&outcome), vec![4, 2, 1, 3, 5]);
    }

    #[tokio::test]
    async fn output_is_a_permutation_for_any_reply() {
        let replies = [
            "[]",
            "[0, 99, -1]",
            "{\"ids\": [1]}",
            "[2, 2, \"1\", 1.0, true, null]",
            "[5, 4, 3, 2, 1, 6]",
            "```json\n[1]\n```",
            "",
        ];

        for reply in replies {
            let generator = ScriptedGenerator::replying(reply);
            let outcome = LlmReranker::new(&generator, 400)
                .rerank("q", candidates(5))
                .await
                .unwrap();

            let mut seen = ids(&outcome);
            assert_eq!(seen.len(), 5, "reply {reply:?}");
            seen.sort_unstable();
            assert_eq!(seen, vec![1, 2, 3, 4, 5], "reply {reply:?}");
        }
    }

    #[test]
    fn parser_paths_are_distinguishable() {
        assert_eq!(parse_id_list("[]", 3), ParsedIds::Fallback(FallbackReason::NoValidIds));
        assert_eq!(
            parse_id_list("[0, 4, -2]", 3),
            ParsedIds::Fallback(FallbackReason::NoValidIds)
        );
        assert_eq!(parse_id_list("{}", 3), ParsedIds::Fallback(FallbackReason::NotAList));
        assert_eq!(parse_id_list("[1", 3), ParsedIds::Fallback(FallbackReason::NotJson));
        assert_eq!(
            parse_id_list(" [2, 2, \"3\", 1.5, true, 3] ", 3),
            ParsedIds::Parsed(vec![2, 3])
        );
    }

    #[test]
    fn identity_fallback_order() {
        let parsed = ParsedIds::Fallback(FallbackReason::NotJson);
        assert_eq!(parsed.order(4), vec![1, 2, 3, 4]);
        assert_eq!(ParsedIds::Parsed(vec![3]).order(4), vec![3, 1, 2, 4]);
    }

    #[tokio::test]
    async fn transport_failure_is_not_swallowed() {
        let generator = ScriptedGenerator::failing(503);
        let result = LlmReranker::new(&generator, 400)
            .rerank("q", candidates(2))
            .await;

        assert!(matches!(
            result,
            Err(PipelineError::UpstreamUnavailable {
                status: Some(503),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn empty_candidates_make_no_call() {
        let generator = ScriptedGenerator::replying("[1]");
        let outcome = LlmReranker::new(&generator, 400)
            .rerank("q", Vec::new())
            .await
            .unwrap();

        assert!(outcome.ranked.is_empty());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn prompt_lists_capped_previews() {
        let generator = ScriptedGenerator::replying("[1]");
        let mut long = candidates(1);
        long[0].content = "x".repeat(1_000);

        LlmReranker::new(&generator, 400)
            .rerank("which one?", long)
            .await
            .unwrap();

        let prompt = generator.last_prompt.lock().unwrap().clone();
        assert!(prompt.contains("QUESTION:\nwhich one?"));
        assert!(prompt.contains("ID: 1\nOriginalRank: 1\nOriginalScore: 0.900\nFile: file-1.txt"));
        assert!(prompt.contains(&format!("Text: {}...\n", "x".repeat(400))));
        assert!(!prompt.contains(&"x".repeat(401)));
    }
}
