use crate::models::{ContextBlock, ContextEntry, RankedCandidate};

pub const ELLIPSIS: &str = "...";

/// Puts the content on one line, trims it and cuts it to `max_chars` characters,
/// appending [`ELLIPSIS`] when something was cut. Returns whether it was cut.
pub fn make_snippet(content: &str, max_chars: usize) -> (String, bool) {
    let single_line = content.trim().replace("\r\n", " ").replace(['\n', '\r'], " ");
    let single_line = single_line.trim();

    match single_line.char_indices().nth(max_chars) {
        Some((cut, _)) => (format!("{}{ELLIPSIS}", &single_line[..cut]), true),
        None => (single_line.to_string(), false),
    }
}

/// Formats the selected candidates, in order, as citation blocks.
///
/// Each block is a header line `[id] (rank=.., score=.., file=.., chunk=..)` followed by
/// the snippet. The snippet never exceeds `max_chars_per_chunk` characters plus the
/// ellipsis.
pub fn assemble(selected: &[RankedCandidate], max_chars_per_chunk: usize) -> ContextBlock {
    let entries = selected
        .iter()
        .map(|ranked| {
            let candidate = &ranked.candidate;
            let (text, truncated) = make_snippet(&candidate.content, max_chars_per_chunk);
            let score = ranked.display_score();
            let formatted = format!(
                "[{}] (rank={}, score={:.3}, file={}, chunk={})\n{}",
                candidate.local_id,
                candidate.original_rank,
                score,
                candidate.file_name,
                candidate.chunk_index,
                text
            );

            ContextEntry {
                local_id: candidate.local_id,
                file_name: candidate.file_name.clone(),
                chunk_index: candidate.chunk_index,
                score,
                text,
                truncated,
                formatted,
            }
        })
        .collect();

    ContextBlock { entries }
}

pub fn build_answer_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a helpful assistant answering questions about documents.

Use ONLY the information in the CONTEXT below to answer the QUESTION.
If the answer is not clearly contained in the context, say you do not know.

CONTEXT:
{context}

QUESTION:
{question}

Answer concisely in a few sentences.
"
    )
}
