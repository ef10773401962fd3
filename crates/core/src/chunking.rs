use crate::config::ChunkingConfig;
use crate::error::IngestError;
use crate::models::Chunk;
use sha2::{Digest, Sha256};

/// Unifies line endings and strips trailing whitespace from every line.
pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Splits normalized text on blank lines. Each paragraph comes back as a single line,
/// its original lines trimmed and joined with one space.
pub fn split_paragraphs(normalized: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in normalized.split('\n') {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }

    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }

    paragraphs
}

/// Splits `text` into paragraph-aware, word-bounded chunks.
///
/// Whole paragraphs are packed into a chunk while the word count stays within
/// `max_words`. A paragraph that is larger than `max_words` on its own is cut into
/// windows of `max_words` words, each window starting `max_words - overlap_words` words
/// after the previous one.
///
/// Offsets refer to the paragraphs re-joined with one `\n` between them. Windows cut
/// from one paragraph all report that paragraph's span.
pub fn chunk_text(
    text: &str,
    config: ChunkingConfig,
    source_id: Option<&str>,
) -> Result<Vec<Chunk>, IngestError> {
    config.validate().map_err(IngestError::InvalidChunkConfig)?;

    let paragraphs = split_paragraphs(&normalize_text(text));
    let mut builder = ChunkBuilder::new(config, source_id);
    let mut offset = 0usize;

    for paragraph in &paragraphs {
        let paragraph_start = offset;
        let paragraph_end = paragraph_start + paragraph.chars().count();
        offset = paragraph_end + 1;

        let words = paragraph.split_whitespace().collect::<Vec<_>>();

        if !builder.words.is_empty() && builder.words.len() + words.len() > config.max_words {
            let flushed = builder.flush();
            // The seed only takes the room the paragraph leaves, so a paragraph that
            // fits in `max_words` is never cut by its own seed.
            let seed_words = config
                .overlap_words
                .min(config.max_words.saturating_sub(words.len()));
            if config.carry_paragraph_overlap && seed_words > 0 {
                let keep_from = flushed.len().saturating_sub(seed_words);
                builder.words = flushed[keep_from..].to_vec();
                builder.start_char = paragraph_start;
            }
        }

        if builder.words.is_empty() {
            builder.start_char = paragraph_start;
        }

        builder.words.extend(words);
        builder.end_char = paragraph_end;

        while builder.words.len() > config.max_words {
            builder.emit_window();
        }
    }

    builder.flush();
    Ok(builder.chunks)
}

/// Stable identifier for a stored chunk.
pub fn chunk_id(document_id: &str, chunk_index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update((chunk_index as u64).to_le_bytes());
    format!("{:x}", hasher.finalize())
}

struct ChunkBuilder<'a> {
    config: ChunkingConfig,
    source_id: Option<&'a str>,
    chunks: Vec<Chunk>,
    words: Vec<&'a str>,
    start_char: usize,
    end_char: usize,
}

impl<'a> ChunkBuilder<'a> {
    fn new(config: ChunkingConfig, source_id: Option<&'a str>) -> Self {
        Self {
            config,
            source_id,
            chunks: Vec::new(),
            words: Vec::new(),
            start_char: 0,
            end_char: 0,
        }
    }

    fn push(&mut self, content: String) {
        if content.trim().is_empty() {
            return;
        }

        self.chunks.push(Chunk {
            content,
            chunk_index: self.chunks.len(),
            start_char: self.start_char,
            end_char: self.end_char.max(self.start_char),
            source_id: self.source_id.map(str::to_string),
        });
    }

    /// Emits the whole buffer and returns the words it held.
    fn flush(&mut self) -> Vec<&'a str> {
        let words = std::mem::take(&mut self.words);
        if !words.is_empty() {
            self.push(words.join(" "));
        }
        words
    }

    /// Emits the first `max_words` words and keeps the last `overlap_words` of them.
    fn emit_window(&mut self) {
        let max_words = self.config.max_words;
        let content = self.words[..max_words].join(" ");
        self.push(content);
        self.words.drain(..max_words - self.config.overlap_words);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(prefix: &str, count: usize) -> Vec<String> {
        (0..count).map(|index| format!("{prefix}{index}")).collect()
    }

    fn config(max_words: usize, overlap_words: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_words,
            overlap_words,
            carry_paragraph_overlap: false,
        }
    }

    #[test]
    fn empty_input_produces_no_chunks() {
        assert!(chunk_text("", config(10, 2), None).unwrap().is_empty());
        assert!(chunk_text(" \n\r\n\t\n", config(10, 2), None).unwrap().is_empty());
    }

    #[test]
    fn normalization_unifies_line_endings() {
        assert_eq!(normalize_text("a  \r\nb\rc\t"), "a\nb\nc");
        assert_eq!(
            split_paragraphs("first line\n  second line\n\n\n\nnext"),
            vec!["first line second line".to_string(), "next".to_string()]
        );
    }

    #[test]
    fn small_text_fits_in_one_chunk() {
        let text = "One two three.\n\nFour five.\n\nSix.";
        let chunks = chunk_text(text, config(220, 40), Some("doc-1")).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "One two three. Four five. Six.");
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].start_char, 0);
        assert_eq!(chunks[0].end_char, "One two three.\nFour five.\nSix.".len());
        assert_eq!(chunks[0].source_id.as_deref(), Some("doc-1"));
    }

    #[test]
    fn paragraph_flush_starts_fresh_chunk() {
        let para_a = words("a", 50).join(" ");
        let para_b = words("b", 30).join(" ");
        let text = format!("{para_a}\n\n{para_b}");

        let chunks = chunk_text(&text, config(60, 10), None).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, para_a);
        assert_eq!(chunks[1].content, para_b);
        assert_eq!(chunks[0].start_char, 0);
        assert_eq!(chunks[0].end_char, para_a.len());
        assert_eq!(chunks[1].start_char, para_a.len() + 1);
        assert_eq!(chunks[1].end_char, para_a.len() + 1 + para_b.len());
    }

    #[test]
    fn paragraph_overlap_is_carried_when_enabled() {
        let para_a = words("a", 50);
        let para_b = words("b", 30);
        let text = format!("{}\n\n{}", para_a.join(" "), para_b.join(" "));
        let config = ChunkingConfig {
            carry_paragraph_overlap: true,
            ..config(60, 10)
        };

        let chunks = chunk_text(&text, config, None).unwrap();

        assert_eq!(chunks.len(), 2);
        let expected = para_a[40..]
            .iter()
            .chain(para_b.iter())
            .cloned()
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(chunks[1].content, expected);
    }

    #[test]
    fn carried_overlap_never_splits_a_fitting_paragraph() {
        let para_a = words("a", 50);
        let para_b = words("b", 55);
        let text = format!("{}\n\n{}", para_a.join(" "), para_b.join(" "));
        let config = ChunkingConfig {
            carry_paragraph_overlap: true,
            ..config(60, 10)
        };

        let chunks = chunk_text(&text, config, None).unwrap();

        assert_eq!(chunks.len(), 2);
        let expected = para_a[45..]
            .iter()
            .chain(para_b.iter())
            .cloned()
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(chunks[1].content, expected);
        assert_eq!(chunks[1].content.split(' ').count(), 60);
    }

    #[test]
    fn full_window_paragraph_gets_no_seed() {
        let para_a = words("a", 20);
        let para_b = words("b", 60);
        let text = format!("{}\n\n{}", para_a.join(" "), para_b.join(" "));
        let config = ChunkingConfig {
            carry_paragraph_overlap: true,
            ..config(60, 10)
        };

        let chunks = chunk_text(&text, config, None).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].content, para_b.join(" "));
    }

    #[test]
    fn oversized_paragraph_slices_share_overlap() {
        let paragraph = words("w", 25);
        let chunks = chunk_text(&paragraph.join(" "), config(10, 3), None).unwrap();

        let slices = chunks
            .iter()
            .map(|chunk| chunk.content.split(' ').collect::<Vec<_>>())
            .collect::<Vec<_>>();

        assert_eq!(slices.len(), 4);
        assert_eq!(slices[0], paragraph[0..10].iter().map(String::as_str).collect::<Vec<_>>());
        assert_eq!(slices[1][0], "w7");
        assert_eq!(slices[2][0], "w14");
        assert_eq!(slices[3], vec!["w21", "w22", "w23", "w24"]);

        for pair in slices.windows(2) {
            let tail = &pair[0][pair[0].len() - 3..];
            assert_eq!(tail, &pair[1][..3]);
        }

        for (index, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, index);
            assert_eq!(chunk.start_char, 0);
            assert!(chunk.content.split(' ').count() <= 10);
        }
    }

    #[test]
    fn chunks_reconstruct_paragraph_sequence() {
        let paragraphs = (0..7)
            .map(|index| words(&format!("p{index}x"), 3 + index).join(" "))
            .collect::<Vec<_>>();
        let text = paragraphs.join("\n\n");

        let chunks = chunk_text(&text, config(12, 4), None).unwrap();

        let rebuilt = chunks
            .iter()
            .map(|chunk| chunk.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(rebuilt, paragraphs.join(" "));
        assert!(chunks.windows(2).all(|pair| pair[0].start_char < pair[1].start_char));
    }

    #[test]
    fn invalid_overlap_is_rejected() {
        let error = chunk_text("text", config(5, 5), None).unwrap_err();
        assert!(matches!(error, IngestError::InvalidChunkConfig(_)));
    }

    #[test]
    fn chunk_id_is_stable_per_document_and_index() {
        assert_eq!(chunk_id("doc", 1), chunk_id("doc", 1));
        assert_ne!(chunk_id("doc", 1), chunk_id("doc", 2));
        assert_ne!(chunk_id("doc", 1), chunk_id("other", 1));
    }
}
