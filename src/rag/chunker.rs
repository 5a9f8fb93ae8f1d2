//! Text chunking strategies (§4.2).
//!
//! [`ChunkingStrategy::Recursive`] is a fixed-size, overlap-window chunker
//! (character-based, via `text-splitter`) with no embedding calls. It is also
//! the fallback large inputs downgrade to per §4.2's >10,000-character rule.
//!
//! [`SemanticChunker`] implements the percentile-breakpoint algorithm: split
//! into sentences, embed each one, take the cosine-similarity sequence
//! between consecutive sentences, pick the 20th-percentile score as a
//! breakpoint threshold (clamped to `[0.40, 0.90]`), and group sentences
//! between breakpoints subject to the min/max chunk size bounds.

use regex::Regex;
use std::sync::OnceLock;
use text_splitter::TextSplitter;
use vector_engine::DistanceMetric;

use crate::rag::embeddings::EmbeddingClient;
use crate::types::Result;

/// Large inputs downgrade from semantic to recursive chunking at this length,
/// per §4.2.
pub const SEMANTIC_DOWNGRADE_THRESHOLD: usize = 10_000;

/// Lower clamp for the breakpoint threshold: below this, text is considered
/// heterogeneous enough that every candidate breakpoint is honored.
pub const MIN_BREAKPOINT_THRESHOLD: f32 = 0.40;
/// Upper clamp: above this, even the weakest sentence-to-sentence bond is
/// strong enough that no split is forced.
pub const MAX_BREAKPOINT_THRESHOLD: f32 = 0.90;
/// Percentile used to pick the candidate breakpoint threshold.
pub const BREAKPOINT_PERCENTILE: f32 = 0.20;

fn sentence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^.!?。！？؟]+[.!?。！？؟]+\s*").unwrap())
}

/// Split `text` into sentences. Falls back to whitespace-chunked segments of
/// length `min(200, max_chunk_size/4)` for any sentence longer than
/// `max_chunk_size`, and to newline-group splitting if no sentence boundary
/// is found at all.
pub fn split_sentences(text: &str, max_chunk_size: usize) -> Vec<String> {
    let re = sentence_regex();
    let mut sentences: Vec<String> = re
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if sentences.is_empty() {
        sentences = text
            .split("\n\n")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if sentences.is_empty() && !text.trim().is_empty() {
        sentences = vec![text.trim().to_string()];
    }

    let segment_size = 200usize.min((max_chunk_size / 4).max(1));
    sentences
        .into_iter()
        .flat_map(|sentence| split_oversized_sentence(&sentence, max_chunk_size, segment_size))
        .collect()
}

fn split_oversized_sentence(sentence: &str, max_chunk_size: usize, segment_size: usize) -> Vec<String> {
    if sentence.len() <= max_chunk_size {
        return vec![sentence.to_string()];
    }
    let words: Vec<&str> = sentence.split_whitespace().collect();
    let mut segments = Vec::new();
    let mut current = String::new();
    for word in words {
        if !current.is_empty() && current.len() + 1 + word.len() > segment_size {
            segments.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        segments.push(current);
    }
    if segments.is_empty() {
        vec![sentence.to_string()]
    } else {
        segments
    }
}

/// Fixed-size recursive chunker: splits on the largest available boundary
/// `text-splitter` can hold under `chunk_size` characters, with
/// `chunk_overlap` characters of overlap carried into the next chunk.
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap,
        }
    }

    pub fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let splitter = TextSplitter::new(self.chunk_size);
        let chunks: Vec<String> = splitter.chunks(text).map(|c| c.to_string()).collect();
        if self.chunk_overlap == 0 || chunks.len() < 2 {
            return chunks;
        }
        overlap_chunks(&chunks, self.chunk_overlap)
    }
}

/// Re-introduce `overlap` characters from the tail of each chunk as a prefix
/// of the next, mirroring a sliding window over `text-splitter`'s
/// non-overlapping output (which has no native overlap option).
fn overlap_chunks(chunks: &[String], overlap: usize) -> Vec<String> {
    let mut out = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            out.push(chunk.clone());
            continue;
        }
        let prev = &chunks[i - 1];
        let tail_start = prev.len().saturating_sub(overlap);
        let tail = &prev[tail_start..];
        out.push(format!("{tail}{chunk}"));
    }
    out
}

/// Parameters for [`SemanticChunker::chunk`].
#[derive(Debug, Clone)]
pub struct SemanticChunkParams {
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
    pub dense_model: String,
}

/// Percentile-breakpoint semantic chunker (§4.2).
pub struct SemanticChunker<'a> {
    embedding_client: &'a EmbeddingClient,
}

impl<'a> SemanticChunker<'a> {
    pub fn new(embedding_client: &'a EmbeddingClient) -> Self {
        Self { embedding_client }
    }

    /// Chunk `text`. Downgrades to [`RecursiveChunker`] for inputs over
    /// [`SEMANTIC_DOWNGRADE_THRESHOLD`] characters.
    pub async fn chunk(&self, text: &str, params: &SemanticChunkParams) -> Result<Vec<String>> {
        if text.chars().count() > SEMANTIC_DOWNGRADE_THRESHOLD {
            tracing::warn!(
                len = text.len(),
                "input exceeds semantic chunker threshold, downgrading to recursive chunking"
            );
            let recursive = RecursiveChunker::new(params.max_chunk_size, 0);
            return Ok(recursive.chunk(text));
        }

        let sentences = split_sentences(text, params.max_chunk_size);
        if sentences.len() <= 1 {
            return Ok(sentences);
        }

        let embeddings = self
            .embedding_client
            .encode_dense(&sentences, &params.dense_model)
            .await?;

        let similarities = consecutive_similarities(&embeddings);
        let threshold = breakpoint_threshold(&similarities);
        let breakpoints: Vec<bool> = similarities.iter().map(|s| *s <= threshold).collect();

        Ok(group_sentences(&sentences, &breakpoints, params.min_chunk_size, params.max_chunk_size))
    }
}

fn consecutive_similarities(embeddings: &[Vec<f32>]) -> Vec<f32> {
    embeddings
        .windows(2)
        .map(|w| DistanceMetric::Cosine.similarity(&w[0], &w[1]))
        .collect()
}

/// 20th-percentile of `similarities`, clamped to `[0.40, 0.90]`.
pub fn breakpoint_threshold(similarities: &[f32]) -> f32 {
    if similarities.is_empty() {
        return MAX_BREAKPOINT_THRESHOLD;
    }
    let mut sorted = similarities.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((sorted.len() as f32) * BREAKPOINT_PERCENTILE).floor() as usize;
    let idx = idx.min(sorted.len() - 1);
    sorted[idx].clamp(MIN_BREAKPOINT_THRESHOLD, MAX_BREAKPOINT_THRESHOLD)
}

/// Walk `sentences`, flushing into chunks at breakpoints (subject to
/// `min_chunk_size`) or when the next sentence would exceed `max_chunk_size`.
/// Merges a too-small trailing chunk into its predecessor when that stays
/// within bounds.
fn group_sentences(
    sentences: &[String],
    breakpoints: &[bool],
    min_chunk_size: usize,
    max_chunk_size: usize,
) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for (i, sentence) in sentences.iter().enumerate() {
        let would_exceed = !current.is_empty() && current.len() + 1 + sentence.len() > max_chunk_size;
        if would_exceed {
            chunks.push(std::mem::take(&mut current));
        }

        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(sentence);

        let at_breakpoint = i < breakpoints.len() && breakpoints[i];
        if at_breakpoint && current.len() >= min_chunk_size {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    if chunks.len() >= 2 {
        let last_len = chunks.last().unwrap().len();
        if last_len < min_chunk_size {
            let merged_len = chunks[chunks.len() - 2].len() + 1 + last_len;
            if merged_len <= max_chunk_size {
                let last = chunks.pop().unwrap();
                let prev = chunks.last_mut().unwrap();
                prev.push(' ');
                prev.push_str(&last);
            }
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentence_split_basic() {
        let sentences = split_sentences("Cats purr. Dogs bark. Birds chirp.", 200);
        assert_eq!(sentences, vec!["Cats purr.", "Dogs bark.", "Birds chirp."]);
    }

    #[test]
    fn sentence_split_falls_back_to_newlines_without_terminal_punctuation() {
        let sentences = split_sentences("first paragraph\n\nsecond paragraph", 200);
        assert_eq!(sentences, vec!["first paragraph", "second paragraph"]);
    }

    #[test]
    fn oversized_sentence_is_force_split() {
        let long = "word ".repeat(200);
        let sentences = split_sentences(&format!("{long}."), 40);
        assert!(sentences.len() > 1);
        assert!(sentences.iter().all(|s| s.len() <= 200 / 4 + 10));
    }

    #[test]
    fn breakpoint_threshold_clamped_low() {
        let similarities = vec![0.01, 0.02, 0.03, 0.9, 0.95];
        let t = breakpoint_threshold(&similarities);
        assert!(t >= MIN_BREAKPOINT_THRESHOLD);
    }

    #[test]
    fn breakpoint_threshold_clamped_high() {
        let similarities = vec![0.95, 0.96, 0.97, 0.98, 0.99];
        let t = breakpoint_threshold(&similarities);
        assert!(t <= MAX_BREAKPOINT_THRESHOLD);
    }

    #[test]
    fn grouping_respects_min_and_max() {
        let sentences: Vec<String> = vec!["aaaaaaaaaa", "bbbbbbbbbb", "cccccccccc", "dddddddddd"]
            .into_iter()
            .map(String::from)
            .collect();
        let breakpoints = vec![true, true, true, true];
        let chunks = group_sentences(&sentences, &breakpoints, 5, 100);
        assert_eq!(chunks.len(), 4);
        for c in &chunks {
            assert!(c.len() <= 100);
        }
    }

    #[test]
    fn recursive_chunker_respects_size() {
        let chunker = RecursiveChunker::new(20, 5);
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let chunks = chunker.chunk(text);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(!c.is_empty());
        }
    }

    #[test]
    fn recursive_chunker_empty_text() {
        let chunker = RecursiveChunker::new(100, 10);
        assert!(chunker.chunk("").is_empty());
    }
}
