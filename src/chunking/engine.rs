//! Greedy line-packing chunker
//!
//! Splits diffs and free text into pieces that fit a per-call cost budget:
//! - Lines are packed in order until the next one would overflow the budget
//! - The tail of each closed chunk is repeated at the head of the next one
//! - A single line larger than the budget still becomes its own chunk
//!
//! Output depends only on the input and the configuration, so a payload can be
//! re-chunked on every call and addressed by `(chunk_index)` alone.

use super::models::{Chunk, ChunkingConfig};
use super::size_estimator::{HeuristicEstimator, SizeEstimator};
use crate::metrics::METRICS;
use std::sync::Arc;
use tracing::debug;

/// Characters per cost unit used for raw slicing. Slightly under the
/// estimator's ratio to leave room for syntax bonuses.
const CHARS_PER_COST: usize = 3;

/// Chunking engine
pub struct ChunkingEngine {
    estimator: Arc<dyn SizeEstimator>,
}

impl Default for ChunkingEngine {
    fn default() -> Self {
        Self::new(Arc::new(HeuristicEstimator::default()))
    }
}

impl ChunkingEngine {
    /// Create a new engine with a custom estimator
    pub fn new(estimator: Arc<dyn SizeEstimator>) -> Self {
        Self { estimator }
    }

    /// The estimator used for budgeting
    pub fn estimator(&self) -> &Arc<dyn SizeEstimator> {
        &self.estimator
    }

    /// Chunk a diff or any newline-separated payload
    pub fn chunk_text(&self, text: &str, config: &ChunkingConfig) -> Vec<Chunk> {
        let lines: Vec<&str> = text.lines().collect();
        self.chunk(&lines, config)
    }

    /// Split ordered lines into bounded chunks
    pub fn chunk<S: AsRef<str>>(&self, lines: &[S], config: &ChunkingConfig) -> Vec<Chunk> {
        if lines.iter().all(|line| line.as_ref().trim().is_empty()) {
            return Vec::new();
        }

        let overlap = config.effective_overlap();
        let costs: Vec<usize> = lines
            .iter()
            .map(|line| self.estimator.estimate_line(line.as_ref()))
            .collect();

        // Inclusive (start, end) spans into `lines`
        let mut spans: Vec<(usize, usize)> = Vec::new();
        let mut start = 0;
        let mut len = 0;
        let mut seeded = 0;
        let mut running = 0;

        for (i, &cost) in costs.iter().enumerate() {
            if len > 0 && running + cost > config.max_cost {
                spans.push((start, start + len - 1));

                // Only lines that were new in the closed chunk are carried,
                // so an overlap line never lands in three chunks.
                let mut carry = overlap.min(len - seeded);
                let mut carry_cost: usize = costs[i - carry..i].iter().sum();
                while carry > 0 && carry_cost + cost > config.max_cost {
                    carry_cost -= costs[i - carry];
                    carry -= 1;
                }

                start = i - carry;
                len = carry;
                seeded = carry;
                running = carry_cost;
            }

            len += 1;
            running += cost;
        }

        if len > 0 {
            spans.push((start, start + len - 1));
        }

        let total_chunks = spans.len();
        let chunks: Vec<Chunk> = spans
            .into_iter()
            .enumerate()
            .map(|(chunk_index, (start_line, end_line))| {
                let content = lines[start_line..=end_line]
                    .iter()
                    .map(|line| line.as_ref())
                    .collect::<Vec<_>>()
                    .join("\n");
                let estimated_cost = self.estimator.estimate(&content);
                Chunk {
                    content,
                    start_line,
                    end_line,
                    chunk_index,
                    total_chunks,
                    estimated_cost,
                }
            })
            .collect();

        debug!(
            "Chunked {} lines into {} chunks (max_cost={}, overlap={})",
            lines.len(),
            chunks.len(),
            config.max_cost,
            overlap
        );
        METRICS.record_chunking(chunks.len());

        chunks
    }

    /// Split free text into budget-sized pieces.
    ///
    /// With `preserve_structure`, pieces break at paragraph boundaries, then
    /// sentence boundaries, and only slice raw characters when a single
    /// sentence is over budget. Without it, text is sliced at a fixed size.
    pub fn chunk_plain_text(
        &self,
        text: &str,
        preserve_structure: bool,
        config: &ChunkingConfig,
    ) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let max_chars = (config.max_cost * CHARS_PER_COST).max(1);
        if !preserve_structure {
            return slice_chars(text, max_chars);
        }

        let paragraphs = text
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty());

        let mut pieces = Vec::new();
        let mut current = String::new();

        for paragraph in paragraphs {
            if self.estimator.estimate(paragraph) > config.max_cost {
                flush(&mut current, &mut pieces);
                pieces.extend(self.pack_sentences(paragraph, config.max_cost, max_chars));
                continue;
            }
            self.pack(&mut current, &mut pieces, paragraph, "\n\n", config.max_cost);
        }
        flush(&mut current, &mut pieces);

        pieces
    }

    fn pack_sentences(&self, paragraph: &str, max_cost: usize, max_chars: usize) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut current = String::new();

        for sentence in split_sentences(paragraph) {
            if self.estimator.estimate(sentence) > max_cost {
                flush(&mut current, &mut pieces);
                pieces.extend(slice_chars(sentence, max_chars));
                continue;
            }
            self.pack(&mut current, &mut pieces, sentence, " ", max_cost);
        }
        flush(&mut current, &mut pieces);

        pieces
    }

    /// Append `part` to `current`, closing `current` first if it would overflow
    fn pack(
        &self,
        current: &mut String,
        pieces: &mut Vec<String>,
        part: &str,
        separator: &str,
        max_cost: usize,
    ) {
        if current.is_empty() {
            current.push_str(part);
            return;
        }

        let candidate = format!("{}{}{}", current, separator, part);
        if self.estimator.estimate(&candidate) > max_cost {
            flush(current, pieces);
            current.push_str(part);
        } else {
            *current = candidate;
        }
    }
}

fn flush(current: &mut String, pieces: &mut Vec<String>) {
    if !current.is_empty() {
        pieces.push(std::mem::take(current));
    }
}

/// Split after `.`, `!` or `?` followed by whitespace or end of text
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut begin = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
            if at_boundary {
                let end = idx + c.len_utf8();
                let sentence = text[begin..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                begin = end;
            }
        }
    }

    let rest = text[begin..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }

    sentences
}

/// Slice on char boundaries into pieces of at most `max_chars` characters
fn slice_chars(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|piece| piece.iter().collect::<String>())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every line costs exactly one unit
    struct UnitEstimator;

    impl SizeEstimator for UnitEstimator {
        fn estimate(&self, text: &str) -> usize {
            text.lines().count()
        }
    }

    fn numbered_lines(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("line {}", i)).collect()
    }

    fn unit_engine() -> ChunkingEngine {
        ChunkingEngine::new(Arc::new(UnitEstimator))
    }

    #[test]
    fn test_empty_payload_yields_no_chunks() {
        let engine = ChunkingEngine::default();
        let config = ChunkingConfig::default();
        assert!(engine.chunk_text("", &config).is_empty());
        assert!(engine.chunk(&["   ", "\t", ""], &config).is_empty());
    }

    #[test]
    fn test_single_chunk_when_everything_fits() {
        let engine = ChunkingEngine::default();
        let lines = numbered_lines(10);
        let chunks = engine.chunk(&lines, &ChunkingConfig::default());

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].total_chunks, 1);
        assert_eq!(chunks[0].start_line, 0);
        assert_eq!(chunks[0].end_line, 9);
        assert_eq!(chunks[0].content, lines.join("\n"));
        assert!(!chunks[0].has_next());
    }

    #[test]
    fn test_four_chunks_with_three_line_overlap() {
        let engine = unit_engine();
        let lines = numbered_lines(100);
        let config = ChunkingConfig {
            max_cost: 28,
            overlap_lines: 3,
            preserve_context: true,
        };

        let chunks = engine.chunk(&lines, &config);
        assert_eq!(chunks.len(), 4);

        for pair in chunks.windows(2) {
            let previous: Vec<&str> = pair[0].content.lines().collect();
            let next: Vec<&str> = pair[1].content.lines().collect();
            assert_eq!(&next[..3], &previous[previous.len() - 3..]);
            assert_eq!(pair[1].start_line, pair[0].end_line - 2);
        }
        assert_eq!(chunks[3].end_line, 99);
    }

    #[test]
    fn test_no_overlap_without_preserve_context() {
        let engine = unit_engine();
        let lines = numbered_lines(20);
        let config = ChunkingConfig {
            max_cost: 5,
            overlap_lines: 3,
            preserve_context: false,
        };

        let chunks = engine.chunk(&lines, &config);
        assert_eq!(chunks.len(), 4);
        for pair in chunks.windows(2) {
            assert_eq!(pair[1].start_line, pair[0].end_line + 1);
        }
    }

    #[test]
    fn test_contiguous_indices_and_shared_total() {
        let engine = ChunkingEngine::default();
        let text = (0..400)
            .map(|i| format!("+    let value_{} = compute({});", i, i))
            .collect::<Vec<_>>()
            .join("\n");
        let config = ChunkingConfig {
            max_cost: 300,
            ..Default::default()
        };

        let chunks = engine.chunk_text(&text, &config);
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.total_chunks, chunks.len());
        }
        for pair in chunks.windows(2) {
            assert!(pair[0].start_line <= pair[1].start_line);
        }
    }

    #[test]
    fn test_every_line_covered_and_overlap_in_exactly_two() {
        let engine = ChunkingEngine::default();
        let lines: Vec<String> = (0..250)
            .map(|i| "x".repeat(5 + (i * 37) % 90))
            .collect();
        let config = ChunkingConfig {
            max_cost: 120,
            overlap_lines: 4,
            preserve_context: true,
        };

        let chunks = engine.chunk(&lines, &config);
        let mut seen = vec![0usize; lines.len()];
        for chunk in &chunks {
            assert_eq!(chunk.content, lines[chunk.start_line..=chunk.end_line].join("\n"));
            for count in &mut seen[chunk.start_line..=chunk.end_line] {
                *count += 1;
            }
        }

        assert!(seen.iter().all(|&count| count == 1 || count == 2));
        for pair in chunks.windows(2) {
            let overlap_start = pair[1].start_line;
            for line in overlap_start..=pair[0].end_line {
                assert_eq!(seen[line], 2);
            }
        }
    }

    #[test]
    fn test_budget_respected_except_oversized_lines() {
        let engine = ChunkingEngine::default();
        let mut lines: Vec<String> = (0..120).map(|i| format!("fn item_{}() {{}}", i)).collect();
        lines.insert(40, "y".repeat(2000));
        let config = ChunkingConfig {
            max_cost: 100,
            ..Default::default()
        };

        let chunks = engine.chunk(&lines, &config);
        let oversized = chunks
            .iter()
            .filter(|c| c.estimated_cost > config.max_cost)
            .collect::<Vec<_>>();

        assert_eq!(oversized.len(), 1);
        assert_eq!(oversized[0].line_count(), 1);
        assert_eq!(oversized[0].start_line, 40);
    }

    #[test]
    fn test_deterministic_output() {
        let engine = ChunkingEngine::default();
        let text = (0..300)
            .map(|i| format!("-    old_call({});\n+    new_call({}, ctx);", i, i))
            .collect::<Vec<_>>()
            .join("\n");
        let config = ChunkingConfig {
            max_cost: 250,
            ..Default::default()
        };

        let first = engine.chunk_text(&text, &config);
        let second = engine.chunk_text(&text, &config);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_plain_text_prefers_paragraphs() {
        let engine = unit_engine();
        let config = ChunkingConfig {
            max_cost: 4,
            ..Default::default()
        };
        let text = "one\ntwo\n\nthree\n\nfour\nfive\nsix";

        let pieces = engine.chunk_plain_text(text, true, &config);
        assert_eq!(pieces, vec!["one\ntwo\n\nthree", "four\nfive\nsix"]);
    }

    #[test]
    fn test_plain_text_falls_back_to_sentences_then_slices() {
        let engine = ChunkingEngine::default();
        let config = ChunkingConfig {
            max_cost: 10,
            ..Default::default()
        };
        let long_sentence = "z".repeat(100);
        let text = format!("Short one. Another short one! {}.", long_sentence);

        let pieces = engine.chunk_plain_text(&text, true, &config);
        assert_eq!(pieces[0], "Short one. Another short one!");
        assert_eq!(pieces.len(), 5);
        assert!(pieces[1..].iter().all(|p| p.chars().count() <= 30));
        assert_eq!(pieces[1..].concat(), format!("{}.", long_sentence));
    }

    #[test]
    fn test_plain_text_fixed_slicing() {
        let engine = ChunkingEngine::default();
        let config = ChunkingConfig {
            max_cost: 2,
            ..Default::default()
        };

        let pieces = engine.chunk_plain_text("abcdefghijklmn", false, &config);
        assert_eq!(pieces, vec!["abcdef", "ghijkl", "mn"]);
        assert!(engine.chunk_plain_text("  \n ", true, &config).is_empty());
    }

    #[test]
    fn test_split_sentences() {
        let sentences = split_sentences("First. Second? v1.2 stays whole! Tail");
        assert_eq!(sentences, vec!["First.", "Second?", "v1.2 stays whole!", "Tail"]);
    }
}
