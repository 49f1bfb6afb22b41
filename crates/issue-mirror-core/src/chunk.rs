//! Recursive text splitter with overlap.
//!
//! Issue documents can be far longer than an embedding model accepts, so
//! each one is split into [`Chunk`]s of at most `max_chars` characters.
//!
//! # Algorithm
//!
//! 1. Break the text into pieces no longer than `max_chars`, trying
//!    separators from coarse to fine: paragraphs (`\n\n`), lines (`\n`),
//!    sentences (`. `), words (` `), and finally a hard character split.
//!    A piece is only broken further when it is still too long.
//! 2. Pack pieces greedily into chunks without exceeding `max_chars`.
//! 3. Every chunk after the first begins with up to `overlap_chars` of the
//!    previous chunk's tail, cut on a word boundary, so a sentence that
//!    straddles two chunks is still embedded with some context.
//! 4. Empty text yields exactly one empty chunk.
//!
//! Lengths are counted in `char`s, never bytes, so multi-byte text never
//! splits inside a code point.
//!
//! # Example
//!
//! ```rust
//! use issue_mirror_core::chunk::{chunk_document, SplitConfig};
//!
//! let chunks = chunk_document("12", "Hello world.\n\nSecond paragraph.", &SplitConfig::default());
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Chunk size limits, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            max_chars: 18_000,
            overlap_chars: 500,
        }
    }
}

/// One piece of an issue document, ready to embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub issue_number: String,
    pub chunk_index: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// Split `text` into chunk texts. See the module docs for the algorithm.
pub fn split_text(text: &str, config: &SplitConfig) -> Vec<String> {
    let max_chars = config.max_chars.max(1);

    let mut atoms = Vec::new();
    atomize(text, max_chars, &SEPARATORS, &mut atoms);

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    let mut has_content = false;

    for atom in atoms {
        let atom_len = char_len(atom);
        if has_content && current_len + atom_len > max_chars {
            let budget = config.overlap_chars.min(max_chars - atom_len);
            let next = overlap_tail(&current, budget).to_string();
            push_trimmed(&mut chunks, &current);
            current_len = char_len(&next);
            current = next;
        }
        current.push_str(atom);
        current_len += atom_len;
        has_content = true;
    }
    if has_content {
        push_trimmed(&mut chunks, &current);
    }

    if chunks.is_empty() {
        chunks.push(text.trim().to_string());
    }
    chunks
}

/// Split an issue document and wrap each piece in a [`Chunk`].
///
/// Indices are contiguous from 0.
pub fn chunk_document(issue_number: &str, text: &str, config: &SplitConfig) -> Vec<Chunk> {
    split_text(text, config)
        .into_iter()
        .enumerate()
        .map(|(index, piece)| make_chunk(issue_number, index, piece))
        .collect()
}

fn atomize<'a>(text: &'a str, max_chars: usize, separators: &[&str], out: &mut Vec<&'a str>) {
    if char_len(text) <= max_chars {
        if !text.is_empty() {
            out.push(text);
        }
        return;
    }

    match separators.split_first() {
        Some((sep, finer)) => {
            for piece in text.split_inclusive(*sep) {
                atomize(piece, max_chars, finer, out);
            }
        }
        None => hard_split(text, max_chars, out),
    }
}

fn hard_split<'a>(text: &'a str, max_chars: usize, out: &mut Vec<&'a str>) {
    let mut remaining = text;
    while !remaining.is_empty() {
        let cut = remaining
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());
        out.push(&remaining[..cut]);
        remaining = &remaining[cut..];
    }
}

/// The last `budget` characters of `raw`, moved forward to the start of
/// a word.
fn overlap_tail(raw: &str, budget: usize) -> &str {
    if budget == 0 {
        return "";
    }
    let total = char_len(raw);
    if total <= budget {
        return raw.trim_start();
    }

    let start = raw
        .char_indices()
        .nth(total - budget)
        .map(|(i, _)| i)
        .unwrap_or(raw.len());
    let tail = &raw[start..];
    let at_boundary = raw[..start]
        .chars()
        .next_back()
        .map_or(true, char::is_whitespace);

    let tail = if at_boundary {
        tail
    } else {
        match tail.find(char::is_whitespace) {
            Some(pos) => &tail[pos..],
            None => "",
        }
    };
    tail.trim_start()
}

fn push_trimmed(chunks: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn make_chunk(issue_number: &str, index: usize, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        issue_number: issue_number.to_string(),
        chunk_index: index,
        text,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n)
            .map(|i| format!("word{:02}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn cfg(max_chars: usize, overlap_chars: usize) -> SplitConfig {
        SplitConfig {
            max_chars,
            overlap_chars,
        }
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_document("1", "Hello, world!", &SplitConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].issue_number, "1");
    }

    #[test]
    fn test_empty_text_yields_one_empty_chunk() {
        let chunks = chunk_document("1", "", &SplitConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "");
    }

    #[test]
    fn test_chunks_respect_max_chars() {
        let text = format!("{}\n\n{}\n{}", words(30), words(12), words(50));
        for c in split_text(&text, &cfg(60, 20)) {
            assert!(c.chars().count() <= 60, "chunk too long: {:?}", c);
        }
    }

    #[test]
    fn test_paragraphs_kept_whole_when_they_fit() {
        let text = "First paragraph here.\n\nSecond paragraph here.";
        let chunks = split_text(text, &cfg(30, 0));
        assert_eq!(chunks, vec!["First paragraph here.", "Second paragraph here."]);
    }

    #[test]
    fn test_no_overlap_preserves_every_word_once() {
        let text = words(40);
        let chunks = split_text(&text, &cfg(50, 0));
        assert!(chunks.len() > 1);
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn test_overlap_repeats_tail_of_previous_chunk() {
        let text = words(40);
        let chunks = split_text(&text, &cfg(50, 15));
        assert!(chunks.len() > 1);

        for pair in chunks.windows(2) {
            let first_word = pair[1].split(' ').next().unwrap();
            assert!(
                pair[0].contains(first_word),
                "{:?} does not start inside {:?}",
                pair[1],
                pair[0]
            );
            assert!(pair[1].chars().count() <= 50);
        }
        assert_eq!(chunks[1].split(' ').next(), Some("word05"));
    }

    #[test]
    fn test_overlap_never_cuts_a_word() {
        let text = words(60);
        for c in split_text(&text, &cfg(45, 10)) {
            for w in c.split(' ') {
                assert_eq!(w.len(), 6, "partial word {:?} in {:?}", w, c);
            }
        }
    }

    #[test]
    fn test_hard_split_for_unbroken_text() {
        let text = "x".repeat(25);
        let chunks = split_text(&text, &cfg(10, 0));
        assert_eq!(chunks, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);
    }

    #[test]
    fn test_multibyte_text_splits_on_char_boundaries() {
        let text = "Ошибка при запуске 🚀\n日本語のログ出力が壊れる";
        let chunks = split_text(text, &cfg(7, 2));
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.chars().count() <= 7);
        }
    }

    #[test]
    fn test_chunk_indices_contiguous() {
        let text = (0..50)
            .map(|i| format!("Step {} to reproduce.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_document("9", &text, &cfg(40, 10));
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i, "Index mismatch at position {}", i);
        }
    }

    #[test]
    fn test_deterministic_text_and_hash() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let c1 = chunk_document("1", text, &cfg(12, 4));
        let c2 = chunk_document("1", text, &cfg(12, 4));
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.hash, b.hash);
            assert_ne!(a.id, b.id);
        }
    }
}
