//! Overlapping text chunkers.
//!
//! Splits document text into ordered [`Chunk`]s under one of two
//! strategies, both defaulting to `chunk_size = 2000` and
//! `chunk_overlap = 200`:
//!
//! | Strategy | Unit | Cut points |
//! |----------|------|------------|
//! | [`ChunkStrategy::Markdown`] | characters | headings, then paragraphs, lines, sentences, words; hard cut as a last resort |
//! | [`ChunkStrategy::Token`] | tokens (Unicode word-boundary segments) | fixed-size sliding window |
//!
//! The two strategies produce very different index densities for the same
//! document (2000 tokens is several times longer than 2000 characters), so
//! the strategy is part of the index configuration.
//!
//! # Algorithm
//!
//! 1. Split the text into units (characters or tokens).
//! 2. Open a window of `chunk_size` units at the current start.
//! 3. Pick a cut point inside the window (markdown: the latest structural
//!    boundary in the second half of the window; token: the window end).
//! 4. Emit `[start, cut)` as a chunk, then start the next window at
//!    `cut - chunk_overlap`, so the last `chunk_overlap` units of chunk *n*
//!    are exactly the first `chunk_overlap` units of chunk *n + 1*.
//!
//! Chunks are never trimmed: concatenating the first chunk with every later
//! chunk minus its leading overlap reproduces the input exactly.
//!
//! # Example
//!
//! ```rust
//! use blinko_ai_core::chunk::Chunker;
//!
//! let chunks = Chunker::markdown().split("note-1", "# Title\n\nShort note.");
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].sequence_index, 0);
//! ```

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use unicode_segmentation::UnicodeSegmentation;

use crate::models::Chunk;

pub const DEFAULT_CHUNK_SIZE: usize = 2000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Structural separators in order of preference, with the offset of the cut
/// relative to the match start.
const MARKDOWN_SEPARATORS: &[(&str, usize)] = &[
    ("\n#", 1),
    ("\n\n", 2),
    ("\n", 1),
    (". ", 2),
    (" ", 1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    /// Structure-aware splitting measured in characters.
    #[default]
    Markdown,
    /// Budget-aware sliding window measured in tokens.
    Token,
}

/// A configured chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    strategy: ChunkStrategy,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// # Errors
    ///
    /// Fails if `chunk_size` is zero or `chunk_overlap >= chunk_size`.
    pub fn new(strategy: ChunkStrategy, chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            bail!("chunk_size must be > 0");
        }
        if chunk_overlap >= chunk_size {
            bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap,
                chunk_size
            );
        }
        Ok(Self {
            strategy,
            chunk_size,
            chunk_overlap,
        })
    }

    /// Structure-aware chunker with the default 2000/200 character budget.
    pub fn markdown() -> Self {
        Self {
            strategy: ChunkStrategy::Markdown,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }

    /// Sliding-window chunker with the default 2000/200 token budget.
    pub fn token_budget() -> Self {
        Self {
            strategy: ChunkStrategy::Token,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }

    pub fn strategy(&self) -> ChunkStrategy {
        self.strategy
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into ordered chunks belonging to `source_id`.
    ///
    /// Empty or whitespace-only text yields no chunks. Output is
    /// deterministic for identical input.
    pub fn split(&self, source_id: &str, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let units = match self.strategy {
            ChunkStrategy::Markdown => Units::chars(text),
            ChunkStrategy::Token => Units::tokens(text),
        };
        let n = units.len();

        let mut chunks = Vec::new();
        let mut start = 0;
        loop {
            let hard_end = (start + self.chunk_size).min(n);
            let end = if hard_end == n {
                n
            } else {
                match self.strategy {
                    ChunkStrategy::Markdown => self.structural_cut(text, &units, start, hard_end),
                    ChunkStrategy::Token => hard_end,
                }
            };

            chunks.push(make_chunk(source_id, chunks.len(), text, &units, start, end));

            if end == n {
                break;
            }
            start = end - self.chunk_overlap;
        }
        chunks
    }

    /// Latest structural boundary in `[min_cut, hard_end]`, or `hard_end`.
    ///
    /// `min_cut` keeps chunks at least half full and guarantees the next
    /// window starts after the current one.
    fn structural_cut(&self, text: &str, units: &Units, start: usize, hard_end: usize) -> usize {
        let min_cut = start + (self.chunk_overlap + 1).max(self.chunk_size / 2);
        let window_start = units.byte(start);
        let window = &text[window_start..units.byte(hard_end)];
        let min_byte = units.byte(min_cut);

        for (sep, offset) in MARKDOWN_SEPARATORS {
            if let Some(pos) = window.rfind(sep) {
                let cut_byte = window_start + pos + offset;
                if cut_byte >= min_byte {
                    if let Some(cut) = units.index_of_byte(cut_byte) {
                        return cut;
                    }
                }
            }
        }
        hard_end
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::markdown()
    }
}

/// Split text into the tokens used by [`ChunkStrategy::Token`].
///
/// Tokens are Unicode word-boundary segments (words, runs of whitespace,
/// punctuation), so they concatenate back to the original text.
pub fn tokenize(text: &str) -> Vec<&str> {
    text.split_word_bounds().collect()
}

/// Unit boundaries of a text: byte and character offsets of every unit
/// start, plus a final entry for the end of the text.
struct Units {
    bytes: Vec<usize>,
    chars: Vec<usize>,
}

impl Units {
    fn chars(text: &str) -> Self {
        let bytes: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let chars = (0..bytes.len()).collect();
        Self { bytes, chars }
    }

    fn tokens(text: &str) -> Self {
        let mut bytes = Vec::new();
        let mut chars = Vec::new();
        let mut char_pos = 0;
        for (byte_pos, token) in text.split_word_bound_indices() {
            bytes.push(byte_pos);
            chars.push(char_pos);
            char_pos += token.chars().count();
        }
        bytes.push(text.len());
        chars.push(char_pos);
        Self { bytes, chars }
    }

    fn len(&self) -> usize {
        self.bytes.len() - 1
    }

    fn byte(&self, unit: usize) -> usize {
        self.bytes[unit]
    }

    fn index_of_byte(&self, byte: usize) -> Option<usize> {
        self.bytes.binary_search(&byte).ok()
    }
}

fn make_chunk(
    source_id: &str,
    sequence_index: usize,
    text: &str,
    units: &Units,
    start: usize,
    end: usize,
) -> Chunk {
    let slice = &text[units.bytes[start]..units.bytes[end]];
    let mut hasher = Sha256::new();
    hasher.update(slice.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        source_id: source_id.to_string(),
        sequence_index,
        text: slice.to_string(),
        start_offset: units.chars[start],
        end_offset: units.chars[end],
        hash,
    }
}
