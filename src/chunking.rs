//! Splitting policy documents into overlapping character windows.
//!
//! Chunks are cut on character counts (not tokens), preferring a nearby
//! whitespace boundary so windows don't split words. Each chunk carries a
//! heading derived from its first non-empty line, which later becomes the
//! citation's section label.

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between adjacent chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Maximum length of a derived section heading.
const MAX_HEADING_CHARS: usize = 100;

/// How far to look back from a window edge for a whitespace break.
const BOUNDARY_LOOKBACK_CHARS: usize = 80;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between adjacent chunks in characters.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// A window of a larger document.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// The chunk text content.
    pub text: String,
    /// Zero-based chunk position within the document.
    pub index: usize,
    /// Byte offset where this chunk starts in the original document.
    pub start_offset: usize,
}

/// Split text into overlapping chunks.
///
/// Text shorter than `chunk_size` yields a single chunk; blank text yields
/// none. Window edges prefer a whitespace boundary within the last
/// [`BOUNDARY_LOOKBACK_CHARS`] characters. Safe on multi-byte UTF-8.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let char_count = text.chars().count();
    if char_count <= chunk_size {
        return vec![Chunk {
            text: text.to_string(),
            index: 0,
            start_offset: 0,
        }];
    }

    // char index -> byte offset, with a sentinel for the end of the text
    let byte_at: Vec<usize> = text
        .char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(text.len()))
        .collect();

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < char_count {
        let hard_end = (start + chunk_size).min(char_count);
        let end = if hard_end < char_count {
            break_at_whitespace(text, &byte_at, start, hard_end)
        } else {
            hard_end
        };

        let slice = &text[byte_at[start]..byte_at[end]];
        if !slice.trim().is_empty() {
            chunks.push(Chunk {
                text: slice.to_string(),
                index: chunks.len(),
                start_offset: byte_at[start],
            });
        }

        start += step;

        // Don't emit a trailing fragment much smaller than the window.
        if char_count.saturating_sub(start) < chunk_size / 4
            && !chunks.is_empty()
        {
            break;
        }
    }

    chunks
}

/// Find a whitespace boundary at or before `pos` (a char index), looking
/// back a bounded distance. Returns the char index just past the
/// whitespace, or `pos` when the region contains none.
fn break_at_whitespace(
    text: &str,
    byte_at: &[usize],
    start: usize,
    pos: usize,
) -> usize {
    let lookback = pos.saturating_sub(BOUNDARY_LOOKBACK_CHARS).max(start + 1);
    let region = &text[byte_at[lookback]..byte_at[pos]];

    match region
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
    {
        Some((offset, _)) => lookback + region[..offset].chars().count() + 1,
        None => pos,
    }
}

/// Section heading for a chunk: its first non-empty line, bounded.
pub fn chunk_heading(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
        .chars()
        .take(MAX_HEADING_CHARS)
        .collect()
}
