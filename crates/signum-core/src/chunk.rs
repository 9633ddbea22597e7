//! Word-window text chunker.
//!
//! Splits text on whitespace and emits fixed-size windows of words with a
//! configurable overlap between consecutive windows. Output is a pure
//! function of the input, so re-indexing an unchanged file reproduces the
//! same chunk boundaries (and therefore the same chunk ids).

/// Window size used when the caller passes a non-positive `chunk_words`.
pub const FALLBACK_CHUNK_WORDS: i64 = 400;

/// A single window of words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub chunk_index: usize,
    pub text: String,
}

/// Split `text` into overlapping word windows.
///
/// - `chunk_words <= 0` is replaced by [`FALLBACK_CHUNK_WORDS`].
/// - `overlap_words` is clamped to `[0, chunk_words / 2]`.
/// - Each window starts `chunk_words - overlap` words after the previous one,
///   and the last window always ends at the final word.
/// - Empty or whitespace-only input yields no chunks.
pub fn chunk_text_words(text: &str, chunk_words: i64, overlap_words: i64) -> Vec<TextChunk> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let size = if chunk_words <= 0 {
        FALLBACK_CHUNK_WORDS
    } else {
        chunk_words
    } as usize;
    let overlap = overlap_words.clamp(0, (size / 2) as i64) as usize;

    let n = words.len();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let end = n.min(start + size);
        chunks.push(TextChunk {
            chunk_index: chunks.len(),
            text: words[start..end].join(" "),
        });
        if end == n {
            break;
        }
        start = end - overlap;
    }

    chunks
}
