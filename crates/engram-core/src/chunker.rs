//! Content Chunker
//!
//! Splits large text into overlapping chunks so long documents stay
//! retrievable: each chunk is small enough to embed well, and the overlap
//! suffix carried into the next chunk preserves cross-boundary context.
//!
//! Paragraphs are the preferred split unit; single-paragraph text falls back
//! to sentence segmentation.

use serde::{Deserialize, Serialize};

/// Chunking thresholds, all measured in characters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Content longer than this gets chunked.
    pub min_chunk_size: usize,
    /// Target maximum size of a single chunk.
    pub max_chunk_size: usize,
    /// Suffix of each flushed chunk carried into the next one.
    pub overlap_size: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: 1500,
            max_chunk_size: 1000,
            overlap_size: 100,
        }
    }
}

/// One produced chunk with provenance into the original text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Trimmed chunk text (overlap prefix included)
    pub content: String,
    /// Zero-based position within the parent
    pub index: usize,
    /// Byte offset in the original where this chunk's own segments begin
    pub start: usize,
    /// Byte offset in the original where this chunk's own segments end
    pub end: usize,
}

/// Splits content into overlapping chunks
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// True iff the content is long enough to be split.
    pub fn should_chunk(&self, content: &str) -> bool {
        content.chars().count() > self.config.min_chunk_size
    }

    /// Split content into ordered chunks.
    ///
    /// Returns one chunk per packed segment group. Content at or below the
    /// threshold still produces a single chunk covering the whole text; the
    /// caller decides via [`Chunker::should_chunk`] whether to chunk at all.
    pub fn chunk_content(&self, content: &str) -> Vec<Chunk> {
        let paragraphs = split_paragraphs(content);
        let segments = if paragraphs.len() > 1 {
            paragraphs
        } else {
            split_sentences(content)
        };
        self.pack(content, &segments)
    }

    /// Greedily pack segments into chunks up to `max_chunk_size`, seeding
    /// each new chunk with the overlap suffix of the previous one.
    fn pack(&self, content: &str, segments: &[Segment]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut carry = String::new();
        let mut span: Option<(usize, usize)> = None;

        for segment in segments {
            let text = &content[segment.start..segment.end];
            let segment_chars = text.chars().count();
            let current_chars = current.chars().count();

            let fits = current.is_empty()
                || current_chars + SEPARATOR.len() + segment_chars <= self.config.max_chunk_size;

            if !fits {
                let (start, end) = span.unwrap_or((segment.start, segment.start));
                carry = flush(&mut chunks, &mut current, start, end, self.config.overlap_size);
                span = None;
            }

            if current.is_empty() {
                current = if carry.is_empty() {
                    text.to_string()
                } else {
                    format!("{}{}{}", carry, SEPARATOR, text)
                };
                span = Some((segment.start, segment.end));
            } else {
                current.push_str(SEPARATOR);
                current.push_str(text);
                if let Some((_, end)) = span.as_mut() {
                    *end = segment.end;
                }
            }
        }

        if !current.is_empty() {
            let (start, end) = span.unwrap_or((0, 0));
            flush(&mut chunks, &mut current, start, end, self.config.overlap_size);
        }

        chunks
    }
}

/// Joiner between segments inside one chunk.
const SEPARATOR: &str = "\n\n";

/// Byte range of one segment in the original text
#[derive(Debug, Clone, Copy)]
struct Segment {
    start: usize,
    end: usize,
}

fn flush(
    chunks: &mut Vec<Chunk>,
    current: &mut String,
    start: usize,
    end: usize,
    overlap_size: usize,
) -> String {
    let trimmed = current.trim().to_string();
    let carry = overlap_suffix(&trimmed, overlap_size);
    if !trimmed.is_empty() {
        chunks.push(Chunk {
            content: trimmed,
            index: chunks.len(),
            start,
            end,
        });
    }
    current.clear();
    carry
}

/// Last `overlap_size` characters of the flushed chunk.
fn overlap_suffix(text: &str, overlap_size: usize) -> String {
    if overlap_size == 0 {
        return String::new();
    }
    let chars: Vec<char> = text.chars().collect();
    let skip = chars.len().saturating_sub(overlap_size);
    chars[skip..].iter().collect()
}

/// Split on paragraph boundaries: two or more consecutive newlines.
fn split_paragraphs(content: &str) -> Vec<Segment> {
    let bytes = content.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\n' {
            let mut j = i + 1;
            let mut newlines = 1;
            while j < bytes.len() && (bytes[j] == b'\n' || bytes[j] == b'\r') {
                if bytes[j] == b'\n' {
                    newlines += 1;
                }
                j += 1;
            }
            if newlines >= 2 {
                push_nonempty(content, &mut segments, start, i);
                start = j;
                i = j;
                continue;
            }
        }
        i += 1;
    }
    push_nonempty(content, &mut segments, start, bytes.len());
    segments
}

/// Split on sentence terminators (`.`, `!`, `?`) followed by whitespace or
/// end of input.
fn split_sentences(content: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut chars = content.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let boundary = match chars.peek() {
                None => true,
                Some((_, next)) => next.is_whitespace(),
            };
            if boundary {
                push_nonempty(content, &mut segments, start, i + c.len_utf8());
                start = i + c.len_utf8();
                // Skip the whitespace run after the terminator
                while let Some((j, next)) = chars.peek().copied() {
                    if next.is_whitespace() {
                        chars.next();
                        start = j + next.len_utf8();
                    } else {
                        break;
                    }
                }
            }
        }
    }
    if start < content.len() {
        push_nonempty(content, &mut segments, start, content.len());
    }
    segments
}

fn push_nonempty(content: &str, segments: &mut Vec<Segment>, start: usize, end: usize) {
    if start < end && !content[start..end].trim().is_empty() {
        segments.push(Segment { start, end });
    }
}

// ============================================================================
// TESTS
// ============================================================================
