
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Largest buffer the chunker will grow before emitting a chunk, in characters.
/// A single paragraph longer than this is emitted as-is.
pub const MAX_CHUNK_CHARS: usize = 2000;

/// Chunks whose trimmed text is this long or shorter are discarded.
pub const MIN_CHUNK_CHARS: usize = 100;

const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];

/// Source metadata attached to a page and inherited by its chunks
pub type Metadata = BTreeMap<String, String>;

/// Text extracted from one page (or one whole file, for formats without pages)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub text: String,
    pub metadata: Metadata,
}

impl Page {
    #[inline]
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }
}

/// The atomic retrievable unit written to the vector index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: Metadata,
}

impl Chunk {
    #[inline]
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Split pages into paragraph-aligned chunks with a sentence-fragment overlap.
///
/// Pages are processed independently and in order; the output order is page
/// order followed by emission order within each page.
#[inline]
pub fn chunk_pages(pages: &[Page]) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for page in pages {
        chunk_page(page, &mut chunks);
    }

    let emitted = chunks.len();
    chunks.retain(|chunk| chunk.char_len() > MIN_CHUNK_CHARS);

    debug!(
        "Chunked {} pages into {} chunks ({} discarded as too short, avg {} chars)",
        pages.len(),
        chunks.len(),
        emitted - chunks.len(),
        chunks.iter().map(Chunk::char_len).sum::<usize>() / chunks.len().max(1)
    );

    chunks
}

fn chunk_page(page: &Page, chunks: &mut Vec<Chunk>) {
    let mut buffer = String::new();
    let mut buffer_len = 0;

    let paragraphs = page
        .text
        .split("\n\n")
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty());

    for paragraph in paragraphs {
        let paragraph_len = paragraph.chars().count();

        if buffer_len + paragraph_len > MAX_CHUNK_CHARS && !buffer.is_empty() {
            chunks.push(Chunk {
                text: buffer.trim().to_string(),
                metadata: page.metadata.clone(),
            });

            let overlap = overlap_seed(&buffer);
            buffer = if overlap.is_empty() {
                paragraph.to_string()
            } else {
                format!("{} {}", overlap, paragraph)
            };
            buffer_len = buffer.chars().count();
        } else {
            if !buffer.is_empty() {
                buffer.push(' ');
                buffer_len += 1;
            }
            buffer.push_str(paragraph);
            buffer_len += paragraph_len;
        }
    }

    if !buffer.trim().is_empty() {
        chunks.push(Chunk {
            text: buffer.trim().to_string(),
            metadata: page.metadata.clone(),
        });
    }
}

/// Text following the last sentence terminator, trimmed.
///
/// Empty when the buffer has no terminator at all, or ends on one.
fn overlap_seed(buffer: &str) -> &str {
    if !buffer.contains(SENTENCE_TERMINATORS) {
        return "";
    }

    buffer
        .rsplit(SENTENCE_TERMINATORS)
        .next()
        .unwrap_or_default()
        .trim()
}
