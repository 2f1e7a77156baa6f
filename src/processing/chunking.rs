//! Paragraph-aware chunking with sentence-tail overlap.
//!
//! The chunker turns normalized document text into overlapping passages
//! bounded by a target size. Packing happens at three levels:
//!
//! - Paragraphs are greedily accumulated until the next one would overflow
//!   the target size; the buffer is then flushed and the next chunk is seeded
//!   with the trailing sentences of the flushed one, so passages that straddle
//!   a boundary stay retrievable.
//! - A paragraph that alone exceeds the target size is packed sentence by
//!   sentence with the same overlap rule.
//! - A single sentence that exceeds the target size is hard-split at the size
//!   boundary. This is the only path that produces chunks without overlap.
//!
//! Output is deterministic and preserves document order.

use crate::processing::normalize::normalize;

/// Default target chunk size in bytes of UTF-8 text.
pub const DEFAULT_TARGET_SIZE: usize = 1200;

/// Paragraphs shorter than this are treated as noise and dropped.
const MIN_PARAGRAPH_LEN: usize = 40;

/// Chunks shorter than this are dropped from the final output.
const MIN_CHUNK_LEN: usize = 80;

/// Number of trailing sentences carried into the next chunk as overlap.
const OVERLAP_SENTENCES: usize = 2;

/// Split `text` into overlapping chunks of roughly `target_size` bytes.
///
/// Returns an empty vector when the input contains no paragraph that survives
/// filtering. Chunks appear in document order, each at least [`MIN_CHUNK_LEN`]
/// bytes, with no two adjacent chunks identical.
pub fn chunk_text(text: &str, target_size: usize) -> Vec<String> {
    let normalized = normalize(text);
    let paragraphs: Vec<&str> = normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|paragraph| paragraph.len() >= MIN_PARAGRAPH_LEN)
        .collect();

    let mut chunks = Vec::new();
    let mut buffer = String::new();

    for paragraph in paragraphs {
        if paragraph.len() > target_size {
            flush(&mut buffer, &mut chunks);
            pack_sentences(paragraph, target_size, &mut buffer, &mut chunks);
            continue;
        }

        if buffer.is_empty() {
            buffer.push_str(paragraph);
        } else if buffer.len() + 2 + paragraph.len() <= target_size {
            buffer.push_str("\n\n");
            buffer.push_str(paragraph);
        } else {
            let seed = trailing_sentences(&buffer, OVERLAP_SENTENCES).to_string();
            chunks.push(std::mem::take(&mut buffer));
            if !seed.is_empty() {
                buffer.push_str(&seed);
                buffer.push_str("\n\n");
            }
            buffer.push_str(paragraph);
        }
    }

    flush(&mut buffer, &mut chunks);
    finalize(chunks)
}

/// Greedily pack the sentences of an oversized paragraph.
fn pack_sentences(paragraph: &str, target_size: usize, buffer: &mut String, chunks: &mut Vec<String>) {
    for sentence in split_sentences(paragraph) {
        if sentence.len() > target_size {
            // Degenerate case: one sentence larger than the whole chunk budget.
            // No overlap is possible here.
            flush(buffer, chunks);
            hard_split(sentence, target_size, chunks);
            continue;
        }

        if buffer.is_empty() {
            buffer.push_str(sentence);
        } else if buffer.len() + 1 + sentence.len() <= target_size {
            buffer.push(' ');
            buffer.push_str(sentence);
        } else {
            let seed = trailing_sentences(buffer, OVERLAP_SENTENCES).to_string();
            chunks.push(std::mem::take(buffer));
            if !seed.is_empty() && seed.len() + 1 + sentence.len() <= target_size {
                buffer.push_str(&seed);
                buffer.push(' ');
            }
            buffer.push_str(sentence);
        }
    }
}

/// Split an oversized sentence into fixed-size pieces at character boundaries.
fn hard_split(sentence: &str, target_size: usize, chunks: &mut Vec<String>) {
    let mut piece = String::with_capacity(target_size);
    for ch in sentence.chars() {
        piece.push(ch);
        if piece.len() >= target_size {
            chunks.push(std::mem::take(&mut piece));
        }
    }
    if !piece.trim().is_empty() {
        chunks.push(piece);
    }
}

fn flush(buffer: &mut String, chunks: &mut Vec<String>) {
    if !buffer.trim().is_empty() {
        chunks.push(std::mem::take(buffer));
    } else {
        buffer.clear();
    }
}

/// Re-normalize, enforce the minimum length, and collapse adjacent duplicates.
fn finalize(chunks: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for chunk in chunks {
        let cleaned = normalize(&chunk);
        if cleaned.len() < MIN_CHUNK_LEN {
            continue;
        }
        if out.last().is_some_and(|previous| previous == &cleaned) {
            continue;
        }
        out.push(cleaned);
    }
    out
}

/// Byte offsets at which sentences start within `text`.
///
/// A sentence boundary is sentence-ending punctuation (optionally followed by
/// a closing quote or bracket), then whitespace, then an uppercase letter or
/// digit.
fn sentence_starts(text: &str) -> Vec<usize> {
    let mut starts = vec![0];
    let mut iter = text.char_indices().peekable();

    while let Some((index, ch)) = iter.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }

        let mut end = index + ch.len_utf8();
        while let Some(&(next_index, next)) = iter.peek() {
            if matches!(next, '"' | '\'' | ')' | ']' | '\u{201d}' | '\u{2019}') {
                end = next_index + next.len_utf8();
                iter.next();
            } else {
                break;
            }
        }

        let mut whitespace = 0;
        for c in text[end..].chars() {
            if c.is_whitespace() {
                whitespace += c.len_utf8();
            } else {
                break;
            }
        }
        if whitespace == 0 {
            continue;
        }

        let candidate = end + whitespace;
        if text[candidate..]
            .chars()
            .next()
            .is_some_and(|c| c.is_uppercase() || c.is_ascii_digit())
        {
            starts.push(candidate);
        }
    }

    starts
}

/// Sentences of `text` in order, trimmed.
fn split_sentences(text: &str) -> Vec<&str> {
    let starts = sentence_starts(text);
    let mut sentences = Vec::with_capacity(starts.len());
    for (position, &start) in starts.iter().enumerate() {
        let end = starts.get(position + 1).copied().unwrap_or(text.len());
        let sentence = text[start..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
    }
    sentences
}

/// The suffix of `text` covering its last `count` sentences.
fn trailing_sentences(text: &str, count: usize) -> &str {
    let starts = sentence_starts(text);
    let index = starts.len().saturating_sub(count);
    text[starts[index]..].trim()
}
