use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Sentence-ending punctuation followed by whitespace
static SENTENCE_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+\s+").expect("sentence boundary pattern is valid"));

/// A bounded-size unit of text submitted as one synthesis request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub index: usize,
    pub text: String,
    /// Size of the payload actually sent to the provider (after enrichment)
    pub byte_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SegmentError {
    #[error("maxSegmentBytes {max_bytes} leaves no room for text (markup overhead is {overhead} bytes)")]
    BudgetTooSmall { max_bytes: usize, overhead: usize },
}

/// Collapse runs of whitespace into single spaces and trim. Idempotent.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split text into ordered segments whose measured size stays within `max_bytes`.
///
/// `measure` returns the wire size of a candidate segment (raw length for plain
/// text, enriched length when markup is applied). Sentences are packed first; a
/// sentence that cannot fit alone is packed word by word, and a word that cannot
/// fit alone is cut at character boundaries. Nothing is dropped: the only segment
/// allowed over budget is a single character that cannot be split further.
pub fn segment<F>(text: &str, max_bytes: usize, measure: F) -> Result<Vec<Segment>, SegmentError>
where
    F: Fn(&str) -> usize,
{
    let overhead = measure("");
    if max_bytes <= overhead {
        return Err(SegmentError::BudgetTooSmall { max_bytes, overhead });
    }

    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return Ok(Vec::new());
    }

    let mut packer = Packer::new(max_bytes, &measure);
    for sentence in split_sentences(&normalized) {
        if measure(sentence) <= max_bytes {
            packer.push(sentence);
            continue;
        }
        for word in sentence.split(' ') {
            if measure(word) <= max_bytes {
                packer.push(word);
            } else {
                for piece in split_chars(word, max_bytes, &measure) {
                    packer.push(piece);
                }
            }
        }
    }

    Ok(packer.finish())
}

/// Split normalized text into sentences, keeping terminal punctuation.
/// Text without any boundary comes back as a single sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut last_end = 0;

    for mat in SENTENCE_BOUNDARY.find_iter(text) {
        let sentence = text[last_end..mat.end()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        last_end = mat.end();
    }

    let remaining = text[last_end..].trim();
    if !remaining.is_empty() {
        sentences.push(remaining);
    }

    sentences
}

/// Cut a word into the longest character runs that fit the budget
fn split_chars<'t, F>(word: &'t str, max_bytes: usize, measure: &F) -> Vec<&'t str>
where
    F: Fn(&str) -> usize,
{
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut end = 0;

    for (offset, ch) in word.char_indices() {
        let next_end = offset + ch.len_utf8();
        if end > start && measure(&word[start..next_end]) > max_bytes {
            pieces.push(&word[start..end]);
            start = end;
        }
        end = next_end;
    }
    if end > start {
        pieces.push(&word[start..end]);
    }

    pieces
}

/// Accumulates units into a buffer joined by single spaces and flushes on overflow
struct Packer<'m, F> {
    max_bytes: usize,
    measure: &'m F,
    buffer: String,
    segments: Vec<Segment>,
}

impl<'m, F> Packer<'m, F>
where
    F: Fn(&str) -> usize,
{
    fn new(max_bytes: usize, measure: &'m F) -> Self {
        Self {
            max_bytes,
            measure,
            buffer: String::new(),
            segments: Vec::new(),
        }
    }

    fn push(&mut self, unit: &str) {
        if self.buffer.is_empty() {
            self.buffer.push_str(unit);
            return;
        }

        let candidate = format!("{} {}", self.buffer, unit);
        if (self.measure)(&candidate) <= self.max_bytes {
            self.buffer = candidate;
        } else {
            self.flush();
            self.buffer.push_str(unit);
        }
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.buffer);
        let byte_size = (self.measure)(&text);
        self.segments.push(Segment {
            index: self.segments.len(),
            text,
            byte_size,
        });
    }

    fn finish(mut self) -> Vec<Segment> {
        self.flush();
        self.segments
    }
}
