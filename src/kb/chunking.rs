//! Document chunking for the knowledge base.
//!
//! Splits document text into chunks of at most [`MAX_CHUNK_CHARS`]
//! characters, preferring paragraph boundaries, falling back to sentence
//! boundaries, and hard-splitting only when a single sentence exceeds the
//! budget. Adjacent chunks share roughly 15 % overlap (the tail of the
//! previous chunk is prefixed to the next) so a fact straddling a boundary
//! is still retrievable from either side. The budget is strict: overlap is
//! dropped for a chunk whose own content already fills it.

/// Maximum characters per chunk.
pub const MAX_CHUNK_CHARS: usize = 1_500;

/// Share of a chunk carried into the next one as overlap.
const OVERLAP_PERCENT: usize = 15;

/// Split `text` into chunks using the default budget.
#[must_use]
pub fn chunk_text(text: &str) -> Vec<String> {
    chunk_text_with(text, MAX_CHUNK_CHARS)
}

/// Split `text` into chunks of at most `max_chars` characters.
#[must_use]
pub fn chunk_text_with(text: &str, max_chars: usize) -> Vec<String> {
    let mut state = Packer::new(max_chars);

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        if paragraph.len() <= max_chars {
            state.push_unit(paragraph, "\n\n");
            continue;
        }

        // Paragraph alone exceeds the budget: fall back to sentences.
        for sentence in split_sentences(paragraph) {
            if sentence.len() <= max_chars {
                state.push_unit(sentence, " ");
                continue;
            }
            // A single sentence exceeds the budget: hard character split,
            // leaving headroom for the overlap carry.
            let piece_budget = (max_chars - max_chars * OVERLAP_PERCENT / 100 - 1).max(1);
            for piece in hard_split(sentence, piece_budget) {
                state.push_unit(piece, " ");
                state.flush();
            }
        }
    }

    state.finish()
}

/// Greedy packer: accumulates units into `buf`, prefixing each new chunk
/// with the overlap tail of the previous one when it fits.
struct Packer {
    max_chars: usize,
    chunks: Vec<String>,
    buf: String,
    carry: String,
}

impl Packer {
    fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            chunks: Vec::new(),
            buf: String::new(),
            carry: String::new(),
        }
    }

    fn push_unit(&mut self, unit: &str, separator: &str) {
        if !self.buf.is_empty() {
            let projected =
                self.carry_cost() + self.buf.len() + separator.len() + unit.len();
            if projected > self.max_chars {
                self.flush();
            }
        }
        if self.buf.is_empty() && self.carry_cost() + unit.len() > self.max_chars {
            // No room for the overlap next to this unit; the unit wins.
            self.carry.clear();
        }
        if !self.buf.is_empty() {
            self.buf.push_str(separator);
        }
        self.buf.push_str(unit);
    }

    fn flush(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let chunk = if self.carry.is_empty() {
            std::mem::take(&mut self.buf)
        } else {
            let joined = format!("{} {}", self.carry, self.buf);
            self.buf.clear();
            joined
        };
        self.carry = overlap_tail(&chunk, self.max_chars);
        self.chunks.push(chunk);
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.chunks
    }

    fn carry_cost(&self) -> usize {
        if self.carry.is_empty() {
            0
        } else {
            self.carry.len() + 1
        }
    }
}

/// Trailing slice of `chunk` to prefix onto the next chunk, roughly 15 %
/// of the budget, starting at a word boundary where possible. Chunks that
/// fit inside the overlap window carry nothing.
fn overlap_tail(chunk: &str, max_chars: usize) -> String {
    let target = max_chars * OVERLAP_PERCENT / 100;
    if target == 0 || chunk.len() <= target {
        return String::new();
    }
    let mut start = chunk.len() - target;
    while !chunk.is_char_boundary(start) {
        start += 1;
    }
    let tail = &chunk[start..];
    match tail.find(char::is_whitespace) {
        Some(space) => tail[space..].trim_start().to_string(),
        None => tail.to_string(),
    }
}

/// Split a paragraph into sentences on `.`, `!`, `?` followed by
/// whitespace. The trailing fragment (no terminator) is its own sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if matches!(ch, '.' | '!' | '?') {
            let boundary = match chars.peek() {
                Some((_, next)) => next.is_whitespace(),
                None => true,
            };
            if boundary {
                let end = idx + ch.len_utf8();
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = end;
            }
        }
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

/// Hard split at character boundaries, preferring to break at whitespace.
fn hard_split(text: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        if remaining.len() <= max_chars {
            pieces.push(remaining);
            break;
        }
        let mut split_at = max_chars;
        while split_at > 0 && !remaining.is_char_boundary(split_at) {
            split_at -= 1;
        }
        if split_at == 0 {
            // A single char wider than the budget; take it whole rather
            // than looping.
            split_at = max_chars;
            while split_at < remaining.len() && !remaining.is_char_boundary(split_at) {
                split_at += 1;
            }
        }
        let cut = remaining[..split_at]
            .rfind(char::is_whitespace)
            .map(|pos| pos + 1)
            .filter(|pos| *pos > 1)
            .unwrap_or(split_at);
        let piece = remaining[..cut].trim_end();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        remaining = remaining[cut..].trim_start();
    }
    pieces
}
