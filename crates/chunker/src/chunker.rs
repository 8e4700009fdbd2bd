//! Token-bounded text chunking.
//!
//! Splitting prefers paragraph breaks, then line breaks, and only hard-splits
//! a single line when it alone exceeds the budget. Consecutive units are
//! packed greedily into a chunk until the next one would overflow it.
//!
//! Every chunk is a contiguous slice of the input; the only text dropped is
//! the line/paragraph separator sitting exactly on a chunk boundary.

use crate::tokenizer::{TokenEstimator, heuristic_tokens};

const PARAGRAPH_BREAK: &str = "\n\n";
const LINE_BREAK: &str = "\n";

/// Hard-split candidates are capped at this many characters per budget token.
const HARD_SPLIT_WINDOW_CHARS_PER_TOKEN: usize = 32;

/// An ordered, 0-indexed slice of the submitted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
}

/// Partitions text into chunks of at most `max_tokens` estimated tokens.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    max_tokens: usize,
    estimator: TokenEstimator,
}

impl Chunker {
    pub fn new(max_tokens: usize, estimator: TokenEstimator) -> Self {
        Self {
            max_tokens: max_tokens.max(1),
            estimator,
        }
    }

    /// Chunker counting with the named tiktoken encoding (or the heuristic
    /// when that encoding cannot be loaded).
    pub fn for_encoding(max_tokens: usize, encoding_name: &str) -> Self {
        Self::new(max_tokens, TokenEstimator::for_encoding(encoding_name))
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn estimator(&self) -> TokenEstimator {
        self.estimator
    }

    /// Split `text` and attach chunk indices.
    pub fn chunks(&self, text: &str) -> Vec<Chunk> {
        self.split(text)
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk { index, text })
            .collect()
    }

    /// Split `text` into ordered, non-empty pieces.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        if self.fits(text) {
            return vec![text.to_string()];
        }

        let mut acc = Accumulator::new(self);

        for (p, paragraph) in text.split(PARAGRAPH_BREAK).enumerate() {
            let paragraph_sep = if p == 0 { "" } else { PARAGRAPH_BREAK };
            if self.fits(paragraph) {
                acc.push(paragraph_sep, paragraph);
                continue;
            }

            for (l, line) in paragraph.split(LINE_BREAK).enumerate() {
                let line_sep = if l == 0 { paragraph_sep } else { LINE_BREAK };
                if self.fits(line) {
                    acc.push(line_sep, line);
                    continue;
                }

                for (i, piece) in self.hard_split(line).into_iter().enumerate() {
                    acc.push(if i == 0 { line_sep } else { "" }, piece);
                }
            }
        }

        let chunks = acc.finish();
        tracing::debug!(
            chunks = chunks.len(),
            max_tokens = self.max_tokens,
            exact = self.estimator.is_exact(),
            "split text into chunks"
        );
        chunks
    }

    fn fits(&self, text: &str) -> bool {
        self.estimator.count(text) <= self.max_tokens
    }

    /// Cut an over-budget line into pieces that each fit.
    ///
    /// Each piece is the longest prefix (on a char boundary) of a bounded
    /// candidate window that still fits; at least one char is always taken.
    fn hard_split<'t>(&self, line: &'t str) -> Vec<&'t str> {
        let window = self.max_tokens.saturating_mul(HARD_SPLIT_WINDOW_CHARS_PER_TOKEN);
        let mut pieces = Vec::new();
        let mut rest = line;

        while !rest.is_empty() {
            // ends[k - 1] is the byte offset just past the first k chars.
            let ends: Vec<usize> = rest
                .char_indices()
                .map(|(i, c)| i + c.len_utf8())
                .take(window)
                .collect();

            let (mut lo, mut hi) = (1, ends.len());
            while lo < hi {
                let mid = (lo + hi + 1) / 2;
                if self.fits(&rest[..ends[mid - 1]]) {
                    lo = mid;
                } else {
                    hi = mid - 1;
                }
            }

            let end = ends[lo - 1];
            pieces.push(&rest[..end]);
            rest = &rest[end..];
        }

        pieces
    }
}

/// Greedy packer for consecutive units.
struct Accumulator<'c> {
    chunker: &'c Chunker,
    chunks: Vec<String>,
    current: String,
    chars: usize,
    tokens: usize,
}

impl<'c> Accumulator<'c> {
    fn new(chunker: &'c Chunker) -> Self {
        Self {
            chunker,
            chunks: Vec::new(),
            current: String::new(),
            chars: 0,
            tokens: 0,
        }
    }

    /// Append `unit`, preceded by the separator it had in the input.
    fn push(&mut self, sep: &str, unit: &str) {
        if self.current.is_empty() {
            self.start(unit);
            return;
        }

        let sep_chars = sep.chars().count();
        let unit_chars = unit.chars().count();
        let (projected, added_tokens) = match self.chunker.estimator {
            TokenEstimator::Heuristic => (heuristic_tokens(self.chars + sep_chars + unit_chars), 0),
            estimator => {
                let added = estimator.count(sep) + estimator.count(unit);
                (self.tokens + added, added)
            }
        };

        if projected > self.chunker.max_tokens {
            self.flush();
            self.start(unit);
            return;
        }

        self.current.push_str(sep);
        self.current.push_str(unit);
        self.chars += sep_chars + unit_chars;
        self.tokens += added_tokens;
    }

    fn start(&mut self, unit: &str) {
        if unit.is_empty() {
            return;
        }
        self.current.push_str(unit);
        self.chars = unit.chars().count();
        self.tokens = match self.chunker.estimator {
            TokenEstimator::Heuristic => 0,
            estimator => estimator.count(unit),
        };
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.chunks.push(std::mem::take(&mut self.current));
        }
        self.chars = 0;
        self.tokens = 0;
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.chunks
    }
}
