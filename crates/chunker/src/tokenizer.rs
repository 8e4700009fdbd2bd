//! Token estimation: exact BPE counts when the encoding is available,
//! otherwise a deterministic characters-per-token heuristic.

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

static O200K_BASE: OnceLock<Option<CoreBPE>> = OnceLock::new();
static CL100K_BASE: OnceLock<Option<CoreBPE>> = OnceLock::new();
static P50K_BASE: OnceLock<Option<CoreBPE>> = OnceLock::new();
static R50K_BASE: OnceLock<Option<CoreBPE>> = OnceLock::new();

const CHARS_PER_TOKEN: usize = 4;

/// Counts tokens for budget decisions.
///
/// One estimator is picked per chunking call and used for every unit of
/// that call, so exact and heuristic counts are never mixed.
#[derive(Clone, Copy)]
pub enum TokenEstimator {
    Exact(&'static CoreBPE),
    Heuristic,
}

impl core::fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TokenEstimator::Exact(_) => f.write_str("TokenEstimator::Exact"),
            TokenEstimator::Heuristic => f.write_str("TokenEstimator::Heuristic"),
        }
    }
}

impl TokenEstimator {
    /// Resolve an encoding by name.
    ///
    /// Unknown names fall back to `o200k_base`; if no BPE table can be
    /// loaded at all the heuristic is used.
    pub fn for_encoding(name: &str) -> Self {
        let bpe = match name {
            "cl100k_base" => load(&CL100K_BASE, tiktoken_rs::cl100k_base),
            "p50k_base" => load(&P50K_BASE, tiktoken_rs::p50k_base),
            "r50k_base" => load(&R50K_BASE, tiktoken_rs::r50k_base),
            "o200k_base" => load(&O200K_BASE, tiktoken_rs::o200k_base),
            other => {
                tracing::debug!(encoding = other, "unknown encoding, using o200k_base");
                load(&O200K_BASE, tiktoken_rs::o200k_base)
            }
        };

        match bpe {
            Some(bpe) => TokenEstimator::Exact(bpe),
            None => {
                tracing::warn!(encoding = name, "tokenizer unavailable, using length heuristic");
                TokenEstimator::Heuristic
            }
        }
    }

    pub fn heuristic() -> Self {
        TokenEstimator::Heuristic
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, TokenEstimator::Exact(_))
    }

    /// Estimated token count of `text`.
    pub fn count(&self, text: &str) -> usize {
        match self {
            TokenEstimator::Exact(bpe) => bpe.encode_with_special_tokens(text).len(),
            TokenEstimator::Heuristic => heuristic_tokens(text.chars().count()),
        }
    }
}

/// `chars / 4`, never below 1.
pub(crate) fn heuristic_tokens(chars: usize) -> usize {
    (chars / CHARS_PER_TOKEN).max(1)
}

fn load<E>(
    cell: &'static OnceLock<Option<CoreBPE>>,
    init: fn() -> Result<CoreBPE, E>,
) -> Option<&'static CoreBPE>
where
    E: core::fmt::Display,
{
    cell.get_or_init(|| match init() {
        Ok(bpe) => Some(bpe),
        Err(e) => {
            tracing::warn!(error = %e, "failed to initialize BPE table");
            None
        }
    })
    .as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_is_quarter_length_with_floor_of_one() {
        let est = TokenEstimator::heuristic();
        assert_eq!(est.count(""), 1);
        assert_eq!(est.count("abc"), 1);
        assert_eq!(est.count("abcdefgh"), 2);
        assert_eq!(est.count(&"x".repeat(400)), 100);
    }

    #[test]
    fn heuristic_counts_characters_not_bytes() {
        let est = TokenEstimator::heuristic();
        assert_eq!(est.count("äöüß"), 1);
        assert_eq!(est.count("äöüßäöüß"), 2);
    }

    #[test]
    fn exact_counts_are_deterministic() {
        let est = TokenEstimator::for_encoding("o200k_base");
        let text = "The quick brown fox jumps over the lazy dog.";
        assert_eq!(est.count(text), est.count(text));
        assert!(est.count(text) > 0);
    }
}
