//! `chunkflow-chunker`
//!
//! Splits arbitrarily large text into ordered, token-bounded chunks along
//! natural boundaries (paragraphs, then lines, then a hard split).

pub mod chunker;
pub mod tokenizer;

pub use chunker::{Chunk, Chunker};
pub use tokenizer::TokenEstimator;
