//! Unicode-normalized word tokenizer feeding the C6 radix trie.
//!
//! Grounded on `milli`'s own tokenization layer (it also leans on
//! `unicode-segmentation`/`unicode-normalization` ahead of its own
//! `charabia` crate): normalize to NFC, then split on Unicode word
//! boundaries, lowercasing each token for case-insensitive matching.

use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

/// A single token and the byte offset (in normalized-text token-count
/// order, not raw byte index) it occupies within its field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub position: u32,
}

/// Tokenizes one field value's text into ordered, position-tagged words.
pub fn tokenize(text: &str) -> Vec<Token> {
    let normalized: String = text.nfc().collect();
    normalized
        .unicode_words()
        .enumerate()
        .map(|(i, word)| Token { text: word.to_lowercase(), position: i as u32 })
        .collect()
}
