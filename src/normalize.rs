//! Headword normalization
//!
//! The same [`Normalizer`] is used to build an index and to query it; the index
//! keeps the normalizer it was built with so the two can never drift apart.

use unicode_normalization::UnicodeNormalization;

/// Punctuation ignored by containers that strip keys
const STRIPPED_PUNCTUATION: &[char] = &[
    '(', ')', '.', ',', '-', '&', '\'', '/', '\\', '@', '_', '$', '!',
];

/// Combining Diacritical Marks block
fn is_stripped_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036f}').contains(&c)
}

/// Headword normalization policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Normalizer {
    pub strip_punctuation: bool,
}

impl Normalizer {
    pub fn new(strip_punctuation: bool) -> Self {
        Normalizer { strip_punctuation }
    }

    /// Fold a raw headword or query into an index key.
    ///
    /// Lowercases, removes accents, drops control characters and collapses
    /// whitespace. Total, deterministic and idempotent. Case folding runs on
    /// the compatibility decomposition, which can itself yield capitals.
    pub fn normalize(&self, raw: &str) -> String {
        let folded: String = raw
            .nfkd()
            .flat_map(char::to_lowercase)
            .nfkd()
            .filter(|c| !is_stripped_mark(*c))
            .nfc()
            .filter(|c| !c.is_control() || c.is_whitespace())
            .filter(|c| !(self.strip_punctuation && STRIPPED_PUNCTUATION.contains(c)))
            .collect();

        folded.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}
