//! Word lists and (voice, word) pair construction.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::types::{normalize_word, AssetKey};

/// Small built-in list for quick spot audits.
pub const SAMPLE_WORDS: &[&str] = &[
    "apple", "ball", "cat", "dog", "egg", "fish", "goat", "hat", "ice cream",
    "juice", "kite", "lamp", "moon", "nose", "orange", "pig", "queen", "rain",
    "sun", "tree", "umbrella", "van", "water", "yellow", "zebra",
];

/// Parse a comma-separated word list ("dog, cat,ice cream").
pub fn parse_word_list(list: &str) -> Vec<String> {
    dedupe(list.split(','))
}

/// Load a vocabulary file: one word per line, `#` starts a comment line.
pub fn load_vocabulary(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read vocabulary file: {}", path.display()))?;
    let words = dedupe(text.lines().filter(|line| !line.trim_start().starts_with('#')));
    if words.is_empty() {
        bail!("Vocabulary file {} contains no words", path.display());
    }
    Ok(words)
}

/// Normalize words and drop empties and duplicates, keeping first occurrence order.
fn dedupe<'a>(words: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    words
        .map(normalize_word)
        .filter(|w| !w.is_empty())
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// Cross product of voices and words, voice-major.
pub fn cross_pairs(voices: &[String], words: &[String]) -> Vec<AssetKey> {
    voices
        .iter()
        .flat_map(|voice| words.iter().map(move |word| AssetKey::new(voice, word)))
        .collect()
}
