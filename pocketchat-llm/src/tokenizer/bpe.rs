//! Pre-tokenization and the greedy rank-ordered merge loop.
use regex::Regex;
use std::sync::LazyLock;

use super::vocab::MergeTable;

/// Sentinel glyph standing in for a literal space inside vocabulary tokens.
pub const SPACE_GLYPH: char = 'Ġ';
/// Sentinel glyph standing in for a literal newline.
pub const NEWLINE_GLYPH: char = 'Ċ';

// ASCII whitespace only: U+00A0 and other Unicode spaces stay inside their word.
static CHUNKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^\t\n\x0B\x0C\r ]+|[\t\n\x0B\x0C\r ]+").expect("static pre-tokenizer pattern")
});

/// Split into maximal runs of non-whitespace and of whitespace, keeping every
/// character. Only ASCII whitespace separates runs.
pub fn pre_tokenize(text: &str) -> impl Iterator<Item = &str> {
    CHUNKS.find_iter(text).map(|m| m.as_str())
}

/// Replace spaces and newlines with their sentinel glyphs.
pub fn to_glyphs(chunk: &str) -> String {
    chunk
        .chars()
        .map(|c| match c {
            ' ' => SPACE_GLYPH,
            '\n' => NEWLINE_GLYPH,
            c => c,
        })
        .collect()
}

/// Inverse of [`to_glyphs`].
pub fn from_glyphs(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            SPACE_GLYPH => ' ',
            NEWLINE_GLYPH => '\n',
            c => c,
        })
        .collect()
}

/// Apply merge rules to one pre-tokenized chunk.
///
/// At each step the adjacent pair with the lowest rank is merged everywhere it
/// occurs (left to right, non-overlapping). Stops when one symbol remains or
/// no adjacent pair has a rank.
pub fn bpe(token: &str, merges: &MergeTable) -> Vec<String> {
    let mut word: Vec<String> = token.chars().map(String::from).collect();
    if word.len() <= 1 {
        return vec![token.to_string()];
    }

    while word.len() > 1 {
        let best = word
            .windows(2)
            .filter_map(|pair| merges.rank(&pair[0], &pair[1]).map(|rank| (rank, pair)))
            .min_by_key(|(rank, _)| *rank)
            .map(|(_, pair)| (pair[0].clone(), pair[1].clone()));

        let Some((first, second)) = best else {
            break;
        };

        let mut merged = Vec::with_capacity(word.len());
        let mut i = 0;
        while i < word.len() {
            if i + 1 < word.len() && word[i] == first && word[i + 1] == second {
                merged.push(format!("{first}{second}"));
                i += 2;
            } else {
                merged.push(std::mem::take(&mut word[i]));
                i += 1;
            }
        }
        word = merged;
    }

    word
}
