//! Text normalization and brand/model/type resolution.

mod matcher;

pub use matcher::{MatchError, MatchMethod, MatchResult, SmartMatcher};

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalize a string for comparison: lowercase, strip accents via NFD
/// decomposition, collapse internal whitespace, trim.
pub fn normalize(s: &str) -> String {
    let stripped: String = s
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Filler words ignored by the significant-parts heuristic.
fn is_stopword(word: &str) -> bool {
    matches!(
        word,
        "de" | "do" | "da" | "o" | "a" | "e" | "em" | "com" | "para" | "cv" | "hp" | "v"
    )
}

/// Whether `target` contains at least two significant tokens of `source`.
/// Tokens shorter than two characters and stopwords do not count.
pub fn contains_significant_parts(target: &str, source: &str) -> bool {
    let target_lower = target.to_lowercase();
    let mut matches = 0;

    for part in source.to_lowercase().split_whitespace() {
        if part.len() < 2 || is_stopword(part) {
            continue;
        }
        if target_lower.contains(part) {
            matches += 1;
            if matches >= 2 {
                return true;
            }
        }
    }
    false
}
