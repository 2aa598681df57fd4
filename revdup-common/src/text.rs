//! Text helpers shared by comparison-field normalization and colrev_id creation

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Strip accents: NFKD decomposition with combining marks dropped
///
/// No transliteration (ü → u, not ue).
pub fn remove_accents(input: &str) -> String {
    input.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Replace every non-alphanumeric character with a space and collapse whitespace
pub fn alphanumeric_words(input: &str) -> String {
    let replaced: String = input
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    collapse_whitespace(&replaced)
}

/// Collapse runs of whitespace into single spaces and trim
pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Share of uppercase letters among all letters (0.0 when there are no letters)
pub fn uppercase_share(input: &str) -> f64 {
    let letters: Vec<char> = input.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return 0.0;
    }
    let upper = letters.iter().filter(|c| c.is_uppercase()).count();
    upper as f64 / letters.len() as f64
}
