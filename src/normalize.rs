//! # Normalization
//!
//! Pure string functions producing the comparison keys every other stage
//! consumes: normalized text, folded titles, significant words, surnames
//! and year plausibility.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::config::defaults;

/// Function words dropped from normalized titles (Latin, English, German).
const TITLE_STOPWORDS: &[&str] = &[
    "a", "ab", "ad", "cum", "de", "e", "et", "ex", "in", "per", "pro", "sive", "seu", "the", "of",
    "and", "or", "to", "from", "by", "with", "for", "von", "und", "der", "die", "das", "des",
    "dem", "den", "ein", "eine",
];

/// Generic bibliographic nouns that never identify a work on their own.
const GENERIC_TITLE_WORDS: &[&str] = &[
    "liber", "libri", "libro", "opus", "opera", "tractatus", "summa",
];

/// Minimum length of a significant title word.
pub const MIN_SIGNIFICANT_WORD_LEN: usize = 4;

/// Plausible publication year range; years outside it are treated as missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearBounds {
    pub min: i32,
    pub max: i32,
}

impl Default for YearBounds {
    fn default() -> Self {
        Self {
            min: defaults::YEAR_MIN,
            max: defaults::YEAR_MAX,
        }
    }
}

impl YearBounds {
    #[inline]
    pub fn contains(&self, year: i32) -> bool {
        (self.min..=self.max).contains(&year)
    }
}

/// Check a year against the default plausible range.
pub fn plausible_year(year: i32) -> bool {
    YearBounds::default().contains(year)
}

/// Lowercase, strip diacritics, expand ligatures and turn punctuation into spaces.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.nfkd().filter(|c| !is_combining_mark(*c)) {
        for lower in ch.to_lowercase() {
            match lower {
                'æ' => out.push_str("ae"),
                'œ' => out.push_str("oe"),
                'ß' => out.push_str("ss"),
                c if c.is_alphanumeric() => out.push(c),
                _ => out.push(' '),
            }
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fold Latin orthographic variants (`v`→`u`, `j`→`i`).
pub fn fold_latin(token: &str) -> String {
    token
        .chars()
        .map(|c| match c {
            'v' => 'u',
            'j' => 'i',
            other => other,
        })
        .collect()
}

fn is_title_stopword(token: &str) -> bool {
    TITLE_STOPWORDS.contains(&token)
}

fn is_generic_word(token: &str) -> bool {
    GENERIC_TITLE_WORDS.contains(&token)
}

/// Normalized, folded, stopword-free title.
pub fn normalize_title(title: &str) -> String {
    normalize_text(title)
        .split(' ')
        .filter(|token| !token.is_empty() && !is_title_stopword(token))
        .map(fold_latin)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Distinct significant title words in order of first appearance.
pub fn significant_words(title: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for token in normalize_text(title).split(' ') {
        if token.chars().count() < MIN_SIGNIFICANT_WORD_LEN
            || is_title_stopword(token)
            || is_generic_word(token)
        {
            continue;
        }
        let folded = fold_latin(token);
        if !words.contains(&folded) {
            words.push(folded);
        }
    }
    words
}

/// First `n` words of a normalized title, joined by spaces.
pub fn title_prefix(title_normalized: &str, n: usize) -> Option<String> {
    if title_normalized.is_empty() || n == 0 {
        return None;
    }
    Some(
        title_normalized
            .split(' ')
            .take(n)
            .collect::<Vec<_>>()
            .join(" "),
    )
}

static LIFE_DATES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*\d+[^)]*\)").expect("valid regex"));

/// Extract a lowercased, diacritic-free surname from a free-form author string.
///
/// Parentheticals containing digits are removed, the text before the
/// first comma is kept, and the first capitalized token with at least
/// three alphanumeric characters wins. Falls back to the first token of
/// that length when nothing is capitalized.
pub fn extract_surname(name: &str) -> Option<String> {
    let stripped = LIFE_DATES_RE.replace_all(name, " ");
    let head = stripped.split(',').next().unwrap_or_default();

    let core = |token: &str| -> String { token.chars().filter(|c| c.is_alphanumeric()).collect() };
    let tokens: Vec<String> = head
        .split_whitespace()
        .map(core)
        .filter(|token| token.chars().count() >= 3)
        .collect();

    let chosen = tokens
        .iter()
        .find(|token| token.chars().next().is_some_and(char::is_uppercase))
        .or_else(|| tokens.first())?;

    let surname = normalize_text(chosen);
    if surname.is_empty() {
        None
    } else {
        Some(surname.replace(' ', ""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text_strips_diacritics_and_punctuation() {
        assert_eq!(normalize_text("Ćœlestium, Orbium!"), "coelestium orbium");
        assert_eq!(normalize_text("  Æneis -- Vergilius "), "aeneis vergilius");
        assert_eq!(normalize_text("Straße"), "strasse");
        assert_eq!(normalize_text("¿?!"), "");
    }

    #[test]
    fn test_normalize_title_folds_latin_spelling() {
        assert_eq!(
            normalize_title("DE REVOLVTIONIBVS ORBIVM COELESTIVM"),
            normalize_title("De revolutionibus orbium coelestium")
        );
        assert_eq!(normalize_title("Iustitia et Jus"), "iustitia ius");
    }

    #[test]
    fn test_significant_words_drop_generic_and_short() {
        let words = significant_words("Liber de natura rerum et de natura");
        assert_eq!(words, vec!["natura".to_string(), "rerum".to_string()]);
        assert!(significant_words("Opera omnia").contains(&"omnia".to_string()));
        assert!(significant_words("De in ad et").is_empty());
    }

    #[test]
    fn test_title_prefix() {
        assert_eq!(
            title_prefix("reuolutionibus orbium coelestium libri sex", 3).as_deref(),
            Some("reuolutionibus orbium coelestium")
        );
        assert_eq!(title_prefix("", 3), None);
    }

    #[test]
    fn test_extract_surname_variants() {
        assert_eq!(extract_surname("Copernicus, Nicolaus").as_deref(), Some("copernicus"));
        assert_eq!(
            extract_surname("Ficino, Marsilio (1433-1499)").as_deref(),
            Some("ficino")
        );
        assert_eq!(
            extract_surname("(1433-1499) Marsilio Ficino").as_deref(),
            Some("marsilio")
        );
        assert_eq!(extract_surname("pico della mirandola").as_deref(), Some("pico"));
        assert_eq!(extract_surname("Dürer, Albrecht").as_deref(), Some("durer"));
        assert_eq!(extract_surname(""), None);
        assert_eq!(extract_surname("A. B."), None);
    }

    #[test]
    fn test_year_bounds() {
        assert!(plausible_year(1543));
        assert!(!plausible_year(1399));
        assert!(!plausible_year(2001));
        let bounds = YearBounds { min: 1450, max: 1500 };
        assert!(bounds.contains(1450));
        assert!(!bounds.contains(1543));
    }
}
