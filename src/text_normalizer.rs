//! # Text Normalizer Module
//!
//! Turns raw OCR text into a form the menu matcher can work with.
//!
//! Steps run strictly in this order:
//!
//! 1. characters other than Hangul syllables, Latin letters, digits and whitespace
//!    become spaces
//! 2. quantity annotations (`350g`, `8000원`, `2인분`) and bare digit runs are removed
//! 3. the OCR correction table is applied
//! 4. standalone modifier words are removed
//! 5. compound names split by the OCR engine (`김치 찌개`) are merged back
//! 6. whitespace is collapsed; results shorter than two characters are discarded
//!
//! `normalize(normalize(x)) == normalize(x)` holds for every input.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error_correction::OcrCorrectionTable;
use crate::ocr::ExtractedSpan;

/// Minimum normalized length (in characters) worth matching
pub const MIN_NORMALIZED_CHARS: usize = 2;

/// Inputs at or below this many characters never fall back to the raw text
const SHRINK_GUARD_MIN_CHARS: usize = 4;

/// Upper bound on repeated normalization passes
const MAX_NORMALIZE_PASSES: usize = 8;

/// Dish-type words that OCR often detaches from the preceding name
const COMPOUND_SUFFIXES: &[&str] = &[
    "찌개", "볶음", "볶음밥", "덮밥", "국밥", "밥", "탕", "국", "전골", "구이", "튀김", "만두",
    "냉면", "칼국수", "까스",
];

lazy_static! {
    static ref NON_LINGUISTIC: Regex =
        Regex::new(r"[^가-힣a-zA-Z0-9\s]").expect("character filter pattern should be valid");
    static ref QUANTITY_WITH_UNIT: Regex = Regex::new(
        r"(?i)\d+\s*(?:kcal|cal|kg|mg|ml|g|l|oz)(?P<next>[^a-z]|$)|\d+\s*(?:원|인분|그램|칼로리|개)"
    )
    .expect("quantity pattern should be valid");
    static ref BARE_DIGITS: Regex =
        Regex::new(r"\b\d+\b").expect("digit pattern should be valid");
}

/// A span after normalization. An empty `normalized_text` means "discard".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSpan {
    pub original_text: String,
    pub normalized_text: String,
    pub confidence: f32,
}

impl NormalizedSpan {
    pub fn is_discarded(&self) -> bool {
        self.normalized_text.is_empty()
    }
}

/// Normalizes OCR text with a fixed correction table
#[derive(Debug, Clone, Default)]
pub struct TextNormalizer {
    table: OcrCorrectionTable,
}

impl TextNormalizer {
    pub fn new(table: OcrCorrectionTable) -> Self {
        Self { table }
    }

    pub fn correction_table(&self) -> &OcrCorrectionTable {
        &self.table
    }

    /// Normalize raw OCR text
    ///
    /// # Examples
    ///
    /// ```rust
    /// use menu_nutrition::text_normalizer::TextNormalizer;
    ///
    /// let normalizer = TextNormalizer::default();
    /// assert_eq!(normalizer.normalize("매운 김치째개"), "김치찌개");
    /// assert_eq!(normalizer.normalize("된장 찌게 (1인분) 8,000원"), "된장찌개");
    /// assert_eq!(normalizer.normalize("!"), "");
    /// ```
    pub fn normalize(&self, raw: &str) -> String {
        // A later step can expose work for an earlier one (dropping `매운`
        // from `B1 매운 개` leaves the quantity `1 개`), so run to a fixpoint
        let mut current = self.normalize_pass(raw);
        for _ in 1..MAX_NORMALIZE_PASSES {
            let next = self.normalize_pass(&current);
            if next == current {
                return current;
            }
            current = next;
        }
        trace!(raw = %raw, "Normalization did not settle");
        current
    }

    fn normalize_pass(&self, raw: &str) -> String {
        let stripped = strip_non_linguistic(raw);
        let cleaned = remove_quantities(&stripped);

        if over_stripped(raw, &cleaned) {
            trace!(raw = %raw, "Normalization removed most of the text, keeping original");
            return raw.trim().to_string();
        }

        let corrected = self.table.apply(&cleaned);
        let without_modifiers = self.strip_modifiers(&corrected);
        let merged = merge_compounds(&without_modifiers);
        // Merging can join a correction pattern across the removed space
        let merged = if merged == without_modifiers {
            merged
        } else {
            self.table.apply(&merged)
        };

        let collapsed = collapse_whitespace(&merged);
        if collapsed.chars().count() < MIN_NORMALIZED_CHARS {
            return String::new();
        }
        collapsed
    }

    /// Normalize an OCR span, keeping its original text and confidence
    pub fn normalize_span(&self, span: &ExtractedSpan) -> NormalizedSpan {
        NormalizedSpan {
            original_text: span.text.clone(),
            normalized_text: self.normalize(&span.text),
            confidence: span.confidence,
        }
    }

    /// Remove modifier words that stand alone as whitespace tokens
    ///
    /// Modifiers embedded in a longer word are kept, so `매운탕` survives
    /// while `매운 탕수육` loses its adjective.
    pub fn strip_modifiers(&self, text: &str) -> String {
        text.split_whitespace()
            .filter(|token| !self.table.is_modifier(token))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Cleanup for nutrition lookups: characters and modifiers only, no corrections
    pub fn clean_for_lookup(&self, text: &str) -> String {
        let stripped = strip_non_linguistic(text);
        collapse_whitespace(&self.strip_modifiers(&stripped))
    }
}

/// Step 1: replace every character that is not Hangul, Latin, a digit or whitespace
pub fn strip_non_linguistic(text: &str) -> String {
    NON_LINGUISTIC.replace_all(text, " ").into_owned()
}

/// Step 2: drop digit+unit tokens, then bare digit runs, until none are left
///
/// A unit only counts when no Latin letter follows it, so `350g2인분` loses
/// both quantities while `1 logo` keeps its word.
pub fn remove_quantities(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let without_units = QUANTITY_WITH_UNIT.replace_all(&current, " ${next}");
        let next = BARE_DIGITS.replace_all(&without_units, " ").into_owned();
        // Every replacement drops at least one digit
        if next == current {
            return next;
        }
        current = next;
    }
}

/// Merge a detached dish-type suffix into the Hangul word before it
pub fn merge_compounds(text: &str) -> String {
    let mut tokens: Vec<String> = Vec::new();

    for token in text.split_whitespace() {
        let joins_previous = COMPOUND_SUFFIXES.contains(&token)
            && tokens
                .last()
                .and_then(|prev| prev.chars().last())
                .is_some_and(is_hangul_syllable);

        match tokens.last_mut() {
            Some(prev) if joins_previous => prev.push_str(token),
            _ => tokens.push(token.to_string()),
        }
    }

    tokens.join(" ")
}

/// Collapse whitespace runs to one space and trim
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether a character is a precomposed Hangul syllable (가-힣)
pub fn is_hangul_syllable(c: char) -> bool {
    ('\u{AC00}'..='\u{D7A3}').contains(&c)
}

fn letter_count(text: &str) -> usize {
    text.chars()
        .filter(|c| is_hangul_syllable(*c) || c.is_ascii_alphabetic())
        .count()
}

/// The shrink guard: for inputs longer than four characters, steps 1-2 must
/// keep at least half of the letters. Removed symbols and digits do not count
/// against the input, so `김치찌개 8,000원` is not over-stripped.
fn over_stripped(raw: &str, cleaned: &str) -> bool {
    let raw = raw.trim();
    if raw.chars().count() <= SHRINK_GUARD_MIN_CHARS {
        return false;
    }
    let before = letter_count(raw);
    let after = letter_count(cleaned);
    after * 2 < before
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_non_linguistic() {
        assert_eq!(collapse_whitespace(&strip_non_linguistic("김치찌개★(특)")), "김치찌개 특");
        assert_eq!(strip_non_linguistic("abc 123"), "abc 123");
    }

    #[test]
    fn test_remove_quantities() {
        assert_eq!(collapse_whitespace(&remove_quantities("제육볶음 350g 9000원")), "제육볶음");
        assert_eq!(collapse_whitespace(&remove_quantities("2인분 돈까스 2")), "돈까스");
        assert_eq!(collapse_whitespace(&remove_quantities("450 kcal 샐러드")), "샐러드");
        // Digits inside a word are identity, not quantity
        assert_eq!(collapse_whitespace(&remove_quantities("A1소스")), "A1소스");
    }

    #[test]
    fn test_remove_quantities_without_separators() {
        assert_eq!(collapse_whitespace(&remove_quantities("김치찌개 350g2인분")), "김치찌개");
        assert_eq!(collapse_whitespace(&remove_quantities("350g김치찌개")), "김치찌개");
        assert_eq!(collapse_whitespace(&remove_quantities("1kg1인분 10000원")), "");
        // A unit glued to a longer Latin word is not a unit
        assert_eq!(collapse_whitespace(&remove_quantities("1 logo")), "logo");
    }

    #[test]
    fn test_normalize_settles_after_modifier_removal() {
        let normalizer = TextNormalizer::default();
        assert_eq!(normalizer.normalize("B1 매운 개"), "");
        assert_eq!(normalizer.normalize("찌개 350g2인분 만두"), "찌개만두");
    }

    #[test]
    fn test_merge_compounds() {
        assert_eq!(merge_compounds("김치 찌개"), "김치찌개");
        assert_eq!(merge_compounds("오징어 볶음 덮밥"), "오징어볶음덮밥");
        // Suffix at the start has nothing to join
        assert_eq!(merge_compounds("탕 수육"), "탕 수육");
        assert_eq!(merge_compounds("pork 구이"), "pork 구이");
    }

    #[test]
    fn test_modifier_stripping_keeps_embedded_words() {
        let normalizer = TextNormalizer::default();
        assert_eq!(normalizer.strip_modifiers("매운 탕수육"), "탕수육");
        assert_eq!(normalizer.strip_modifiers("매운탕"), "매운탕");
        assert_eq!(normalizer.strip_modifiers("프리미엄 마약 김밥"), "김밥");
    }

    #[test]
    fn test_short_results_are_discarded() {
        let normalizer = TextNormalizer::default();
        assert_eq!(normalizer.normalize("국"), "");
        assert_eq!(normalizer.normalize("   "), "");
        assert_eq!(normalizer.normalize("9,000"), "");
    }

    #[test]
    fn test_shrink_guard_keeps_original() {
        let normalizer = TextNormalizer::default();
        // Only unit letters survive steps 1-2 here, which is under half
        assert_eq!(normalizer.normalize("1인분 5000원"), "1인분 5000원");
        // Prices and symbols alone do not trigger the guard
        assert_eq!(normalizer.normalize("김치찌개 8,000원"), "김치찌개");
    }

    #[test]
    fn test_merge_then_correct() {
        let normalizer = TextNormalizer::default();
        assert_eq!(normalizer.normalize("김치 째개"), "김치찌개");
        assert_eq!(normalizer.normalize("김치 찌개"), "김치찌개");
    }

    #[test]
    fn test_normalize_span_keeps_original() {
        let normalizer = TextNormalizer::default();
        let span = ExtractedSpan::new(
            "매운 김치째개",
            0.55,
            crate::ocr::BoundingBox::from_rect(0.0, 0.0, 10.0, 10.0),
        );
        let normalized = normalizer.normalize_span(&span);
        assert_eq!(normalized.original_text, "매운 김치째개");
        assert_eq!(normalized.normalized_text, "김치찌개");
        assert!(!normalized.is_discarded());
    }
}
