//! # Menu Matcher Module
//!
//! Resolves a normalized OCR string to a vocabulary entry. Stages run from most
//! to least specific and stop at the first hit:
//!
//! | Stage          | Test                                                  | Similarity            |
//! |----------------|-------------------------------------------------------|-----------------------|
//! | exact          | input is a vocabulary entry                           | 1.0                   |
//! | containment    | entry ⊂ input or input ⊂ entry, longest entry first   | 0.9                   |
//! | token overlap  | entries containing an input token, min edit distance  | 1 - d / max(len)      |
//! | global         | every entry, only if `d <= len(entry) / 2`            | 1 - d / max(len)      |
//!
//! Lengths are counted in characters, not bytes. Equal edit distances are
//! broken by [`jamo_similarity`], then by vocabulary order.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::hangul::jamo_similarity;
use crate::observability;
use crate::vocabulary::MenuVocabulary;

/// Similarity reported for containment hits
pub const CONTAINMENT_SIMILARITY: f64 = 0.9;

/// Which cascade stage produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStage {
    Exact,
    Containment,
    TokenOverlap,
    GlobalFallback,
    NoMatch,
}

impl MatchStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStage::Exact => "exact",
            MatchStage::Containment => "containment",
            MatchStage::TokenOverlap => "token_overlap",
            MatchStage::GlobalFallback => "global_fallback",
            MatchStage::NoMatch => "none",
        }
    }
}

/// Outcome of matching one string. `matched_name == None` is a normal result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub matched_name: Option<String>,
    pub similarity: f64,
    pub stage: MatchStage,
}

impl MatchResult {
    fn found(name: &str, similarity: f64, stage: MatchStage) -> Self {
        Self {
            matched_name: Some(name.to_string()),
            similarity,
            stage,
        }
    }

    pub fn no_match() -> Self {
        Self {
            matched_name: None,
            similarity: 0.0,
            stage: MatchStage::NoMatch,
        }
    }

    pub fn is_match(&self) -> bool {
        self.matched_name.is_some()
    }
}

/// Levenshtein distance over characters with unit costs
///
/// ```rust
/// use menu_nutrition::matcher::levenshtein;
///
/// assert_eq!(levenshtein("kitten", "sitting"), 3);
/// assert_eq!(levenshtein("김치째개", "김치찌개"), 1);
/// ```
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j] + cost)
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// `1 - distance / max(len(a), len(b))`
pub fn edit_similarity(a: &str, b: &str, distance: usize) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - distance as f64 / longest as f64
}

/// A scored edit-distance candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EditCandidate<'a> {
    pub name: &'a str,
    pub distance: usize,
}

/// Closest candidate by edit distance, ties broken by jamo similarity
///
/// `accept` filters candidates by (candidate, distance) before they compete.
/// Candidates are visited in the given order and only a strictly better one
/// replaces the current best, so iteration order is the final tie-breaker.
pub fn closest_by_edit_distance<'a, I, F>(
    input: &str,
    candidates: I,
    accept: F,
) -> Option<EditCandidate<'a>>
where
    I: IntoIterator<Item = &'a str>,
    F: Fn(&str, usize) -> bool,
{
    let input_len = input.chars().count();
    let mut best: Option<(EditCandidate<'a>, f64)> = None;

    for name in candidates {
        let candidate_len = name.chars().count();
        // Distance is at least the length difference
        if let Some((current, _)) = &best {
            if input_len.abs_diff(candidate_len) > current.distance {
                continue;
            }
        }

        let distance = levenshtein(input, name);
        if !accept(name, distance) {
            continue;
        }

        let better = match &best {
            None => true,
            Some((current, current_jamo)) => {
                if distance != current.distance {
                    distance < current.distance
                } else {
                    jamo_similarity(input, name) > *current_jamo
                }
            }
        };

        if better {
            let jamo = jamo_similarity(input, name);
            trace!(candidate = %name, distance = %distance, jamo = %jamo, "New best edit candidate");
            best = Some((EditCandidate { name, distance }, jamo));
        }
    }

    best.map(|(candidate, _)| candidate)
}

/// Run the matching cascade against a vocabulary
pub fn match_menu(text: &str, vocabulary: &MenuVocabulary) -> MatchResult {
    let text = text.trim();
    if text.is_empty() || vocabulary.is_empty() {
        return MatchResult::no_match();
    }

    // 1. exact
    if vocabulary.contains(text) {
        return MatchResult::found(text, 1.0, MatchStage::Exact);
    }

    // 2. containment, longest entry first
    if let Some(entry) = vocabulary
        .entries_longest_first()
        .iter()
        .find(|entry| text.contains(entry.as_str()) || entry.contains(text))
    {
        return MatchResult::found(entry, CONTAINMENT_SIMILARITY, MatchStage::Containment);
    }

    // 3. token overlap + edit distance
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let overlapping = vocabulary
        .entries_longest_first()
        .iter()
        .map(String::as_str)
        .filter(|entry| tokens.iter().any(|token| entry.contains(token)));
    if let Some(best) = closest_by_edit_distance(text, overlapping, |_, _| true) {
        let similarity = edit_similarity(text, best.name, best.distance);
        return MatchResult::found(best.name, similarity, MatchStage::TokenOverlap);
    }

    // 4. global fallback, bounded by half the candidate length
    let all = vocabulary.entries_longest_first().iter().map(String::as_str);
    if let Some(best) = closest_by_edit_distance(text, all, |name, distance| {
        distance <= name.chars().count() / 2
    }) {
        let similarity = edit_similarity(text, best.name, best.distance);
        return MatchResult::found(best.name, similarity, MatchStage::GlobalFallback);
    }

    MatchResult::no_match()
}

/// Matcher bound to a shared, read-only vocabulary
#[derive(Debug, Clone)]
pub struct MenuMatcher {
    vocabulary: Arc<MenuVocabulary>,
}

impl MenuMatcher {
    pub fn new(vocabulary: Arc<MenuVocabulary>) -> Self {
        Self { vocabulary }
    }

    pub fn vocabulary(&self) -> &MenuVocabulary {
        &self.vocabulary
    }

    /// Match a normalized string and record which stage answered
    pub fn find_match(&self, text: &str) -> MatchResult {
        let result = match_menu(text, &self.vocabulary);
        observability::record_match_stage(result.stage.as_str(), result.similarity);
        debug!(
            input = %text,
            matched = ?result.matched_name,
            similarity = %result.similarity,
            stage = %result.stage.as_str(),
            "Menu match finished"
        );
        result
    }

    /// Accept only an exact or containment hit, used for clean high-confidence reads
    pub fn find_direct_match(&self, text: &str) -> Option<MatchResult> {
        let result = match_menu(text, &self.vocabulary);
        match result.stage {
            MatchStage::Exact | MatchStage::Containment => {
                observability::record_match_stage(result.stage.as_str(), result.similarity);
                Some(result)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocabulary(names: &[&str]) -> MenuVocabulary {
        MenuVocabulary::from_entries(names.iter().map(|n| n.to_string()))
    }

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("same", "same"), 0);
        assert_eq!(levenshtein("비빔밥", "비빕밥"), 1);
    }

    #[test]
    fn test_levenshtein_is_symmetric() {
        for (a, b) in [("돈까스", "돈가스정식"), ("abc", "yabd"), ("", "x")] {
            assert_eq!(levenshtein(a, b), levenshtein(b, a));
        }
    }

    #[test]
    fn test_exact_beats_everything() {
        let vocab = vocabulary(&["찌개", "김치찌개", "김치찌개백반"]);
        let result = match_menu("김치찌개", &vocab);
        assert_eq!(result.matched_name.as_deref(), Some("김치찌개"));
        assert_eq!(result.similarity, 1.0);
        assert_eq!(result.stage, MatchStage::Exact);
    }

    #[test]
    fn test_containment_prefers_longest() {
        let vocab = vocabulary(&["찌개", "김치찌개"]);
        let result = match_menu("돼지김치찌개", &vocab);
        assert_eq!(result.matched_name.as_deref(), Some("김치찌개"));
        assert_eq!(result.similarity, CONTAINMENT_SIMILARITY);
    }

    #[test]
    fn test_input_inside_entry_is_containment() {
        let vocab = vocabulary(&["치킨가라아게"]);
        let result = match_menu("가라아게", &vocab);
        assert_eq!(result.matched_name.as_deref(), Some("치킨가라아게"));
        assert_eq!(result.stage, MatchStage::Containment);
    }

    #[test]
    fn test_token_overlap_stage() {
        let vocab = vocabulary(&["제육볶음", "오징어볶음", "비빔밥"]);
        // "제육" is a token contained in 제육볶음; no entry is a substring either way
        let result = match_menu("제육 볶옴", &vocab);
        assert_eq!(result.stage, MatchStage::TokenOverlap);
        assert_eq!(result.matched_name.as_deref(), Some("제육볶음"));
        // distance("제육 볶옴", "제육볶음") = 2 over max len 5
        assert!((result.similarity - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_global_fallback_is_bounded() {
        let vocab = vocabulary(&["xyz"]);
        assert_eq!(match_menu("abcdefgh", &vocab), MatchResult::no_match());

        let vocab = vocabulary(&["갈비탕"]);
        let result = match_menu("갈비팅", &vocab);
        assert_eq!(result.stage, MatchStage::GlobalFallback);
        assert_eq!(result.matched_name.as_deref(), Some("갈비탕"));
    }

    #[test]
    fn test_jamo_breaks_distance_ties() {
        // Both are one substitution away; 게/개 is a confusable vowel pair
        let vocab = vocabulary(&["순두부찌개", "순두부찌모"]);
        let result = match_menu("순두부찌게", &vocab);
        assert_eq!(result.matched_name.as_deref(), Some("순두부찌개"));
    }

    #[test]
    fn test_empty_input_has_no_match() {
        let vocab = vocabulary(&["비빔밥"]);
        assert!(!match_menu("  ", &vocab).is_match());
    }
}
