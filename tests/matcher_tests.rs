//! # Menu Matcher Tests
//!
//! Matching against the shipped reference dataset and small in-memory vocabularies.

use menu_nutrition::matcher::{MatchResult, MatchStage, MenuMatcher, CONTAINMENT_SIMILARITY};
use menu_nutrition::reference_data::ReferenceColumns;
use menu_nutrition::text_normalizer::TextNormalizer;
use menu_nutrition::vocabulary::{MenuVocabulary, VocabularySource};
use std::sync::Arc;

fn shipped_matcher() -> MenuMatcher {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/data/nutrition_db.csv");
    let vocabulary = MenuVocabulary::load(path, &ReferenceColumns::default());
    assert!(matches!(vocabulary.source(), VocabularySource::Dataset(_)));
    MenuMatcher::new(Arc::new(vocabulary))
}

fn matcher_for(names: &[&str]) -> MenuMatcher {
    MenuMatcher::new(Arc::new(MenuVocabulary::from_entries(
        names.iter().map(|n| n.to_string()),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_ocr_text_matches_exactly() {
        let matcher = shipped_matcher();
        let normalizer = TextNormalizer::default();

        let result = matcher.find_match(&normalizer.normalize("매운 김치째개"));
        assert_eq!(result.matched_name.as_deref(), Some("김치찌개"));
        assert_eq!(result.stage, MatchStage::Exact);
        assert_eq!(result.similarity, 1.0);
    }

    #[test]
    fn test_exact_has_priority_over_containment() {
        // 찌개 is contained in 김치찌개 but the exact entry wins
        let matcher = matcher_for(&["김치찌개", "찌개"]);
        let result = matcher.find_match("찌개");
        assert_eq!(result.matched_name.as_deref(), Some("찌개"));
        assert_eq!(result.stage, MatchStage::Exact);
    }

    #[test]
    fn test_longer_entry_is_never_shadowed() {
        let matcher = matcher_for(&["찌개", "김치찌개"]);
        assert_eq!(matcher.find_match("김치찌개").matched_name.as_deref(), Some("김치찌개"));
        assert_eq!(matcher.find_match("참치김치찌개").matched_name.as_deref(), Some("김치찌개"));
    }

    #[test]
    fn test_containment_picks_longest_entry() {
        let matcher = shipped_matcher();
        let result = matcher.find_match("돼지김치찌개");
        assert_eq!(result.matched_name.as_deref(), Some("김치찌개"));
        assert_eq!(result.stage, MatchStage::Containment);
        assert_eq!(result.similarity, CONTAINMENT_SIMILARITY);
    }

    #[test]
    fn test_misread_syllable_goes_to_fallback() {
        let matcher = shipped_matcher();
        let result = matcher.find_match("김치찌게");
        assert_eq!(result.matched_name.as_deref(), Some("김치찌개"));
        assert_eq!(result.stage, MatchStage::GlobalFallback);
        assert!((result.similarity - 0.75).abs() < 1e-9);

        // The high-confidence shortcut only accepts exact or containment hits
        assert!(matcher.find_direct_match("김치찌게").is_none());
        assert!(matcher.find_direct_match("김치찌개").is_some());
    }

    #[test]
    fn test_fallback_rejects_distant_strings() {
        let matcher = matcher_for(&["xyz"]);
        assert_eq!(matcher.find_match("abcdefgh"), MatchResult::no_match());

        let matcher = shipped_matcher();
        assert!(!matcher.find_match("아메리카노").is_match());
    }

    #[test]
    fn test_empty_vocabulary_never_matches() {
        let matcher = matcher_for(&[]);
        assert!(matcher.vocabulary().is_empty());
        assert!(!matcher.find_match("김치찌개").is_match());
    }
}
