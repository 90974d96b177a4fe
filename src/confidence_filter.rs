//! Admission, deduplication and ranking of matched OCR spans.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::matcher::{MatchResult, MatchStage};

/// A span that matched a menu well enough to be looked up
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuCandidate {
    pub original_text: String,
    pub normalized_text: String,
    pub confidence: f64,
    pub matched_name: String,
    pub similarity: f64,
    pub stage: MatchStage,
    /// Weighted OCR confidence and match similarity
    pub score: f64,
}

/// Threshold decisions of the pipeline
#[derive(Debug, Clone)]
pub struct ConfidenceFilter {
    config: PipelineConfig,
}

impl ConfidenceFilter {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Clean reads that are tried against the vocabulary before normalization
    pub fn is_high_confidence(&self, confidence: f64) -> bool {
        confidence >= self.config.high_confidence_bypass
    }

    /// The confidence floor, waived for spans whose match is strictly above
    /// the low-confidence similarity
    pub fn passes_confidence(&self, confidence: f64, result: &MatchResult) -> bool {
        confidence >= self.config.min_ocr_confidence
            || (result.is_match() && result.similarity > self.config.low_confidence_similarity)
    }

    /// Whether a match is similar enough to become a candidate
    pub fn is_menu_match(&self, result: &MatchResult) -> bool {
        result.is_match() && result.similarity >= self.config.min_menu_similarity
    }

    pub fn score(&self, confidence: f64, similarity: f64) -> f64 {
        self.config.combined_score(confidence, similarity)
    }

    /// Build a candidate from an admitted span. `None` if the match is too weak.
    pub fn candidate(
        &self,
        original_text: &str,
        normalized_text: &str,
        confidence: f64,
        result: &MatchResult,
    ) -> Option<MenuCandidate> {
        if !self.is_menu_match(result) {
            return None;
        }
        let matched_name = result.matched_name.clone()?;
        Some(MenuCandidate {
            original_text: original_text.to_string(),
            normalized_text: normalized_text.to_string(),
            confidence,
            similarity: result.similarity,
            stage: result.stage,
            score: self.score(confidence, result.similarity),
            matched_name,
        })
    }

    /// Keep the best-scoring candidate per menu, best first
    ///
    /// Ties on score go to the higher OCR confidence, then to the earlier span.
    pub fn deduplicate(&self, candidates: Vec<MenuCandidate>) -> Vec<MenuCandidate> {
        let total = candidates.len();
        let mut best: HashMap<String, (usize, MenuCandidate)> = HashMap::new();

        for (position, candidate) in candidates.into_iter().enumerate() {
            match best.get(&candidate.matched_name) {
                Some((_, current)) if !outranks(&candidate, current) => {}
                _ => {
                    best.insert(candidate.matched_name.clone(), (position, candidate));
                }
            }
        }

        let mut ranked: Vec<(usize, MenuCandidate)> = best.into_values().collect();
        ranked.sort_by(|(pos_a, a), (pos_b, b)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal))
                .then_with(|| pos_a.cmp(pos_b))
        });

        debug!(
            before = %total,
            after = %ranked.len(),
            "Deduplicated menu candidates"
        );

        ranked.into_iter().map(|(_, candidate)| candidate).collect()
    }
}

fn outranks(challenger: &MenuCandidate, current: &MenuCandidate) -> bool {
    challenger.score > current.score
        || (challenger.score == current.score && challenger.confidence > current.confidence)
}
