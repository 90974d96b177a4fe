//! # Food Recognition Pipeline
//!
//! Orchestrates one analysis request:
//!
//! ```text
//! image ─► OcrEngine ─► TextNormalizer ─► MenuMatcher ─► ConfidenceFilter ─► NutritionResolver
//!          (spans)      (per span)        (per span)     (admit, dedup)      (concurrent lookups)
//! ```
//!
//! Per-candidate failures are logged and dropped. Only the whole-batch
//! outcomes of [`PipelineError`] reach the caller, together with whatever
//! had been produced up to that point.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, Instrument};

use crate::confidence_filter::{ConfidenceFilter, MenuCandidate};
use crate::errors::{error_logging, AnalysisError, CandidateFailure, PipelineError};
use crate::matcher::{MatchResult, MenuMatcher};
use crate::nutrition::{NutritionFacts, NutritionResolver};
use crate::observability;
use crate::ocr::{BoundingBox, ExtractedSpan, OcrEngine};
use crate::text_normalizer::{collapse_whitespace, strip_non_linguistic, TextNormalizer};

/// A span as returned by OCR
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedText {
    pub text: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

/// A span that passed the confidence gate, matched or not
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilteredText {
    pub original_text: String,
    pub normalized_text: String,
    pub confidence: f64,
    pub matched_name: Option<String>,
    pub similarity: f64,
}

/// A menu with per-serving nutrition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedFood {
    pub name: String,
    pub original_text: String,
    pub confidence: f64,
    pub similarity: f64,
    pub nutrition: NutritionFacts,
    pub serving_size_g: f64,
    pub score: f64,
}

/// Successful analysis. `found_foods` is never empty and is ranked best first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub detected_texts: Vec<DetectedText>,
    pub filtered_texts: Vec<FilteredText>,
    pub found_foods: Vec<ResolvedFood>,
    pub selected_food: ResolvedFood,
}

// f32 engine confidences carry float noise into JSON
fn span_confidence(span: &ExtractedSpan) -> f64 {
    (f64::from(span.confidence) * 100.0).round() / 100.0
}

/// Per-span outcome of normalization and matching
struct SpanAssessment {
    normalized_text: String,
    result: MatchResult,
}

/// The request pipeline. Cheap to share: every component is read-only.
pub struct FoodRecognitionPipeline {
    ocr: Arc<dyn OcrEngine>,
    normalizer: TextNormalizer,
    matcher: MenuMatcher,
    filter: ConfidenceFilter,
    resolver: NutritionResolver,
}

impl FoodRecognitionPipeline {
    pub fn new(
        ocr: Arc<dyn OcrEngine>,
        normalizer: TextNormalizer,
        matcher: MenuMatcher,
        filter: ConfidenceFilter,
        resolver: NutritionResolver,
    ) -> Self {
        Self {
            ocr,
            normalizer,
            matcher,
            filter,
            resolver,
        }
    }

    pub fn matcher(&self) -> &MenuMatcher {
        &self.matcher
    }

    pub fn ocr_engine_name(&self) -> &str {
        self.ocr.name()
    }

    /// Run OCR on an image and analyze the spans
    pub async fn analyze(&self, image: &[u8]) -> Result<AnalysisReport, AnalysisError> {
        let start = Instant::now();
        let result = self
            .run(image)
            .instrument(observability::pipeline_span("analyze_image"))
            .await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(AnalysisError::Ocr(_)) => "ocr_error",
            Err(AnalysisError::Pipeline(e)) => e.code(),
        };
        observability::record_pipeline_outcome(outcome, start.elapsed());
        result
    }

    async fn run(&self, image: &[u8]) -> Result<AnalysisReport, AnalysisError> {
        let spans = self.ocr.extract(image).await?;
        Ok(self.analyze_spans(spans).await?)
    }

    /// Analyze spans already produced by an OCR engine
    pub async fn analyze_spans(
        &self,
        spans: Vec<ExtractedSpan>,
    ) -> Result<AnalysisReport, PipelineError> {
        if spans.is_empty() {
            return Err(PipelineError::NoTextDetected);
        }

        let detected: Vec<DetectedText> = spans
            .iter()
            .map(|span| DetectedText {
                text: span.text.clone(),
                confidence: span_confidence(span),
                bbox: span.bbox,
            })
            .collect();

        let mut filtered = Vec::new();
        let mut candidates = Vec::new();

        for (index, span) in spans.iter().enumerate() {
            let confidence = span_confidence(span);
            let assessment = self.assess(span, confidence);

            if !self.filter.passes_confidence(confidence, &assessment.result) {
                debug!(
                    text = %span.text,
                    confidence = %confidence,
                    "Span rejected by confidence floor"
                );
                continue;
            }

            filtered.push(FilteredText {
                original_text: span.text.clone(),
                normalized_text: assessment.normalized_text.clone(),
                confidence,
                matched_name: assessment.result.matched_name.clone(),
                similarity: assessment.result.similarity,
            });

            match self.filter.candidate(
                &span.text,
                &assessment.normalized_text,
                confidence,
                &assessment.result,
            ) {
                Some(candidate) => candidates.push(candidate),
                None => error_logging::log_candidate_failure(
                    &CandidateFailure::NoMatchFound {
                        text: span.text.clone(),
                    },
                    index,
                ),
            }
        }

        observability::record_span_counts(detected.len(), filtered.len(), candidates.len());

        if filtered.is_empty() {
            return Err(PipelineError::NoConfidentText { detected });
        }

        let ranked = self.filter.deduplicate(candidates);
        let found = self.resolve_ranked(ranked).await;

        info!(
            detected = %detected.len(),
            filtered = %filtered.len(),
            found = %found.len(),
            "Menu analysis finished"
        );

        match found.first().cloned() {
            Some(selected_food) => Ok(AnalysisReport {
                detected_texts: detected,
                filtered_texts: filtered,
                found_foods: found,
                selected_food,
            }),
            None => Err(PipelineError::NoNutritionMatch { detected, filtered }),
        }
    }

    /// Normalize and match one span, trying a clean high-confidence read first
    fn assess(&self, span: &ExtractedSpan, confidence: f64) -> SpanAssessment {
        if self.filter.is_high_confidence(confidence) {
            let as_read = collapse_whitespace(&strip_non_linguistic(&span.text));
            if let Some(result) = self.matcher.find_direct_match(&as_read) {
                debug!(text = %as_read, "High-confidence span matched without normalization");
                return SpanAssessment {
                    normalized_text: as_read,
                    result,
                };
            }
        }

        let normalized = self.normalizer.normalize_span(span);
        let result = if normalized.is_discarded() {
            MatchResult::no_match()
        } else {
            self.matcher.find_match(&normalized.normalized_text)
        };

        SpanAssessment {
            normalized_text: normalized.normalized_text,
            result,
        }
    }

    /// Look up nutrition for every ranked candidate; misses are dropped, order kept
    async fn resolve_ranked(&self, ranked: Vec<MenuCandidate>) -> Vec<ResolvedFood> {
        let queries: Vec<(String, String)> = ranked
            .iter()
            .map(|c| (c.matched_name.clone(), c.original_text.clone()))
            .collect();
        let results = self.resolver.resolve_all(&queries).await;

        ranked
            .into_iter()
            .zip(results)
            .enumerate()
            .filter_map(|(index, (candidate, result))| match result {
                Ok(nutrition) => Some(ResolvedFood {
                    name: candidate.matched_name,
                    original_text: candidate.original_text,
                    confidence: candidate.confidence,
                    similarity: candidate.similarity,
                    nutrition: nutrition.facts,
                    serving_size_g: nutrition.serving_size_g,
                    score: candidate.score,
                }),
                Err(failure) => {
                    error_logging::log_candidate_failure(&failure, index);
                    None
                }
            })
            .collect()
    }
}
