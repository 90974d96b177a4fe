//! # Pipeline Tests
//!
//! End-to-end analysis over scripted OCR output: normalization, matching,
//! the confidence gate, deduplication, nutrition and the batch errors.


use menu_nutrition::errors::{AnalysisError, PipelineError};
use menu_nutrition::ocr_errors::OcrError;
use test_helpers::{test_pipeline, ScriptedOcr, MENU_WITHOUT_NUTRITION};

async fn analyze(lines: &[(&str, f32)]) -> Result<menu_nutrition::AnalysisReport, AnalysisError> {
    test_pipeline(ScriptedOcr::spans(lines)).analyze(b"image").await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_misread_menu_resolves_with_serving_nutrition() {
        let report = analyze(&[("매운 김치째개", 0.55)]).await.unwrap();

        assert_eq!(report.detected_texts.len(), 1);
        assert_eq!(report.detected_texts[0].confidence, 0.55);
        assert_eq!(report.filtered_texts[0].normalized_text, "김치찌개");

        let food = &report.selected_food;
        assert_eq!(food.name, "김치찌개");
        assert_eq!(food.original_text, "매운 김치째개");
        assert_eq!(food.similarity, 1.0);
        assert_eq!(food.serving_size_g, 350.0);
        // 62 kcal per 100g at 350g
        assert_eq!(food.nutrition.calories, 217.0);
        assert_eq!(report.found_foods, vec![food.clone()]);
    }

    #[tokio::test]
    async fn test_duplicate_menus_keep_the_most_confident_read() {
        let report = analyze(&[("김치찌개", 0.3), ("김치 찌개", 0.6)]).await.unwrap();

        assert_eq!(report.filtered_texts.len(), 2);
        assert_eq!(report.found_foods.len(), 1);
        assert_eq!(report.selected_food.confidence, 0.6);
        assert_eq!(report.selected_food.original_text, "김치 찌개");
    }

    #[tokio::test]
    async fn test_found_foods_are_ranked_by_score() {
        let report = analyze(&[("비빔밥", 0.7), ("김치찌개", 0.95)]).await.unwrap();

        let names: Vec<&str> = report.found_foods.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["김치찌개", "비빔밥"]);
        assert!(report.found_foods[0].score > report.found_foods[1].score);
        assert_eq!(report.selected_food.name, "김치찌개");
    }

    #[tokio::test]
    async fn test_unmatched_text_is_filtered_but_not_a_candidate() {
        let report = analyze(&[("김치찌개", 0.8), ("아메리카노", 0.8)]).await.unwrap();

        let americano = report
            .filtered_texts
            .iter()
            .find(|f| f.original_text == "아메리카노")
            .unwrap();
        assert_eq!(americano.matched_name, None);
        assert_eq!(report.found_foods.len(), 1);
        assert_eq!(report.found_foods[0].name, "김치찌개");
    }

    #[tokio::test]
    async fn test_menu_without_nutrition_is_dropped() {
        let report = analyze(&[(MENU_WITHOUT_NUTRITION, 0.95), ("된장찌개", 0.5)])
            .await
            .unwrap();

        assert_eq!(report.found_foods.len(), 1);
        assert_eq!(report.selected_food.name, "된장찌개");
        assert!(report.selected_food.nutrition.calories > 0.0);
    }

    #[tokio::test]
    async fn test_low_confidence_exact_match_is_rescued() {
        let report = analyze(&[("비빔밥", 0.1)]).await.unwrap();
        assert_eq!(report.selected_food.name, "비빔밥");
        assert_eq!(report.selected_food.serving_size_g, 500.0);
        assert_eq!(report.selected_food.nutrition.calories, 780.0);
    }

    #[tokio::test]
    async fn test_low_confidence_containment_match_is_not_rescued() {
        // Containment scores exactly the rescue threshold, which is not enough
        let err = analyze(&[("돼지김치찌개", 0.1)]).await.unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Pipeline(PipelineError::NoConfidentText { ref detected })
                if detected[0].text == "돼지김치찌개"
        ));
    }

    #[tokio::test]
    async fn test_no_text_detected() {
        let err = analyze(&[]).await.unwrap_err();
        assert_eq!(err, AnalysisError::Pipeline(PipelineError::NoTextDetected));
    }

    #[tokio::test]
    async fn test_no_confident_text_echoes_detections() {
        let err = analyze(&[("아메리카노", 0.1), ("$$", 0.05)]).await.unwrap_err();
        match err {
            AnalysisError::Pipeline(PipelineError::NoConfidentText { detected }) => {
                assert_eq!(detected.len(), 2);
                assert_eq!(detected[0].text, "아메리카노");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_nutrition_match() {
        let err = analyze(&[(MENU_WITHOUT_NUTRITION, 0.8)]).await.unwrap_err();
        match err {
            AnalysisError::Pipeline(PipelineError::NoNutritionMatch { detected, filtered }) => {
                assert_eq!(detected.len(), 1);
                assert_eq!(filtered.len(), 1);
                assert_eq!(filtered[0].matched_name.as_deref(), Some(MENU_WITHOUT_NUTRITION));
            }
            other => panic!("unexpected result: {:?}", other),
        }

        // Confident text that matches no menu ends the same way
        let err = analyze(&[("아메리카노", 0.8)]).await.unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Pipeline(PipelineError::NoNutritionMatch { ref filtered, .. })
                if filtered[0].matched_name.is_none()
        ));
    }

    #[tokio::test]
    async fn test_ocr_errors_pass_through() {
        let pipeline = test_pipeline(ScriptedOcr::failing(OcrError::Timeout("30s".to_string())));
        let err = pipeline.analyze(b"image").await.unwrap_err();
        assert!(matches!(err, AnalysisError::Ocr(OcrError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_report_serializes_with_expected_keys() {
        let report = analyze(&[("돈가스", 0.9)]).await.unwrap();
        let json = serde_json::to_value(&report).unwrap();
        for key in ["detected_texts", "filtered_texts", "found_foods", "selected_food"] {
            assert!(json.get(key).is_some(), "missing key {}", key);
        }
        assert_eq!(json["selected_food"]["name"], "돈까스");
    }
}
