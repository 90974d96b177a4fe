//! # OCR Error Correction Module
//!
//! Known Korean OCR misreadings and descriptive menu modifiers, kept as one
//! versioned, ordered table instead of constants scattered through the
//! normalizer.
//!
//! The table is loaded from `config/ocr_corrections.json` (or the path in
//! `OCR_CORRECTIONS_PATH`) and falls back to the built-in copy when no file
//! can be read.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info, trace, warn};

use crate::errors::{error_logging, AppError, AppResult};

/// Corrections are re-applied until nothing changes, at most this many passes
const MAX_CORRECTION_PASSES: usize = 4;

/// A single literal substring correction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionRule {
    /// Misread text as produced by the OCR engine
    pub pattern: String,
    /// Text that replaces it
    pub replacement: String,
    /// The OCR confusion that motivates the entry
    #[serde(default)]
    pub note: String,
}

impl CorrectionRule {
    fn new(pattern: &str, replacement: &str, note: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
            note: note.to_string(),
        }
    }
}

/// Ordered OCR correction table plus the modifier word list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrCorrectionTable {
    pub version: u32,
    /// Applied in declared order. More specific patterns come first.
    pub corrections: Vec<CorrectionRule>,
    /// Descriptive words removed when they stand alone as a token
    #[serde(default)]
    pub modifiers: Vec<String>,
}

impl Default for OcrCorrectionTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl OcrCorrectionTable {
    /// Built-in table, identical to the shipped `config/ocr_corrections.json`
    pub fn builtin() -> Self {
        let corrections = vec![
            // 개 read as 째 in the first syllable pair of 찌개
            CorrectionRule::new("째개", "찌개", "찌 misread as 째"),
            CorrectionRule::new("째게", "찌개", "찌 misread as 째 and 개 as 게"),
            CorrectionRule::new("찌게", "찌개", "ㅐ misread as ㅔ"),
            // Runs after the 째개 rules so 부대째개 is already 부대찌개
            CorrectionRule::new("부대째", "부대찌개", "찌개 collapsed into 째"),
            CorrectionRule::new("돈가스", "돈까스", "ㄲ read as ㄱ"),
            CorrectionRule::new("돈까쓰", "돈까스", "ㅅ read as ㅆ"),
            CorrectionRule::new("소시지", "소세지", "dictionary spelling"),
            CorrectionRule::new("비빔밤", "비빔밥", "final ㅂ read as ㅁ"),
            CorrectionRule::new("볶응", "볶음", "final ㅁ read as ㅇ"),
            CorrectionRule::new("뽂음", "볶음", "ㅂ read as ㅃ"),
            CorrectionRule::new("갈비랑", "갈비탕", "ㅌ read as ㄹ"),
            CorrectionRule::new("떡볶기", "떡볶이", "ㅇ read as ㄱ"),
            CorrectionRule::new("치킨가라아계", "치킨가라아게", "ㅔ read as ㅖ"),
            CorrectionRule::new("햄버가", "햄버거", "ㅓ read as ㅏ"),
            CorrectionRule::new("샌드위지", "샌드위치", "ㅊ read as ㅈ"),
            CorrectionRule::new("만두굿", "만두국", "final ㄱ read as ㅅ"),
        ];

        let modifiers = [
            "매운", "매움", "특제", "프리미엄", "마약", "특별", "수제", "원조", "명품", "대박",
            "인기", "추천", "베스트", "신메뉴", "한정", "특대", "곱빼기", "세트", "단품", "소",
            "중", "대",
        ]
        .iter()
        .map(|m| m.to_string())
        .collect();

        Self {
            version: 3,
            corrections,
            modifiers,
        }
    }

    /// Validate table consistency
    ///
    /// Rejects empty patterns, empty modifiers, and replacements that contain
    /// any pattern of the table (applying the table twice would then change
    /// the text again).
    pub fn validate(&self) -> AppResult<()> {
        if self.version == 0 {
            return Err(AppError::Config(
                "correction table version must be greater than 0".to_string(),
            ));
        }

        for (i, rule) in self.corrections.iter().enumerate() {
            if rule.pattern.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "corrections[{}] has an empty pattern",
                    i
                )));
            }
            if rule.pattern == rule.replacement {
                return Err(AppError::Config(format!(
                    "corrections[{}] '{}' replaces a pattern with itself",
                    i, rule.pattern
                )));
            }
            if let Some(other) = self
                .corrections
                .iter()
                .find(|other| rule.replacement.contains(other.pattern.as_str()))
            {
                return Err(AppError::Config(format!(
                    "corrections[{}] replacement '{}' re-introduces pattern '{}'",
                    i, rule.replacement, other.pattern
                )));
            }
        }

        for (i, modifier) in self.modifiers.iter().enumerate() {
            if modifier.trim().is_empty() || modifier.contains(char::is_whitespace) {
                return Err(AppError::Config(format!(
                    "modifiers[{}] '{}' must be a single non-empty word",
                    i, modifier
                )));
            }
        }

        Ok(())
    }

    /// Apply the corrections in declared order
    ///
    /// Passes repeat until the text is stable, so a correction that creates
    /// another pattern across a boundary is still resolved.
    pub fn apply(&self, text: &str) -> String {
        let mut current = text.to_string();

        for _ in 0..MAX_CORRECTION_PASSES {
            let mut changed = false;
            for rule in &self.corrections {
                if current.contains(rule.pattern.as_str()) {
                    trace!(pattern = %rule.pattern, replacement = %rule.replacement, "Applying OCR correction");
                    current = current.replace(rule.pattern.as_str(), &rule.replacement);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        current
    }

    /// Whether a whitespace token is a known modifier
    pub fn is_modifier(&self, token: &str) -> bool {
        self.modifiers.iter().any(|m| m == token)
    }

    /// Load and validate a table from a JSON file
    pub fn from_path(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!(
                "failed to read correction table '{}': {}",
                path.display(),
                e
            ))
        })?;
        let table: Self = serde_json::from_str(&content).map_err(|e| {
            AppError::Config(format!(
                "failed to parse correction table '{}': {}",
                path.display(),
                e
            ))
        })?;
        table.validate()?;
        Ok(table)
    }
}

/// Load the correction table
///
/// Order: the explicit `configured_path` (from `OCR_CORRECTIONS_PATH`), then the
/// usual deployment locations, then the built-in table.
pub fn load_correction_table(configured_path: Option<&str>) -> OcrCorrectionTable {
    if let Some(config_path) = configured_path {
        info!("Loading OCR correction table from configured path: {}", config_path);
        match OcrCorrectionTable::from_path(config_path) {
            Ok(table) => {
                info!(
                    version = %table.version,
                    rule_count = %table.corrections.len(),
                    "Loaded OCR correction table from: {}",
                    config_path
                );
                return table;
            }
            Err(e) => {
                error_logging::log_config_error(&e, "OCR_CORRECTIONS_PATH", "load_correction_table");
                warn!("Falling back to default OCR correction table paths");
            }
        }
    }

    let possible_paths = [
        "/app/config/ocr_corrections.json",
        "config/ocr_corrections.json",
        "../config/ocr_corrections.json",
    ];

    for config_path in &possible_paths {
        if !Path::new(config_path).exists() {
            continue;
        }
        match OcrCorrectionTable::from_path(config_path) {
            Ok(table) => {
                info!(
                    version = %table.version,
                    "Loaded OCR correction table from fallback path: {}",
                    config_path
                );
                return table;
            }
            Err(e) => {
                warn!("Skipping OCR correction table at '{}': {}", config_path, e);
            }
        }
    }

    debug!("No OCR correction table file found, using built-in table");
    OcrCorrectionTable::builtin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_table_is_valid() {
        assert!(OcrCorrectionTable::builtin().validate().is_ok());
    }

    #[test]
    fn test_specific_rule_wins_over_generic() {
        let table = OcrCorrectionTable::builtin();
        assert_eq!(table.apply("김치째개"), "김치찌개");
        assert_eq!(table.apply("부대째개"), "부대찌개");
        assert_eq!(table.apply("부대째"), "부대찌개");
        // Already correct text is untouched
        assert_eq!(table.apply("부대찌개"), "부대찌개");
    }

    #[test]
    fn test_apply_is_idempotent() {
        let table = OcrCorrectionTable::builtin();
        for input in ["된장찌게", "돈가스 정식", "부대째 2인분", "비빔밤"] {
            let once = table.apply(input);
            assert_eq!(table.apply(&once), once, "input: {input}");
        }
    }

    #[test]
    fn test_validate_rejects_reintroduced_pattern() {
        let mut table = OcrCorrectionTable::builtin();
        table
            .corrections
            .push(CorrectionRule::new("찌개찌", "김치찌게", "broken"));
        assert!(table.validate().is_err());

        let mut empty = OcrCorrectionTable::builtin();
        empty.corrections.push(CorrectionRule::new(" ", "x", ""));
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_from_path_and_fallback() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&OcrCorrectionTable::builtin()).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let loaded = OcrCorrectionTable::from_path(file.path()).unwrap();
        assert_eq!(loaded, OcrCorrectionTable::builtin());

        let fallback = load_correction_table(Some("/nonexistent/ocr_corrections.json"));
        assert!(!fallback.corrections.is_empty());
    }

    #[test]
    fn test_invalid_configured_table_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"version": 0, "corrections": [], "modifiers": []}"#)
            .unwrap();

        let err = OcrCorrectionTable::from_path(file.path()).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));

        let path = file.path().to_string_lossy().to_string();
        let table = load_correction_table(Some(&path));
        assert!(table.validate().is_ok());
        assert_ne!(table.version, 0);
    }

    #[test]
    fn test_modifier_lookup_is_whole_word() {
        let table = OcrCorrectionTable::builtin();
        assert!(table.is_modifier("매운"));
        assert!(!table.is_modifier("매운탕"));
    }
}
