//! # Reference Dataset Module
//!
//! Reads the nutrition reference table (one row per food, nutrients per 100g)
//! from CSV. A single load feeds both the menu vocabulary and the local
//! nutrition table.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult};
use crate::nutrition::NutritionFacts;
use crate::text_normalizer::{collapse_whitespace, strip_non_linguistic, MIN_NORMALIZED_CHARS};

/// Header names of the columns the loader reads
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceColumns {
    pub name: String,
    pub energy: String,
    pub carbohydrate: String,
    pub protein: String,
    pub fat: String,
}

impl Default for ReferenceColumns {
    fn default() -> Self {
        Self {
            name: "식품명".to_string(),
            energy: "에너지(kcal)".to_string(),
            carbohydrate: "탄수화물(g)".to_string(),
            protein: "단백질(g)".to_string(),
            fat: "지방(g)".to_string(),
        }
    }
}

/// One food of the reference table
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceRecord {
    /// Name as written in the dataset
    pub name: String,
    /// Name reduced to Hangul, Latin, digits and single spaces; the lookup key
    pub key: String,
    /// `None` when the dataset has no nutrient columns
    pub per_100g: Option<NutritionFacts>,
}

/// Parsed reference table
#[derive(Debug, Clone, Default)]
pub struct ReferenceDataset {
    pub source: Option<PathBuf>,
    pub records: Vec<ReferenceRecord>,
}

impl ReferenceDataset {
    /// Read and parse a CSV file
    pub fn load(path: impl AsRef<Path>, columns: &ReferenceColumns) -> AppResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::Vocabulary(format!(
                "failed to read reference dataset '{}': {}",
                path.display(),
                e
            ))
        })?;

        let records = parse_reference_csv(&content, columns)?;
        info!(
            path = %path.display(),
            record_count = %records.len(),
            "Loaded reference dataset"
        );

        Ok(Self {
            source: Some(path.to_path_buf()),
            records,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Lookup keys of every record, in file order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.key.as_str())
    }
}

/// Reduce a dataset name to its lookup key. `None` when nothing usable remains.
pub fn reference_key(name: &str) -> Option<String> {
    let key = collapse_whitespace(&strip_non_linguistic(name));
    if key.chars().count() < MIN_NORMALIZED_CHARS {
        None
    } else {
        Some(key)
    }
}

/// Parse CSV content into reference records
///
/// The name column is required. Nutrient columns are optional as a group:
/// if any is missing, records are loaded without nutrition. Unparsable
/// numbers become 0.0 for that field only.
pub fn parse_reference_csv(
    content: &str,
    columns: &ReferenceColumns,
) -> AppResult<Vec<ReferenceRecord>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut rows = parse_csv_rows(content).into_iter();

    let header = rows
        .next()
        .ok_or_else(|| AppError::Vocabulary("reference dataset is empty".to_string()))?;
    let positions: HashMap<&str, usize> = header
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim(), i))
        .collect();

    let name_idx = *positions.get(columns.name.as_str()).ok_or_else(|| {
        AppError::Vocabulary(format!(
            "reference dataset has no '{}' column",
            columns.name
        ))
    })?;

    let nutrient_idx = match (
        positions.get(columns.energy.as_str()),
        positions.get(columns.carbohydrate.as_str()),
        positions.get(columns.protein.as_str()),
        positions.get(columns.fat.as_str()),
    ) {
        (Some(&e), Some(&c), Some(&p), Some(&f)) => Some([e, c, p, f]),
        _ => {
            warn!("Reference dataset has no complete nutrient columns, loading names only");
            None
        }
    };

    let mut records = Vec::new();
    let mut skipped = 0usize;

    for row in rows {
        let raw_name = row.get(name_idx).map(|s| s.trim()).unwrap_or_default();
        let Some(key) = reference_key(raw_name) else {
            skipped += 1;
            continue;
        };

        let per_100g = nutrient_idx.map(|[e, c, p, f]| {
            let field = |idx: usize| parse_number(row.get(idx).map(String::as_str).unwrap_or(""));
            NutritionFacts {
                calories: field(e),
                carbohydrates: field(c),
                protein: field(p),
                fat: field(f),
            }
        });

        records.push(ReferenceRecord {
            name: raw_name.to_string(),
            key,
            per_100g,
        });
    }

    if skipped > 0 {
        debug!(skipped = %skipped, "Skipped reference rows without a usable name");
    }

    Ok(records)
}

fn parse_number(field: &str) -> f64 {
    let cleaned: String = field.trim().chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Split CSV text into rows of fields
///
/// Handles double-quoted fields with embedded commas, newlines and `""`
/// escapes, and both `\n` and `\r\n` line endings. Blank lines are skipped.
pub fn parse_csv_rows(content: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                if row.iter().any(|f| !f.is_empty()) {
                    rows.push(std::mem::take(&mut row));
                } else {
                    row.clear();
                }
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        if row.iter().any(|f| !f.is_empty()) {
            rows.push(row);
        }
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\u{feff}식품코드,식품명,에너지(kcal),탄수화물(g),단백질(g),지방(g)\n\
D101,김치찌개,45,3.1,3.5,2.4\n\
D102,\"된장찌개, 두부\",38,-,2.9,1.6\r\n\
D103,,10,1,1,1\n\
\n\
D104,\"오징어\"\"볶음\"\"\",\"1,120\",12,14,5\n";

    #[test]
    fn test_parse_csv_rows_quotes() {
        let rows = parse_csv_rows("a,\"b,c\",\"d\"\"e\"\n1,2,3");
        assert_eq!(rows, vec![vec!["a", "b,c", "d\"e"], vec!["1", "2", "3"]]);
    }

    #[test]
    fn test_parse_reference_csv() {
        let records = parse_reference_csv(SAMPLE, &ReferenceColumns::default()).unwrap();
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].key, "김치찌개");
        let kimchi = records[0].per_100g.unwrap();
        assert_eq!(kimchi.calories, 45.0);
        assert_eq!(kimchi.fat, 2.4);

        // Comma inside quotes becomes part of the name, then a space in the key
        assert_eq!(records[1].name, "된장찌개, 두부");
        assert_eq!(records[1].key, "된장찌개 두부");
        // "-" is unparsable and becomes 0.0 for that field only
        let doenjang = records[1].per_100g.unwrap();
        assert_eq!(doenjang.carbohydrates, 0.0);
        assert_eq!(doenjang.protein, 2.9);

        assert_eq!(records[2].key, "오징어 볶음");
        assert_eq!(records[2].per_100g.unwrap().calories, 1120.0);
    }

    #[test]
    fn test_missing_name_column_is_an_error() {
        let result = parse_reference_csv("code,kcal\n1,2\n", &ReferenceColumns::default());
        assert!(matches!(result, Err(AppError::Vocabulary(_))));
        assert!(parse_reference_csv("", &ReferenceColumns::default()).is_err());
    }

    #[test]
    fn test_names_only_dataset() {
        let records = parse_reference_csv("식품명\n비빔밥\n갈비탕\n", &ReferenceColumns::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.per_100g.is_none()));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nutrition.csv");
        fs::write(&path, SAMPLE).unwrap();

        let dataset = ReferenceDataset::load(&path, &ReferenceColumns::default()).unwrap();
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.keys().next(), Some("김치찌개"));

        let missing = ReferenceDataset::load(dir.path().join("nope.csv"), &ReferenceColumns::default());
        assert!(missing.is_err());
    }
}
