//! Typical single-portion weights, used to turn per-100g reference values into
//! per-serving estimates.

use crate::errors::{AppError, AppResult};

/// Grams assumed when no entry matches
pub const DEFAULT_SERVING_GRAMS: f64 = 100.0;

const BUILTIN_SERVINGS: &[(&str, f64)] = &[
    ("김치찌개", 350.0),
    ("된장찌개", 350.0),
    ("부대찌개", 400.0),
    ("순두부찌개", 400.0),
    ("찌개", 350.0),
    ("갈비탕", 700.0),
    ("닭볶음탕", 500.0),
    ("해물탕", 600.0),
    ("탕", 600.0),
    ("만두국", 700.0),
    ("국밥", 600.0),
    ("국", 400.0),
    ("비빔밥", 500.0),
    ("볶음밥", 400.0),
    ("덮밥", 450.0),
    ("밥", 210.0),
    ("돈까스", 200.0),
    ("치킨가라아게", 200.0),
    ("치킨", 250.0),
    ("소세지", 100.0),
    ("피자", 300.0),
    ("햄버거", 250.0),
    ("샌드위치", 200.0),
    ("불고기", 200.0),
    ("감자튀김", 150.0),
    ("스테이크", 250.0),
    ("파스타", 350.0),
    ("라면", 500.0),
    ("냉면", 600.0),
    ("김밥", 250.0),
    ("떡볶이", 300.0),
];

/// Menu-name substring → grams per serving
///
/// Lookup takes the longest key contained in the name, so `김치찌개` (350g)
/// is never overridden by the shorter `찌개`.
#[derive(Debug, Clone)]
pub struct ServingSizeTable {
    entries: Vec<(String, f64)>,
    default_grams: f64,
}

impl Default for ServingSizeTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ServingSizeTable {
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN_SERVINGS
                .iter()
                .map(|(name, grams)| (name.to_string(), *grams))
                .collect(),
            default_grams: DEFAULT_SERVING_GRAMS,
        }
    }

    pub fn new(entries: Vec<(String, f64)>, default_grams: f64) -> AppResult<Self> {
        let table = Self {
            entries,
            default_grams,
        };
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> AppResult<()> {
        if !self.default_grams.is_finite() || self.default_grams <= 0.0 {
            return Err(AppError::Config(
                "default serving size must be greater than 0".to_string(),
            ));
        }
        for (name, grams) in &self.entries {
            if name.trim().is_empty() {
                return Err(AppError::Config("serving size key cannot be empty".to_string()));
            }
            if !grams.is_finite() || *grams <= 0.0 {
                return Err(AppError::Config(format!(
                    "serving size for '{}' must be a positive number, got {}",
                    name, grams
                )));
            }
        }
        Ok(())
    }

    /// Serving size in grams for a menu name
    ///
    /// ```rust
    /// use menu_nutrition::serving_size::ServingSizeTable;
    ///
    /// let table = ServingSizeTable::builtin();
    /// assert_eq!(table.grams_for("김치찌개"), 350.0);
    /// assert_eq!(table.grams_for("참치김치찌개"), 350.0);
    /// assert_eq!(table.grams_for("샐러드"), 100.0);
    /// ```
    pub fn grams_for(&self, menu_name: &str) -> f64 {
        self.best_entry(menu_name)
            .map(|(_, grams)| grams)
            .unwrap_or(self.default_grams)
    }

    /// The matching key and its grams, if any key is contained in the name
    pub fn best_entry(&self, menu_name: &str) -> Option<(&str, f64)> {
        let mut best: Option<(&str, f64)> = None;
        for (key, grams) in &self.entries {
            if !menu_name.contains(key.as_str()) {
                continue;
            }
            let longer = match best {
                None => true,
                Some((current, _)) => {
                    let (len, current_len) = (key.chars().count(), current.chars().count());
                    len > current_len || (len == current_len && key.as_str() < current)
                }
            };
            if longer {
                best = Some((key.as_str(), *grams));
            }
        }
        best
    }

    pub fn default_grams(&self) -> f64 {
        self.default_grams
    }
}
