//! # Menu Vocabulary Module
//!
//! The canonical set of menu names the matcher resolves against. Built once at
//! startup and shared read-only (`Arc<MenuVocabulary>`) by every request.
//!
//! Every dataset name is indexed, together with each base pattern it contains:
//! `오징어볶음` contributes both `오징어볶음` and `볶음`.

use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

use crate::reference_data::{reference_key, ReferenceColumns, ReferenceDataset};

/// Common dish names extracted from longer compound names
pub const BASE_PATTERNS: &[&str] = &[
    "돈까스",
    "치킨가라아게",
    "소세지",
    "피자",
    "햄버거",
    "샌드위치",
    "김치찌개",
    "된장찌개",
    "갈비탕",
    "만두국",
    "비빔밥",
    "불고기",
    "닭볶음탕",
    "해물탕",
    "감자튀김",
    "치킨",
    "스테이크",
    "파스타",
];

/// Dish-type words indexed on their own when a name contains them.
/// Single-syllable types (탕, 국) are left out: containment would hand them
/// every input that happens to include the syllable.
pub const DISH_TYPE_PATTERNS: &[&str] = &["찌개", "볶음", "볶음밥", "전골", "덮밥"];

/// Used when the reference dataset cannot be loaded
pub const FALLBACK_MENUS: &[&str] = &[
    "비빔밥",
    "김치찌개",
    "된장찌개",
    "갈비탕",
    "만두국",
    "돈까스",
    "치킨가라아게",
    "소세지",
];

/// Where the vocabulary came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VocabularySource {
    Dataset(String),
    Fallback,
    InMemory,
}

/// Immutable menu vocabulary
#[derive(Debug, Clone)]
pub struct MenuVocabulary {
    /// Sorted by character count descending, ties lexicographic
    entries: Vec<String>,
    index: HashSet<String>,
    source: VocabularySource,
}

impl MenuVocabulary {
    /// Build from names, adding the base patterns each name contains
    pub fn from_entries<I>(names: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self::build(names, VocabularySource::InMemory)
    }

    /// The hard-coded vocabulary used when no dataset is available
    pub fn fallback() -> Self {
        Self::build(
            FALLBACK_MENUS.iter().map(|m| m.to_string()),
            VocabularySource::Fallback,
        )
    }

    /// Build from an already loaded reference dataset
    pub fn from_dataset(dataset: &ReferenceDataset) -> Self {
        let source = dataset
            .source
            .as_ref()
            .map(|p| VocabularySource::Dataset(p.display().to_string()))
            .unwrap_or(VocabularySource::InMemory);
        Self::build(dataset.keys().map(str::to_string), source)
    }

    /// Load the dataset at `path` and build the vocabulary
    ///
    /// Never fails: a missing or corrupt dataset is logged and replaced by the
    /// fallback vocabulary.
    pub fn load(path: impl AsRef<Path>, columns: &ReferenceColumns) -> Self {
        let path = path.as_ref();
        match ReferenceDataset::load(path, columns) {
            Ok(dataset) if !dataset.is_empty() => Self::from_dataset(&dataset),
            Ok(_) => {
                warn!(path = %path.display(), "Reference dataset has no menu names, using fallback vocabulary");
                Self::fallback()
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Vocabulary load failed, using fallback vocabulary");
                Self::fallback()
            }
        }
    }

    fn build<I>(names: I, source: VocabularySource) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut index = HashSet::new();

        for name in names {
            let Some(name) = reference_key(&name) else {
                continue;
            };
            for pattern in BASE_PATTERNS.iter().chain(DISH_TYPE_PATTERNS) {
                if name.contains(pattern) {
                    index.insert(pattern.to_string());
                }
            }
            index.insert(name);
        }

        let mut entries: Vec<String> = index.iter().cloned().collect();
        entries.sort_by(|a, b| {
            b.chars()
                .count()
                .cmp(&a.chars().count())
                .then_with(|| a.cmp(b))
        });

        info!(entry_count = %entries.len(), source = ?source, "Menu vocabulary built");

        Self {
            entries,
            index,
            source,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains(name)
    }

    /// Entries ordered longest first
    pub fn entries_longest_first(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn source(&self) -> &VocabularySource {
        &self.source
    }
}
