//! # Nutrition Module
//!
//! Maps a resolved menu name to nutrition facts. Two sources exist: the local
//! reference table (per 100g, scaled by serving size) and the food safety open
//! API (values already per serving). They are combined by
//! [`ChainedNutritionSource`] and consumed through [`NutritionResolver`].
//!
//! A lookup that finds nothing is `Ok(None)`, never a zero-filled struct.
//! Errors from a source are per-candidate: the resolver turns them into a
//! [`CandidateFailure`] and the rest of the batch carries on.

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Instrument};

use crate::cache::NutritionCache;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::NutritionApiConfig;
use crate::errors::{error_logging, AppError, AppResult, CandidateFailure};
use crate::matcher::closest_by_edit_distance;
use crate::observability;
use crate::ocr_config::RecoveryConfig;
use crate::reference_data::{reference_key, ReferenceDataset};
use crate::serving_size::ServingSizeTable;
use crate::text_normalizer::TextNormalizer;

/// Energy and macronutrients. Per 100g or per serving depending on context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionFacts {
    pub calories: f64,
    pub carbohydrates: f64,
    pub protein: f64,
    pub fat: f64,
}

impl NutritionFacts {
    /// Multiply every field by `factor`, rounding to one decimal
    ///
    /// ```rust
    /// use menu_nutrition::nutrition::NutritionFacts;
    ///
    /// let per_100g = NutritionFacts { calories: 200.0, carbohydrates: 10.0, protein: 5.0, fat: 3.33 };
    /// let serving = per_100g.scaled(300.0 / 100.0);
    /// assert_eq!(serving.calories, 600.0);
    /// assert_eq!(serving.fat, 10.0);
    /// ```
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            calories: round1(self.calories * factor),
            carbohydrates: round1(self.carbohydrates * factor),
            protein: round1(self.protein * factor),
            fat: round1(self.fat * factor),
        }
    }
}

/// Round to one decimal place
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// What quantity a source's values refer to
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NutritionBasis {
    Per100g,
    /// Already per serving; the source may report the serving weight
    PerServing { serving_size_g: Option<f64> },
}

/// A hit from a nutrition source
#[derive(Debug, Clone, PartialEq)]
pub struct NutritionLookup {
    /// Name of the reference entry that answered
    pub reference_name: String,
    pub facts: NutritionFacts,
    pub basis: NutritionBasis,
    /// Source label for logs and metrics
    pub source: &'static str,
}

/// A queryable nutrition data source
#[async_trait]
pub trait NutritionSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the source has no entry for `food_name`
    async fn lookup(&self, food_name: &str) -> AppResult<Option<NutritionLookup>>;
}

/// In-memory reference table with exact then fuzzy lookup
#[derive(Debug, Clone)]
pub struct LocalNutritionTable {
    /// (key, facts per 100g), in dataset order
    entries: Vec<(String, NutritionFacts)>,
    index: HashMap<String, usize>,
    max_fuzzy_dissimilarity: f64,
}

impl LocalNutritionTable {
    /// Index the records that carry nutrient values. First occurrence of a key wins.
    pub fn from_dataset(dataset: &ReferenceDataset, max_fuzzy_dissimilarity: f64) -> Self {
        let mut entries = Vec::new();
        let mut index = HashMap::new();

        for record in &dataset.records {
            let Some(facts) = record.per_100g else {
                continue;
            };
            if index.contains_key(&record.key) {
                continue;
            }
            index.insert(record.key.clone(), entries.len());
            entries.push((record.key.clone(), facts));
        }

        info!(entry_count = %entries.len(), "Local nutrition table indexed");

        Self {
            entries,
            index,
            max_fuzzy_dissimilarity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Synchronous lookup behind the [`NutritionSource`] impl
    pub fn find(&self, food_name: &str) -> Option<NutritionLookup> {
        let query = reference_key(food_name)?;

        if let Some(&idx) = self.index.get(&query) {
            let (key, facts) = &self.entries[idx];
            return Some(self.hit(key, *facts));
        }

        let max_ratio = self.max_fuzzy_dissimilarity;
        let query_len = query.chars().count();
        let best = closest_by_edit_distance(
            &query,
            self.entries.iter().map(|(key, _)| key.as_str()),
            |candidate, distance| {
                let longest = query_len.max(candidate.chars().count()).max(1);
                distance as f64 / longest as f64 <= max_ratio
            },
        )?;

        debug!(
            query = %query,
            reference = %best.name,
            distance = %best.distance,
            "Fuzzy nutrition table hit"
        );
        let idx = *self.index.get(best.name)?;
        let (key, facts) = &self.entries[idx];
        Some(self.hit(key, *facts))
    }

    fn hit(&self, key: &str, facts: NutritionFacts) -> NutritionLookup {
        NutritionLookup {
            reference_name: key.to_string(),
            facts,
            basis: NutritionBasis::Per100g,
            source: self.name(),
        }
    }
}

#[async_trait]
impl NutritionSource for LocalNutritionTable {
    fn name(&self) -> &'static str {
        "local_table"
    }

    async fn lookup(&self, food_name: &str) -> AppResult<Option<NutritionLookup>> {
        let result = self.find(food_name);
        observability::record_nutrition_lookup(
            self.name(),
            if result.is_some() { "hit" } else { "miss" },
        );
        Ok(result)
    }
}

/// Client for the food safety open data nutrition service
///
/// Request shape: `GET {base}/{key}/{service}/json/1/1/DESC_KOR={name}`.
/// The first row of `{service}.row` carries `NUTR_CONT1..4`
/// (kcal, carbohydrate, protein, fat) for one serving.
pub struct FoodSafetyApiClient {
    http: reqwest::Client,
    config: NutritionApiConfig,
    api_key: String,
    cache: NutritionCache,
    circuit_breaker: CircuitBreaker,
}

impl FoodSafetyApiClient {
    pub fn new(config: NutritionApiConfig) -> AppResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| AppError::Config("nutrition API key is not set".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let breaker_config = RecoveryConfig {
            circuit_breaker_threshold: config.circuit_breaker_threshold,
            circuit_breaker_reset_secs: config.circuit_breaker_reset_secs,
            ..RecoveryConfig::default()
        };

        Ok(Self {
            http,
            cache: NutritionCache::new(
                Duration::from_secs(config.cache_ttl_secs),
                config.cache_max_entries,
            ),
            circuit_breaker: CircuitBreaker::new("nutrition_api", &breaker_config),
            api_key,
            config,
        })
    }

    /// Build the request URL, percent-encoding the food name
    pub fn request_url(&self, food_name: &str) -> AppResult<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.config.base_url).map_err(|e| {
            AppError::Config(format!(
                "invalid nutrition API base URL '{}': {}",
                self.config.base_url, e
            ))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                AppError::Config(format!(
                    "nutrition API base URL '{}' cannot carry a path",
                    self.config.base_url
                ))
            })?
            .pop_if_empty()
            .extend(&[
                self.api_key.as_str(),
                self.config.service_id.as_str(),
                "json",
                "1",
                "1",
                &format!("DESC_KOR={}", food_name),
            ]);
        Ok(url)
    }

    pub fn cache(&self) -> &NutritionCache {
        &self.cache
    }

    async fn fetch(&self, food_name: &str) -> AppResult<Option<NutritionLookup>> {
        let url = self.request_url(food_name)?;
        let response = self.http.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Nutrition(format!(
                "nutrition API returned HTTP {}",
                status
            )));
        }

        let body: serde_json::Value = response.json().await?;
        if let Some(err) = api_result_error(&body, &self.config.service_id) {
            return Err(err);
        }
        Ok(parse_api_response(&body, &self.config.service_id))
    }
}

#[async_trait]
impl NutritionSource for FoodSafetyApiClient {
    fn name(&self) -> &'static str {
        "food_safety_api"
    }

    async fn lookup(&self, food_name: &str) -> AppResult<Option<NutritionLookup>> {
        let span = observability::nutrition_span("api_lookup", self.name());

        async {
            if let Some(cached) = self.cache.get(food_name) {
                observability::record_nutrition_lookup(self.name(), "cache");
                return Ok(cached);
            }

            if self.circuit_breaker.is_open() {
                observability::update_circuit_breaker_state(self.circuit_breaker.name(), true);
                observability::record_nutrition_lookup(self.name(), "circuit_open");
                return Err(AppError::Network(
                    "nutrition API circuit breaker is open".to_string(),
                ));
            }

            let start = Instant::now();
            match self.fetch(food_name).await {
                Ok(result) => {
                    self.circuit_breaker.record_success();
                    observability::update_circuit_breaker_state(self.circuit_breaker.name(), false);
                    self.cache.insert(food_name, result.clone());
                    observability::record_nutrition_lookup(
                        self.name(),
                        if result.is_some() { "hit" } else { "miss" },
                    );
                    debug!(
                        food = %food_name,
                        found = %result.is_some(),
                        duration_ms = %start.elapsed().as_millis(),
                        "Nutrition API lookup finished"
                    );
                    Ok(result)
                }
                Err(e) => {
                    self.circuit_breaker.record_failure();
                    observability::update_circuit_breaker_state(
                        self.circuit_breaker.name(),
                        self.circuit_breaker.is_open(),
                    );
                    observability::record_nutrition_lookup(self.name(), "error");
                    error_logging::log_network_error(
                        &e,
                        "nutrition_api_lookup",
                        Some(self.config.base_url.as_str()),
                        Some(self.circuit_breaker.failure_count()),
                    );
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Result codes meaning "answered", with or without rows
const API_OK_CODES: &[&str] = &["INFO-000", "INFO-200"];

/// The error a service response reports in its `RESULT` block, if any
///
/// Key and quota errors arrive as HTTP 200 with a top-level `RESULT`,
/// others inside the service object.
pub fn api_result_error(body: &serde_json::Value, service_id: &str) -> Option<AppError> {
    let result = body
        .get("RESULT")
        .or_else(|| body.get(service_id).and_then(|service| service.get("RESULT")))?;
    let code = result.get("CODE").and_then(|v| v.as_str())?;
    if API_OK_CODES.contains(&code) {
        return None;
    }
    let message = result.get("MSG").and_then(|v| v.as_str()).unwrap_or_default();
    Some(AppError::Nutrition(format!(
        "nutrition API answered {}: {}",
        code, message
    )))
}

/// Extract the first result row of a service response
///
/// Missing rows mean "not found". Numeric fields may arrive as strings or
/// numbers; unparsable ones become 0.0.
pub fn parse_api_response(body: &serde_json::Value, service_id: &str) -> Option<NutritionLookup> {
    let row = body.get(service_id)?.get("row")?.get(0)?;

    let number = |field: &str| -> Option<f64> {
        match row.get(field)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => leading_number(s),
            _ => None,
        }
    };

    let facts = NutritionFacts {
        calories: number("NUTR_CONT1").unwrap_or(0.0),
        carbohydrates: number("NUTR_CONT2").unwrap_or(0.0),
        protein: number("NUTR_CONT3").unwrap_or(0.0),
        fat: number("NUTR_CONT4").unwrap_or(0.0),
    };
    let reference_name = row
        .get("DESC_KOR")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .trim()
        .to_string();
    let serving_size_g = number("SERVING_WT").filter(|g| *g > 0.0);

    Some(NutritionLookup {
        reference_name,
        facts,
        basis: NutritionBasis::PerServing { serving_size_g },
        source: "food_safety_api",
    })
}

// "350g" -> 350.0, "1,200" -> 1200.0
fn leading_number(text: &str) -> Option<f64> {
    let digits: String = text
        .trim()
        .chars()
        .filter(|c| *c != ',')
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Queries sources in order and returns the first hit
///
/// A failing source does not hide later ones. The error is only returned
/// when no source answered at all.
pub struct ChainedNutritionSource {
    sources: Vec<Arc<dyn NutritionSource>>,
}

impl ChainedNutritionSource {
    pub fn new(sources: Vec<Arc<dyn NutritionSource>>) -> Self {
        Self { sources }
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }
}

#[async_trait]
impl NutritionSource for ChainedNutritionSource {
    fn name(&self) -> &'static str {
        "chained"
    }

    async fn lookup(&self, food_name: &str) -> AppResult<Option<NutritionLookup>> {
        let mut last_error = None;

        for source in &self.sources {
            match source.lookup(food_name).await {
                Ok(Some(hit)) => return Ok(Some(hit)),
                Ok(None) => {}
                Err(e) => {
                    warn!(source = %source.name(), food = %food_name, error = %e, "Nutrition source failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

/// Nutrition for one menu, per serving
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedNutrition {
    pub facts: NutritionFacts,
    pub serving_size_g: f64,
    pub reference_name: String,
    pub source: &'static str,
}

/// Turns matched menu names into per-serving nutrition
#[derive(Clone)]
pub struct NutritionResolver {
    source: Arc<dyn NutritionSource>,
    servings: Arc<ServingSizeTable>,
    normalizer: TextNormalizer,
}

impl NutritionResolver {
    pub fn new(
        source: Arc<dyn NutritionSource>,
        servings: Arc<ServingSizeTable>,
        normalizer: TextNormalizer,
    ) -> Self {
        Self {
            source,
            servings,
            normalizer,
        }
    }

    /// Look up `menu_name` and scale to its serving size
    pub async fn resolve(&self, menu_name: &str) -> AppResult<Option<ResolvedNutrition>> {
        let Some(hit) = self.source.lookup(menu_name).await? else {
            return Ok(None);
        };

        let resolved = match hit.basis {
            NutritionBasis::Per100g => {
                let grams = self.servings.grams_for(menu_name);
                ResolvedNutrition {
                    facts: hit.facts.scaled(grams / 100.0),
                    serving_size_g: grams,
                    reference_name: hit.reference_name,
                    source: hit.source,
                }
            }
            NutritionBasis::PerServing { serving_size_g } => ResolvedNutrition {
                facts: hit.facts.scaled(1.0),
                serving_size_g: serving_size_g
                    .unwrap_or_else(|| self.servings.grams_for(menu_name)),
                reference_name: hit.reference_name,
                source: hit.source,
            },
        };

        debug!(
            menu = %menu_name,
            reference = %resolved.reference_name,
            source = %resolved.source,
            serving_size_g = %resolved.serving_size_g,
            calories = %resolved.facts.calories,
            "Nutrition resolved"
        );
        Ok(Some(resolved))
    }

    /// Resolve the matched name, then retry once with the cleaned original text
    pub async fn resolve_candidate(
        &self,
        matched_name: &str,
        original_text: &str,
    ) -> Result<ResolvedNutrition, CandidateFailure> {
        let mut reasons = Vec::new();

        match self.resolve(matched_name).await {
            Ok(Some(resolved)) => return Ok(resolved),
            Ok(None) => reasons.push(format!("no entry for '{}'", matched_name)),
            Err(e) => reasons.push(e.to_string()),
        }

        let fallback = self.normalizer.clean_for_lookup(original_text);
        if !fallback.is_empty() && fallback != matched_name {
            match self.resolve(&fallback).await {
                Ok(Some(resolved)) => {
                    debug!(menu = %matched_name, retry = %fallback, "Nutrition resolved from original text");
                    return Ok(resolved);
                }
                Ok(None) => reasons.push(format!("no entry for '{}'", fallback)),
                Err(e) => reasons.push(e.to_string()),
            }
        }

        Err(CandidateFailure::NutritionLookupFailed {
            menu: matched_name.to_string(),
            reason: reasons.join("; "),
        })
    }

    /// Resolve `(matched_name, original_text)` pairs concurrently, results in input order
    pub async fn resolve_all(
        &self,
        candidates: &[(String, String)],
    ) -> Vec<Result<ResolvedNutrition, CandidateFailure>> {
        let span = observability::nutrition_span("resolve_all", self.source.name());
        join_all(
            candidates
                .iter()
                .map(|(matched, original)| self.resolve_candidate(matched, original)),
        )
        .instrument(span)
        .await
    }
}
