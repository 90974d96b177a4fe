use anyhow::Result;
use menu_nutrition::api::{self, AppState};
use menu_nutrition::config::AppConfig;
use menu_nutrition::confidence_filter::ConfidenceFilter;
use menu_nutrition::error_correction::load_correction_table;
use menu_nutrition::localization::LocalizationManager;
use menu_nutrition::matcher::MenuMatcher;
use menu_nutrition::nutrition::{
    ChainedNutritionSource, FoodSafetyApiClient, LocalNutritionTable, NutritionResolver,
    NutritionSource,
};
use menu_nutrition::observability::{self, ReadinessState};
use menu_nutrition::ocr::{OcrEngine, TesseractEngine};
use menu_nutrition::pipeline::FoodRecognitionPipeline;
use menu_nutrition::reference_data::ReferenceDataset;
use menu_nutrition::serving_size::ServingSizeTable;
use menu_nutrition::text_normalizer::TextNormalizer;
use menu_nutrition::vocabulary::{MenuVocabulary, VocabularySource};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Interval of the background readiness metric
const HEALTH_METRICS_INTERVAL: Duration = Duration::from_secs(30);

/// Load the reference dataset once for the vocabulary and the local table
///
/// A missing or empty dataset leaves the service running on the fallback
/// vocabulary without local nutrition.
fn load_reference_data(config: &AppConfig) -> (MenuVocabulary, LocalNutritionTable) {
    let max_fuzzy = config.pipeline.max_fuzzy_dissimilarity;
    match ReferenceDataset::load(&config.data.reference_csv_path, &config.data.columns) {
        Ok(dataset) if !dataset.is_empty() => (
            MenuVocabulary::from_dataset(&dataset),
            LocalNutritionTable::from_dataset(&dataset, max_fuzzy),
        ),
        Ok(_) => {
            warn!(path = %config.data.reference_csv_path, "Reference dataset is empty, using fallback vocabulary");
            (
                MenuVocabulary::fallback(),
                LocalNutritionTable::from_dataset(&ReferenceDataset::default(), max_fuzzy),
            )
        }
        Err(e) => {
            warn!(path = %config.data.reference_csv_path, error = %e, "Reference dataset unavailable, using fallback vocabulary");
            (
                MenuVocabulary::fallback(),
                LocalNutritionTable::from_dataset(&ReferenceDataset::default(), max_fuzzy),
            )
        }
    }
}

/// Local table first, then the remote API when a key is configured
fn build_nutrition_source(
    config: &AppConfig,
    local: LocalNutritionTable,
) -> Result<Arc<dyn NutritionSource>> {
    let mut sources: Vec<Arc<dyn NutritionSource>> = vec![Arc::new(local)];
    if config.nutrition_api.is_enabled() {
        sources.push(Arc::new(FoodSafetyApiClient::new(config.nutrition_api.clone())?));
    } else {
        info!("NUTRITION_API_KEY not set, remote nutrition lookups disabled");
    }

    let chained = ChainedNutritionSource::new(sources);
    info!(sources = ?chained.source_names(), "Nutrition sources configured");
    Ok(Arc::new(chained))
}

#[tokio::main]
async fn main() -> Result<()> {
    let startup = Instant::now();

    // Load environment variables from .env file first
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    config.validate().map_err(|e| {
        anyhow::anyhow!("Configuration validation failed: {}. Please check your environment.", e)
    })?;

    let readiness = ReadinessState::new();
    observability::init_observability(&config.observability, Arc::clone(&readiness)).await?;
    info!("{}", config.summary());

    let (vocabulary, local_table) = load_reference_data(&config);
    readiness.set_vocabulary(
        vocabulary.len(),
        matches!(vocabulary.source(), VocabularySource::Dataset(_)),
    );
    info!(
        entries = %vocabulary.len(),
        source = ?vocabulary.source(),
        local_nutrition_records = %local_table.len(),
        "Menu vocabulary loaded"
    );
    let vocabulary_entries = vocabulary.len();

    let normalizer = TextNormalizer::new(load_correction_table(
        config.data.corrections_path.as_deref(),
    ));

    let engine = TesseractEngine::new(config.ocr.clone());
    match engine.warm_up() {
        Ok(()) => info!(languages = %config.ocr.languages, "OCR engine ready"),
        Err(e) => warn!(error = %e, "OCR engine failed to initialize, requests will retry"),
    }
    readiness.set_ocr_languages(&config.ocr.languages);
    let engine: Arc<dyn OcrEngine> = Arc::new(engine);

    let resolver = NutritionResolver::new(
        build_nutrition_source(&config, local_table)?,
        Arc::new(ServingSizeTable::builtin()),
        normalizer.clone(),
    );

    let pipeline = FoodRecognitionPipeline::new(
        engine,
        normalizer,
        MenuMatcher::new(Arc::new(vocabulary)),
        ConfidenceFilter::new(config.pipeline.clone()),
        resolver,
    );

    let state = AppState {
        pipeline: Arc::new(pipeline),
        localization: Arc::new(LocalizationManager::new()?),
        readiness: Arc::clone(&readiness),
        max_upload_bytes: config.server.max_upload_bytes,
    };

    let addr = format!("{}:{}", config.server.api_host, config.server.api_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    observability::record_startup_metrics(startup.elapsed(), vocabulary_entries);
    readiness.mark_started();
    let _health_metrics_handle =
        observability::health_checks::start_health_metrics_recorder(readiness, HEALTH_METRICS_INTERVAL);

    info!(address = %addr, "Menu nutrition API listening");
    axum::serve(listener, api::router(state)).await?;

    Ok(())
}
