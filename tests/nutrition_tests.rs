//! # Nutrition Resolution Tests
//!
//! Reference CSV loading, per-serving scaling and the food safety API client
//! against a local mock server.

use axum::{extract::State, http::StatusCode, http::Uri, response::IntoResponse, Json, Router};
use menu_nutrition::config::NutritionApiConfig;
use menu_nutrition::nutrition::{
    ChainedNutritionSource, FoodSafetyApiClient, LocalNutritionTable, NutritionBasis,
    NutritionResolver, NutritionSource,
};
use menu_nutrition::reference_data::{ReferenceColumns, ReferenceDataset};
use menu_nutrition::serving_size::ServingSizeTable;
use menu_nutrition::text_normalizer::TextNormalizer;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;

fn write_csv(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn resolver_for(source: Arc<dyn NutritionSource>) -> NutritionResolver {
    NutritionResolver::new(
        source,
        Arc::new(ServingSizeTable::builtin()),
        TextNormalizer::default(),
    )
}

#[derive(Clone)]
struct MockApi {
    requests: Arc<AtomicUsize>,
    fail: bool,
}

async fn mock_handler(State(mock): State<MockApi>, uri: Uri) -> impl IntoResponse {
    mock.requests.fetch_add(1, Ordering::SeqCst);
    if mock.fail {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({}))).into_response();
    }
    if !uri.path().contains("DESC_KOR=") {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({}))).into_response();
    }
    Json(serde_json::json!({
        "I2790": {
            "total_count": "1",
            "row": [{
                "DESC_KOR": "김치찌개",
                "SERVING_WT": "400",
                "NUTR_CONT1": "180.2",
                "NUTR_CONT2": "9.8",
                "NUTR_CONT3": "13.1",
                "NUTR_CONT4": "9.4"
            }]
        }
    }))
    .into_response()
}

/// Serve the mock API on an ephemeral port and return its base URL
async fn spawn_mock_api(fail: bool) -> (String, Arc<AtomicUsize>) {
    let requests = Arc::new(AtomicUsize::new(0));
    let app = Router::new().fallback(mock_handler).with_state(MockApi {
        requests: Arc::clone(&requests),
        fail,
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/api", addr), requests)
}

fn api_config(base_url: String) -> NutritionApiConfig {
    NutritionApiConfig {
        base_url,
        api_key: Some("test-key".to_string()),
        circuit_breaker_threshold: 2,
        ..NutritionApiConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_per_100g_values_scale_to_serving() {
        let csv = write_csv(
            "식품명,에너지(kcal),탄수화물(g),단백질(g),지방(g)\n떡볶이,200,40,4,2\n",
        );
        let dataset = ReferenceDataset::load(csv.path(), &ReferenceColumns::default()).unwrap();
        let table = LocalNutritionTable::from_dataset(&dataset, 0.5);
        let resolver = resolver_for(Arc::new(table));

        let resolved = resolver.resolve("떡볶이").await.unwrap().unwrap();
        // 200 kcal per 100g at a 300g serving
        assert_eq!(resolved.serving_size_g, 300.0);
        assert_eq!(resolved.facts.calories, 600.0);
        assert_eq!(resolved.facts.carbohydrates, 120.0);
        assert_eq!(resolved.source, "local_table");
    }

    #[tokio::test]
    async fn test_shipped_dataset_resolves() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/data/nutrition_db.csv");
        let dataset = ReferenceDataset::load(path, &ReferenceColumns::default()).unwrap();
        assert!(!dataset.is_empty());

        let resolver = resolver_for(Arc::new(LocalNutritionTable::from_dataset(&dataset, 0.5)));
        let resolved = resolver.resolve("김치찌개").await.unwrap().unwrap();
        assert_eq!(resolved.serving_size_g, 350.0);
        assert_eq!(resolved.facts.calories, 217.0);

        // Quoted names are read like any other
        assert!(resolver.resolve("고등어구이").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_names_only_dataset_has_no_nutrition() {
        let csv = write_csv("\u{feff}식품명\n비빔밥\n김치찌개\n");
        let dataset = ReferenceDataset::load(csv.path(), &ReferenceColumns::default()).unwrap();
        assert_eq!(dataset.len(), 2);

        let resolver = resolver_for(Arc::new(LocalNutritionTable::from_dataset(&dataset, 0.5)));
        assert!(resolver.resolve("비빔밥").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_name_column_is_an_error() {
        let csv = write_csv("name,kcal\n비빔밥,100\n");
        assert!(ReferenceDataset::load(csv.path(), &ReferenceColumns::default()).is_err());
    }

    #[tokio::test]
    async fn test_api_values_are_per_serving_and_cached() {
        let (base_url, requests) = spawn_mock_api(false).await;
        let client = FoodSafetyApiClient::new(api_config(base_url)).unwrap();

        let hit = client.lookup("김치찌개").await.unwrap().unwrap();
        assert_eq!(hit.facts.calories, 180.2);
        assert_eq!(
            hit.basis,
            NutritionBasis::PerServing {
                serving_size_g: Some(400.0)
            }
        );

        // Second lookup is answered by the cache
        assert!(client.lookup("김치찌개").await.unwrap().is_some());
        assert_eq!(requests.load(Ordering::SeqCst), 1);

        // Serving weight from the API wins over the table's 350g
        let resolver = resolver_for(Arc::new(client));
        let resolved = resolver.resolve("김치찌개").await.unwrap().unwrap();
        assert_eq!(resolved.serving_size_g, 400.0);
        assert_eq!(resolved.facts.calories, 180.2);
    }

    #[tokio::test]
    async fn test_api_failures_open_the_circuit_breaker() {
        let (base_url, requests) = spawn_mock_api(true).await;
        let client = FoodSafetyApiClient::new(api_config(base_url)).unwrap();

        assert!(client.lookup("비빔밥").await.is_err());
        assert!(client.lookup("비빔밥").await.is_err());
        assert_eq!(requests.load(Ordering::SeqCst), 2);

        // Threshold reached: no further requests go out
        assert!(client.lookup("비빔밥").await.is_err());
        assert_eq!(requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_local_table_answers_before_the_api() {
        let (base_url, requests) = spawn_mock_api(false).await;
        let csv = write_csv("식품명,에너지(kcal),탄수화물(g),단백질(g),지방(g)\n비빔밥,150,25,5,4\n");
        let dataset = ReferenceDataset::load(csv.path(), &ReferenceColumns::default()).unwrap();

        let chain = ChainedNutritionSource::new(vec![
            Arc::new(LocalNutritionTable::from_dataset(&dataset, 0.5)),
            Arc::new(FoodSafetyApiClient::new(api_config(base_url)).unwrap()),
        ]);

        let local = chain.lookup("비빔밥").await.unwrap().unwrap();
        assert_eq!(local.source, "local_table");
        assert_eq!(requests.load(Ordering::SeqCst), 0);

        let remote = chain.lookup("김치찌개").await.unwrap().unwrap();
        assert_eq!(remote.source, "food_safety_api");
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }
}
