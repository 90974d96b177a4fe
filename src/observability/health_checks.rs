//! Health check functionality module.
//!
//! This module provides:
//! - OCR engine availability checks
//! - Reference data checks
//! - Readiness checks for the metrics server and the API `/health` route

use anyhow::Result;
use leptess::LepTess;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Startup facts the readiness probe reports on
#[derive(Debug, Default)]
pub struct ReadinessState {
    /// Set once startup has finished
    started: AtomicBool,
    vocabulary_entries: AtomicUsize,
    /// True when the reference dataset loaded (not the fallback vocabulary)
    dataset_loaded: AtomicBool,
    ocr_languages: parking_lot::RwLock<Option<String>>,
}

impl ReadinessState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_vocabulary(&self, entries: usize, from_dataset: bool) {
        self.vocabulary_entries.store(entries, Ordering::Relaxed);
        self.dataset_loaded.store(from_dataset, Ordering::Relaxed);
    }

    pub fn set_ocr_languages(&self, languages: &str) {
        *self.ocr_languages.write() = Some(languages.to_string());
    }

    pub fn mark_started(&self) {
        self.started.store(true, Ordering::Release);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn vocabulary_entries(&self) -> usize {
        self.vocabulary_entries.load(Ordering::Relaxed)
    }

    pub fn dataset_loaded(&self) -> bool {
        self.dataset_loaded.load(Ordering::Relaxed)
    }
}

/// Perform comprehensive readiness checks
///
/// A fallback vocabulary is degraded, not unready.
pub async fn perform_readiness_checks(state: &ReadinessState) -> Result<()> {
    if !state.is_started() {
        return Err(anyhow::anyhow!("Startup has not finished"));
    }

    if state.vocabulary_entries() == 0 {
        return Err(anyhow::anyhow!("Menu vocabulary is empty"));
    }

    let languages = state.ocr_languages.read().clone();
    if let Some(languages) = languages {
        check_ocr_health(&languages).await?;
    }

    if !state.dataset_loaded() {
        tracing::debug!("Readiness passed with fallback vocabulary");
    }
    Ok(())
}

/// Check OCR engine availability by testing Tesseract initialization
pub async fn check_ocr_health(languages: &str) -> Result<()> {
    let languages = languages.to_string();
    let result = tokio::task::spawn_blocking(move || LepTess::new(None, &languages).map(|_| ())).await?;
    match result {
        Ok(()) => {
            tracing::debug!("OCR health check passed");
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("OCR health check failed: {}", e)),
    }
}

/// Start a background task to periodically record health check metrics
pub fn start_health_metrics_recorder(
    state: Arc<ReadinessState>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;

            let check_start = Instant::now();
            let ready = perform_readiness_checks(&state).await.is_ok();
            super::metrics::record_health_check_metrics("readiness", ready, check_start.elapsed());
        }
    })
}
