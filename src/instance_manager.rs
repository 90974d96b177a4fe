//! # OCR Instance Manager Module
//!
//! Thread-safe pool of Tesseract instances, one per language/PSM combination.
//! Loading the Korean traineddata takes hundreds of milliseconds, so instances
//! are created once and reused for every request.

use leptess::LepTess;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::ocr_config::OcrConfig;

/// Shared handle to one Tesseract instance
pub type SharedTess = Arc<Mutex<LepTess>>;

/// Thread-safe OCR instance manager for reusing Tesseract instances
///
/// Instances are created on first request for a configuration and persist
/// until cleared. A single instance is used by one recognition at a time
/// (it sits behind its own mutex), including a recognition whose caller
/// already gave up on a timeout.
pub struct OcrInstanceManager {
    instances: Mutex<HashMap<String, SharedTess>>,
}

impl OcrInstanceManager {
    /// Create an empty instance pool
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
        }
    }

    fn instance_key(config: &OcrConfig) -> String {
        format!(
            "{}:{}:{}",
            config.languages,
            config.psm_mode.as_str(),
            config.tessdata_path.as_deref().unwrap_or("default")
        )
    }

    /// Get or create an OCR instance for the given configuration
    ///
    /// # Errors
    ///
    /// Returns error if Tesseract cannot be initialized (missing traineddata,
    /// invalid language codes).
    pub fn get_instance(&self, config: &OcrConfig) -> anyhow::Result<SharedTess> {
        let key = Self::instance_key(config);

        if let Some(instance) = self.instances.lock().get(&key) {
            return Ok(Arc::clone(instance));
        }

        info!(
            languages = %config.languages,
            psm = %config.psm_mode.as_str(),
            "Creating new OCR instance"
        );

        let mut tess = LepTess::new(config.tessdata_path.as_deref(), &config.languages)
            .map_err(|e| anyhow::anyhow!("Failed to initialize Tesseract OCR instance: {}", e))?;

        tess.set_variable(
            leptess::Variable::TesseditPagesegMode,
            config.psm_mode.as_str(),
        )
        .map_err(|e| anyhow::anyhow!("Failed to set PSM mode: {}", e))?;

        let instance = Arc::new(Mutex::new(tess));

        // Another request may have raced us here; keep whichever landed first
        let mut instances = self.instances.lock();
        let stored = instances.entry(key).or_insert_with(|| Arc::clone(&instance));
        Ok(Arc::clone(stored))
    }

    /// Clear all instances
    pub fn clear(&self) {
        let mut instances = self.instances.lock();
        let count = instances.len();
        instances.clear();
        if count > 0 {
            info!("Cleared {count} OCR instances");
        }
    }

    /// Get the number of cached instances
    pub fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }
}

impl Default for OcrInstanceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_key_distinguishes_psm() {
        let sparse = OcrConfig::default();
        let block = OcrConfig {
            psm_mode: crate::ocr_config::PageSegMode::SingleBlock,
            ..Default::default()
        };
        assert_ne!(
            OcrInstanceManager::instance_key(&sparse),
            OcrInstanceManager::instance_key(&block)
        );
    }

    #[test]
    fn test_new_manager_is_empty() {
        let manager = OcrInstanceManager::new();
        assert_eq!(manager.instance_count(), 0);
        manager.clear();
        assert_eq!(manager.instance_count(), 0);
    }
}
