//! Localized API messages
//!
//! Korean is the default; English is served when `Accept-Language` prefers it.
//! Resources are compiled into the binary from `locales/<lang>/main.ftl`.

use anyhow::Result;
use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use std::collections::HashMap;
use unic_langid::LanguageIdentifier;

/// Language used when nothing better is requested
pub const DEFAULT_LANGUAGE: &str = "ko";

const RESOURCES: &[(&str, &str)] = &[
    ("ko", include_str!("../locales/ko/main.ftl")),
    ("en", include_str!("../locales/en/main.ftl")),
];

/// Localization manager shared by all request handlers
pub struct LocalizationManager {
    bundles: HashMap<String, FluentBundle<FluentResource>>,
}

impl LocalizationManager {
    /// Create a new localization manager
    pub fn new() -> Result<Self> {
        let mut bundles = HashMap::new();

        for (locale_str, source) in RESOURCES {
            let locale: LanguageIdentifier = locale_str.parse()?;
            bundles.insert(locale_str.to_string(), Self::create_bundle(locale, source)?);
        }

        Ok(Self { bundles })
    }

    fn create_bundle(locale: LanguageIdentifier, source: &str) -> Result<FluentBundle<FluentResource>> {
        let mut bundle = FluentBundle::new_concurrent(vec![locale]);
        // No bidi isolation marks around arguments in JSON output
        bundle.set_use_isolating(false);

        let resource = FluentResource::try_new(source.to_string())
            .map_err(|(_, errors)| anyhow::anyhow!("invalid Fluent resource: {:?}", errors))?;
        bundle
            .add_resource(resource)
            .map_err(|errors| anyhow::anyhow!("duplicate Fluent messages: {:?}", errors))?;

        Ok(bundle)
    }

    /// Get a localized message in a specific language
    ///
    /// Unknown languages fall back to Korean; unknown keys return a marker
    /// string instead of failing the response.
    pub fn get_message_in_language(
        &self,
        key: &str,
        language: &str,
        args: Option<&HashMap<&str, String>>,
    ) -> String {
        let bundle = match self
            .bundles
            .get(language)
            .or_else(|| self.bundles.get(DEFAULT_LANGUAGE))
        {
            Some(bundle) => bundle,
            None => return format!("Missing translation: {}", key),
        };

        let Some(pattern) = bundle.get_message(key).and_then(|msg| msg.value()) else {
            return format!("Missing translation: {}", key);
        };

        let fluent_args = args.map(|args| {
            let mut fluent_args = FluentArgs::new();
            for (name, value) in args {
                fluent_args.set(*name, FluentValue::from(value.clone()));
            }
            fluent_args
        });

        let mut errors = vec![];
        let value = bundle.format_pattern(pattern, fluent_args.as_ref(), &mut errors);
        if !errors.is_empty() {
            tracing::warn!(key = %key, language = %language, errors = ?errors, "Fluent formatting errors");
        }
        value.into_owned()
    }

    /// Get a localized message with arguments in a specific language
    pub fn get_message_with_args_in_language(
        &self,
        key: &str,
        language: &str,
        args: &[(&str, String)],
    ) -> String {
        let args_map: HashMap<&str, String> = args.iter().cloned().collect();
        self.get_message_in_language(key, language, Some(&args_map))
    }

    /// Check if a language is supported
    pub fn is_language_supported(&self, language: &str) -> bool {
        self.bundles.contains_key(language)
    }

    /// Pick the best supported language from an `Accept-Language` header
    ///
    /// Entries are ranked by their `q` weight; region subtags are ignored
    /// (`en-US` selects `en`).
    pub fn detect_language(&self, accept_language: Option<&str>) -> String {
        let Some(header) = accept_language else {
            return DEFAULT_LANGUAGE.to_string();
        };

        let mut ranked: Vec<(&str, f32)> = header
            .split(',')
            .filter_map(|entry| {
                let mut parts = entry.trim().split(';');
                let tag = parts.next()?.trim();
                let weight = parts
                    .find_map(|p| p.trim().strip_prefix("q="))
                    .and_then(|q| q.trim().parse::<f32>().ok())
                    .unwrap_or(1.0);
                let primary = tag.split('-').next()?.trim();
                (!primary.is_empty() && weight > 0.0).then_some((primary, weight))
            })
            .collect();
        // Stable sort keeps header order for equal weights
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        ranked
            .into_iter()
            .map(|(lang, _)| lang.to_lowercase())
            .find(|lang| self.is_language_supported(lang))
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_in_both_languages() {
        let manager = LocalizationManager::new().unwrap();
        assert_eq!(
            manager.get_message_in_language("error-no-text-detected", "ko", None),
            "텍스트를 찾을 수 없습니다."
        );
        assert_eq!(
            manager.get_message_in_language("error-no-text-detected", "en", None),
            "No text was found in the image."
        );
    }

    #[test]
    fn test_unknown_language_falls_back_to_korean() {
        let manager = LocalizationManager::new().unwrap();
        assert_eq!(
            manager.get_message_in_language("error-no-confident-text", "fr", None),
            "신뢰도가 높은 텍스트를 찾을 수 없습니다."
        );
    }

    #[test]
    fn test_arguments_are_substituted() {
        let manager = LocalizationManager::new().unwrap();
        let message = manager.get_message_with_args_in_language(
            "error-image-too-large",
            "en",
            &[("max_mb", "10".to_string())],
        );
        assert_eq!(message, "The image is too large. The maximum upload size is 10MB.");
    }

    #[test]
    fn test_missing_key() {
        let manager = LocalizationManager::new().unwrap();
        assert_eq!(
            manager.get_message_in_language("no-such-key", "ko", None),
            "Missing translation: no-such-key"
        );
    }

    #[test]
    fn test_detect_language() {
        let manager = LocalizationManager::new().unwrap();
        assert_eq!(manager.detect_language(None), "ko");
        assert_eq!(manager.detect_language(Some("en-US,en;q=0.9")), "en");
        assert_eq!(manager.detect_language(Some("fr-FR, en;q=0.5, ko;q=0.8")), "ko");
        assert_eq!(manager.detect_language(Some("de")), "ko");
        assert_eq!(manager.detect_language(Some("en;q=0")), "ko");
    }
}
