//! The detection engine.
//!
//! [`Detector`] ties the pieces together: sanitize the input, consult the
//! result cache, run every pattern and keep only validated matches, then
//! cache the outcome (including the empty "clean" result).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::patterns::{PatternId, PatternRegistry};
use super::sanitize::Sanitizer;
use crate::cache::ResultCache;
use crate::config::Config;
use crate::error::Result;
use crate::storage::KeyValueStore;

/// A validated, user-facing result for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Pattern that produced the matches.
    pub pattern_id: PatternId,

    /// Matched substrings in order of appearance. Duplicates are kept.
    pub raw_matches: Vec<String>,

    /// Category label, taken from the pattern.
    pub description: String,
}

/// Findings keyed by pattern id, in registry order.
///
/// Only patterns with at least one validated match appear. An empty result
/// means the text is clean.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectionResult(BTreeMap<PatternId, Finding>);

impl DetectionResult {
    /// Create an empty (clean) result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no sensitive data was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of categories found.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Same as [`is_clean`](Self::is_clean).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The finding for one pattern.
    #[must_use]
    pub fn get(&self, id: &PatternId) -> Option<&Finding> {
        self.0.get(id)
    }

    /// Whether the given pattern produced a finding.
    #[must_use]
    pub fn contains(&self, id: &PatternId) -> bool {
        self.0.contains_key(id)
    }

    /// Add a finding. Findings without matches are ignored.
    pub fn insert(&mut self, finding: Finding) {
        if !finding.raw_matches.is_empty() {
            self.0.insert(finding.pattern_id.clone(), finding);
        }
    }

    /// Findings in registry order.
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.0.values()
    }

    /// Pattern ids in registry order.
    pub fn pattern_ids(&self) -> impl Iterator<Item = &PatternId> {
        self.0.keys()
    }

    /// Total number of matched substrings across all findings.
    #[must_use]
    pub fn match_count(&self) -> usize {
        self.0.values().map(|f| f.raw_matches.len()).sum()
    }

    /// Category descriptions joined with " and ", in registry order.
    #[must_use]
    pub fn describe(&self) -> String {
        self.0
            .values()
            .map(|f| f.description.as_str())
            .collect::<Vec<_>>()
            .join(" and ")
    }
}

impl FromIterator<Finding> for DetectionResult {
    fn from_iter<I: IntoIterator<Item = Finding>>(iter: I) -> Self {
        let mut result = Self::new();
        for finding in iter {
            result.insert(finding);
        }
        result
    }
}

/// Answer to "is this safe to send?".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Nothing sensitive found.
    Safe,
    /// Sensitive data found.
    Sensitive(DetectionResult),
}

impl Verdict {
    /// Whether the text may be sent as-is.
    #[must_use]
    pub fn is_safe(&self) -> bool {
        matches!(self, Self::Safe)
    }
}

/// Sensitive-data detector.
#[derive(Debug)]
pub struct Detector {
    registry: PatternRegistry,
    sanitizer: Sanitizer,
    cache: ResultCache,
    validations: AtomicU64,
}

impl Detector {
    /// Create a detector from its parts.
    ///
    /// The cache is scoped to the registry and sanitize mode, so results
    /// saved by a differently configured detector are never served.
    #[must_use]
    pub fn new(registry: PatternRegistry, sanitizer: Sanitizer, cache: ResultCache) -> Self {
        let fingerprint = format!("{}sanitize\t{:?}\n", registry.fingerprint(), sanitizer.mode());
        Self {
            cache: cache.scoped(&fingerprint),
            registry,
            sanitizer,
            validations: AtomicU64::new(0),
        }
    }

    /// Build a detector from configuration.
    ///
    /// When `cache.persist` is off the store is ignored and the cache lives
    /// only in memory. Persisted entries are loaded before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if a custom pattern fails to compile.
    pub async fn from_config(config: &Config, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let detection = &config.detection;
        let mut registry = PatternRegistry::with_phone_rule(detection.phone);
        for id in &detection.disabled_patterns {
            if !registry.disable(id) {
                debug!(pattern = %id, "Disabled pattern was not registered");
            }
        }
        for custom in &detection.custom_patterns {
            registry.add_custom(custom)?;
        }

        let cache = if config.cache.persist {
            ResultCache::persistent(store, config.cache.capacity, &config.cache.storage_key)
        } else {
            ResultCache::in_memory(config.cache.capacity)
        };
        cache.load().await;

        Ok(Self::new(
            registry,
            Sanitizer::new(detection.sanitize_mode),
            cache,
        ))
    }

    /// The pattern registry.
    #[must_use]
    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    /// The input sanitizer.
    #[must_use]
    pub fn sanitizer(&self) -> &Sanitizer {
        &self.sanitizer
    }

    /// The result cache.
    #[must_use]
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Number of validator invocations since creation.
    #[must_use]
    pub fn validations_run(&self) -> u64 {
        self.validations.load(Ordering::Relaxed)
    }

    /// Detect sensitive data in `text`.
    ///
    /// Identical sanitized inputs are answered from the cache without
    /// running any validator.
    pub async fn detect(&self, text: &str) -> DetectionResult {
        let sanitized = self.sanitizer.sanitize(text);
        if sanitized.is_empty() {
            return DetectionResult::new();
        }

        if let Some(cached) = self.cache.get(&sanitized).await {
            trace!(categories = cached.len(), "Detection served from cache");
            return cached;
        }

        let result = self.evaluate(&sanitized);
        debug!(
            categories = result.len(),
            matches = result.match_count(),
            "Detection complete"
        );
        self.cache.put(&sanitized, result.clone()).await;
        result
    }

    /// Run every pattern over already-sanitized text, bypassing the cache.
    #[must_use]
    pub fn evaluate(&self, sanitized: &str) -> DetectionResult {
        self.registry
            .iter()
            .map(|pattern| {
                let raw_matches = pattern
                    .candidates(sanitized)
                    .filter(|candidate| {
                        self.validations.fetch_add(1, Ordering::Relaxed);
                        pattern.validate(candidate)
                    })
                    .map(str::to_string)
                    .collect();
                Finding {
                    pattern_id: pattern.id.clone(),
                    raw_matches,
                    description: pattern.description.clone(),
                }
            })
            .collect()
    }

    /// Detect without reading or writing the cache.
    #[must_use]
    pub fn detect_uncached(&self, text: &str) -> DetectionResult {
        let sanitized = self.sanitizer.sanitize(text);
        if sanitized.is_empty() {
            return DetectionResult::new();
        }
        self.evaluate(&sanitized)
    }

    /// Decide whether `text` is safe to send.
    pub async fn check(&self, text: &str) -> Verdict {
        let result = self.detect(text).await;
        if result.is_clean() {
            Verdict::Safe
        } else {
            Verdict::Sensitive(result)
        }
    }

    /// Warning label for a result, e.g. "Email Address and Phone Number".
    #[must_use]
    pub fn describe(&self, result: &DetectionResult) -> String {
        result.describe()
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self::new(
            PatternRegistry::new(),
            Sanitizer::default(),
            ResultCache::in_memory(crate::cache::DEFAULT_CAPACITY),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::patterns::CustomPattern;
    use crate::detection::sanitize::SanitizeMode;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_detects_ssn() {
        let detector = Detector::default();
        let result = detector.detect("My SSN is 123-45-6789").await;

        assert_eq!(result.len(), 1);
        let finding = result.get(&PatternId::Ssn).unwrap();
        assert_eq!(finding.raw_matches, vec!["123-45-6789".to_string()]);
        assert_eq!(finding.description, "Social Security Number");
    }

    #[tokio::test]
    async fn test_email_requires_dotted_domain() {
        let detector = Detector::default();
        assert!(!detector
            .detect("contact me at a@b")
            .await
            .contains(&PatternId::Email));
        assert!(detector
            .detect("contact me at a@b.co")
            .await
            .contains(&PatternId::Email));
    }

    #[tokio::test]
    async fn test_invalid_candidates_are_dropped() {
        let detector = Detector::default();
        let result = detector.detect("order 000-12-3456 shipped").await;
        assert!(result.is_clean());
    }

    #[tokio::test]
    async fn test_credit_card_detection() {
        let detector = Detector::default();
        let result = detector.detect("card: 4532-0151-1283-0366 thanks").await;
        let finding = result.get(&PatternId::CreditCard).unwrap();
        assert_eq!(finding.raw_matches, vec!["4532-0151-1283-0366".to_string()]);

        let result = detector.detect("card: 4532-0151-1283-0367 thanks").await;
        assert!(!result.contains(&PatternId::CreditCard));
    }

    #[tokio::test]
    async fn test_second_call_served_from_cache() {
        let detector = Detector::default();
        let first = detector.detect("reach me at jane@example.com").await;
        let after_first = detector.validations_run();
        assert!(after_first > 0);

        let second = detector.detect("reach me at jane@example.com").await;
        assert_eq!(first, second);
        assert_eq!(detector.validations_run(), after_first);
        assert_eq!(detector.cache().stats().await.hits, 1);
    }

    #[tokio::test]
    async fn test_clean_result_is_cached() {
        let detector = Detector::default();
        assert!(detector.detect("nothing here").await.is_clean());
        assert_eq!(detector.cache().len().await, 1);
        assert!(detector.detect("nothing  here").await.is_clean());
        assert_eq!(detector.cache().stats().await.hits, 1);
    }

    #[tokio::test]
    async fn test_blank_input_skips_cache() {
        let detector = Detector::default();
        assert!(detector.detect("   \n\t").await.is_clean());
        assert!(detector.detect("").await.is_clean());
        assert_eq!(detector.cache().len().await, 0);
        assert_eq!(detector.validations_run(), 0);
    }

    #[tokio::test]
    async fn test_duplicates_preserved_in_order() {
        let detector = Detector::default();
        let result = detector
            .detect("a@b.co, then x@y.org, then a@b.co again")
            .await;
        let finding = result.get(&PatternId::Email).unwrap();
        assert_eq!(finding.raw_matches, vec!["a@b.co", "x@y.org", "a@b.co"]);
    }

    #[tokio::test]
    async fn test_check_verdict() {
        let detector = Detector::default();
        assert!(detector.check("hello world").await.is_safe());
        match detector.check("call 555-123-4567").await {
            Verdict::Sensitive(result) => assert!(result.contains(&PatternId::Phone)),
            Verdict::Safe => panic!("expected sensitive verdict"),
        }
    }

    #[tokio::test]
    async fn test_describe_joins_in_registry_order() {
        let detector = Detector::default();
        let result = detector
            .detect("call 555-123-4567 or mail jane@example.com")
            .await;
        assert_eq!(
            detector.describe(&result),
            "Email Address and Phone Number"
        );
    }

    #[tokio::test]
    async fn test_spacing_mode_does_not_merge_tokens() {
        let spacing = Detector::default();
        assert!(spacing.detect("123(45)6789").await.is_clean());

        let strict = Detector::new(
            PatternRegistry::new(),
            Sanitizer::new(SanitizeMode::Strict),
            ResultCache::in_memory(10),
        );
        assert!(strict.detect("123(45)6789").await.contains(&PatternId::Ssn));
    }

    #[tokio::test]
    async fn test_tags_stripped_before_matching() {
        let detector = Detector::default();
        let result = detector.detect("<p>ssn <b>123-45-6789</b></p>").await;
        assert!(result.contains(&PatternId::Ssn));
    }

    #[tokio::test]
    async fn test_from_config_applies_detection_settings() {
        let mut config = Config::default();
        config.detection.disabled_patterns = vec![PatternId::Phone];
        config.detection.custom_patterns = vec![CustomPattern {
            name: "employee_id".to_string(),
            description: "Employee ID".to_string(),
            pattern: r"\bEMP-\d{6}\b".to_string(),
        }];

        let detector = Detector::from_config(&config, Arc::new(MemoryStore::new()))
            .await
            .unwrap();
        let result = detector.detect("EMP-123456 at 555-123-4567").await;

        assert!(!result.contains(&PatternId::Phone));
        let custom = result
            .get(&PatternId::Custom("employee_id".to_string()))
            .unwrap();
        assert_eq!(custom.raw_matches, vec!["EMP-123456"]);
    }

    #[test]
    fn test_detection_result_serializes_as_object() {
        let result: DetectionResult = [Finding {
            pattern_id: PatternId::Ssn,
            raw_matches: vec!["123-45-6789".to_string()],
            description: "Social Security Number".to_string(),
        }]
        .into_iter()
        .collect();

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["ssn"]["rawMatches"][0], "123-45-6789");
        assert_eq!(json["ssn"]["patternId"], "ssn");

        let back: DetectionResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_empty_findings_not_inserted() {
        let mut result = DetectionResult::new();
        result.insert(Finding {
            pattern_id: PatternId::Email,
            raw_matches: Vec::new(),
            description: "Email Address".to_string(),
        });
        assert!(result.is_clean());
    }
}
