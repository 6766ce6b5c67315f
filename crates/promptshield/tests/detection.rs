//! Integration tests for detection
//!
//! These tests drive the public detection API together with the result
//! cache and its durable stores.

use std::sync::Arc;

use async_trait::async_trait;
use promptshield::detection::{PatternRegistry, Redactor};
use promptshield::{Config, Detector, Error, KeyValueStore, PatternId, SqliteStore};

struct QuotaExceededStore;

#[async_trait]
impl KeyValueStore for QuotaExceededStore {
    async fn get(&self, _key: &str) -> promptshield::Result<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str) -> promptshield::Result<()> {
        Err(Error::storage_unavailable("quota exceeded"))
    }

    async fn remove(&self, _key: &str) -> promptshield::Result<bool> {
        Err(Error::storage_unavailable("quota exceeded"))
    }
}

fn validate(id: &PatternId, candidate: &str) -> bool {
    PatternRegistry::new().get(id).unwrap().validate(candidate)
}

#[test]
fn test_ssn_structural_rules() {
    for invalid in [
        "000000000",
        "000123456",
        "666123456",
        "900123456",
        "999123456",
        "123006789",
        "123450000",
    ] {
        assert!(!validate(&PatternId::Ssn, invalid), "{invalid}");
    }
    assert!(validate(&PatternId::Ssn, "123456789"));
    assert!(validate(&PatternId::Ssn, "123-45-6789"));
}

#[test]
fn test_luhn_checksum() {
    assert!(validate(&PatternId::CreditCard, "4532015112830366"));
    assert!(validate(&PatternId::CreditCard, "4532-0151-1283-0366"));
    assert!(!validate(&PatternId::CreditCard, "4532015112830367"));
    assert!(!validate(&PatternId::CreditCard, "5532015112830366"));
}

#[tokio::test]
async fn test_detects_ssn() {
    let detector = Detector::default();
    let result = detector.detect("My SSN is 123-45-6789").await;

    assert_eq!(result.len(), 1);
    let finding = result.get(&PatternId::Ssn).unwrap();
    assert_eq!(finding.raw_matches, vec!["123-45-6789"]);
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
async fn test_result_json_shape() {
    let detector = Detector::default();
    let result = detector.detect("mail john@example.com").await;
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(
        json,
        serde_json::json!({
            "email": {
                "patternId": "email",
                "rawMatches": ["john@example.com"],
                "description": "Email Address"
            }
        })
    );
}

#[tokio::test]
async fn test_repeat_detection_skips_validators() {
    let detector = Detector::default();
    let first = detector.detect("card 4532 0151 1283 0366").await;
    let validations = detector.validations_run();
    assert!(validations > 0);

    let second = detector.detect("card   4532 0151 1283 0366 ").await;
    assert_eq!(first, second);
    assert_eq!(detector.validations_run(), validations);
}

#[tokio::test]
async fn test_eviction_forces_recomputation() {
    let detector = Detector::default();
    let texts: Vec<String> = (1..=101).map(|i| format!("ssn 123-45-{i:04}")).collect();
    for text in &texts {
        detector.detect(text).await;
    }
    assert_eq!(detector.cache().len().await, 100);

    let before = detector.validations_run();
    detector.detect(&texts[100]).await;
    assert_eq!(detector.validations_run(), before);

    let result = detector.detect(&texts[0]).await;
    assert!(result.contains(&PatternId::Ssn));
    assert_eq!(detector.validations_run(), before + 1);
}

#[tokio::test]
async fn test_persisted_cache_reloads_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let mut config = Config::default();
    config.cache.capacity = 2;

    {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let detector = Detector::from_config(&config, store).await.unwrap();
        detector.detect("first 123-45-6789").await;
        detector.detect("second john@example.com").await;
    }

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let detector = Detector::from_config(&config, store).await.unwrap();
    assert_eq!(detector.cache().len().await, 2);

    let result = detector.detect("first 123-45-6789").await;
    assert!(result.contains(&PatternId::Ssn));
    assert_eq!(detector.validations_run(), 0);

    // A third entry pushes out the oldest reloaded one.
    detector.detect("third call 555-123-4567").await;
    let before = detector.validations_run();
    detector.detect("second john@example.com").await;
    assert_eq!(detector.validations_run(), before);
    detector.detect("first 123-45-6789").await;
    assert!(detector.validations_run() > before);
}

#[tokio::test]
async fn test_persistence_failure_does_not_block_detection() {
    let detector = Detector::from_config(&Config::default(), Arc::new(QuotaExceededStore))
        .await
        .unwrap();

    let result = detector.detect("ssn 123-45-6789").await;
    assert!(result.contains(&PatternId::Ssn));
    assert_eq!(detector.cache().len().await, 1);
    assert_eq!(detector.cache().stats().await.persist_failures, 1);
    assert!(detector.cache().clear().await.is_err());
}

#[tokio::test]
async fn test_redaction_leaves_other_text_untouched() {
    let detector = Detector::default();
    let text = "Reach me at john@example.com, or 555-123-4567 after 5pm.";
    let result = detector.detect(text).await;

    let redaction = Redactor::default().redact(text, &result).unwrap();
    assert_eq!(
        redaction.text,
        "Reach me at [REDACTED], or [REDACTED] after 5pm."
    );
    assert_eq!(redaction.replaced, 2);
}

#[tokio::test]
async fn test_custom_pattern_from_config() {
    let config: Config = serde_json::from_value(serde_json::json!({
        "detection": {
            "disabled_patterns": ["phone"],
            "custom_patterns": [
                {"name": "employee_id", "description": "Employee ID", "pattern": "EMP-\\d{6}"}
            ]
        }
    }))
    .unwrap();
    let detector = Detector::from_config(&config, Arc::new(promptshield::MemoryStore::new()))
        .await
        .unwrap();

    let result = detector.detect("EMP-123456 call 555-123-4567").await;
    assert!(result.contains(&PatternId::Custom("employee_id".to_string())));
    assert!(!result.contains(&PatternId::Phone));
}

#[tokio::test]
async fn test_config_change_invalidates_persisted_results() {
    let store: Arc<dyn KeyValueStore> = Arc::new(promptshield::MemoryStore::new());
    let text = "badge EMP-123456";

    let plain = Detector::from_config(&Config::default(), Arc::clone(&store))
        .await
        .unwrap();
    assert!(plain.detect(text).await.is_clean());

    let config: Config = serde_json::from_value(serde_json::json!({
        "detection": {
            "custom_patterns": [
                {"name": "employee_id", "description": "Employee ID", "pattern": "\\bEMP-\\d{6}\\b"}
            ]
        }
    }))
    .unwrap();
    let extended = Detector::from_config(&config, Arc::clone(&store)).await.unwrap();
    assert_eq!(extended.cache().len().await, 1);

    let result = extended.detect(text).await;
    assert!(result.contains(&PatternId::Custom("employee_id".to_string())));

    // The original configuration still gets its own cached answer.
    let again = Detector::from_config(&Config::default(), store).await.unwrap();
    assert!(again.detect(text).await.is_clean());
    assert_eq!(again.validations_run(), 0);
}
