//! Sensitive-data detection.
//!
//! - [`validators`]: structural checks (Luhn, SSN rules, email and phone shape)
//! - [`patterns`]: the ordered pattern registry
//! - [`sanitize`]: input normalization ahead of matching and caching
//! - [`engine`]: the cached [`Detector`]
//! - [`redact`]: replacing validated matches with a token

pub mod engine;
pub mod patterns;
pub mod redact;
pub mod sanitize;
pub mod validators;

pub use engine::{DetectionResult, Detector, Finding, Verdict};
pub use patterns::{CustomPattern, PatternDefinition, PatternId, PatternRegistry};
pub use redact::{Redaction, Redactor, DEFAULT_REDACTION_TOKEN};
pub use sanitize::{SanitizeMode, Sanitizer};
pub use validators::PhoneRule;
