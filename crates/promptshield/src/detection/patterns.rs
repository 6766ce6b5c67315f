//! Detection pattern registry.
//!
//! Every pattern pairs a regex with a structural validator and a
//! human-readable label. The regexes only find candidates; the validators
//! decide which candidates become findings.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::validators::{is_valid_credit_card, is_valid_email, is_valid_ssn, PhoneRule};
use crate::error::{Error, Result};

/// Identifier of a detection pattern.
///
/// The derived ordering is registry order: built-in categories first, then
/// custom patterns by name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum PatternId {
    /// US Social Security Number.
    Ssn,
    /// Payment card number.
    CreditCard,
    /// Email address.
    Email,
    /// Phone number.
    Phone,
    /// A pattern supplied through configuration.
    Custom(String),
}

const CUSTOM_PREFIX: &str = "custom:";

impl PatternId {
    /// The built-in pattern ids in registry order.
    pub const BUILTIN: [PatternId; 4] = [Self::Ssn, Self::CreditCard, Self::Email, Self::Phone];

    /// Whether this id names a built-in pattern.
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ssn => write!(f, "ssn"),
            Self::CreditCard => write!(f, "creditCard"),
            Self::Email => write!(f, "email"),
            Self::Phone => write!(f, "phone"),
            Self::Custom(name) => write!(f, "{CUSTOM_PREFIX}{name}"),
        }
    }
}

impl FromStr for PatternId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ssn" => Ok(Self::Ssn),
            "creditCard" => Ok(Self::CreditCard),
            "email" => Ok(Self::Email),
            "phone" => Ok(Self::Phone),
            other => match other.strip_prefix(CUSTOM_PREFIX) {
                Some(name) if !name.is_empty() => Ok(Self::Custom(name.to_string())),
                _ => Err(Error::UnknownPattern(other.to_string())),
            },
        }
    }
}

impl From<PatternId> for String {
    fn from(id: PatternId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for PatternId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Predicate deciding whether a regex candidate is real.
pub type Validator = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// A compiled detection pattern.
pub struct PatternDefinition {
    /// Identifier of the pattern.
    pub id: PatternId,

    /// Human-readable label shown to the user.
    pub description: String,

    regex: Regex,
    validator: Validator,
}

impl fmt::Debug for PatternDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternDefinition")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("regex", &self.regex.as_str())
            .finish_non_exhaustive()
    }
}

impl PatternDefinition {
    /// Create a new pattern definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the regex does not compile.
    pub fn new(
        id: PatternId,
        description: impl Into<String>,
        pattern: &str,
        validator: Validator,
    ) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|source| Error::InvalidPattern {
            name: id.to_string(),
            source,
        })?;
        Ok(Self {
            id,
            description: description.into(),
            regex,
            validator,
        })
    }

    /// The regex source of this pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// All raw regex matches in `text`, in order of appearance.
    pub fn candidates<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.regex.find_iter(text).map(|m| m.as_str())
    }

    /// Check a candidate against the structural validator.
    ///
    /// A validator that panics is treated as rejecting the candidate.
    #[must_use]
    pub fn validate(&self, candidate: &str) -> bool {
        match catch_unwind(AssertUnwindSafe(|| (self.validator)(candidate))) {
            Ok(valid) => valid,
            Err(_) => {
                warn!(pattern = %self.id, "Validator panicked, treating candidate as invalid");
                false
            }
        }
    }
}

/// A pattern supplied through configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomPattern {
    /// Short name, used as `custom:<name>`.
    pub name: String,

    /// Label shown to the user.
    pub description: String,

    /// Regex source.
    pub pattern: String,
}

/// Ordered collection of detection patterns.
#[derive(Debug)]
pub struct PatternRegistry {
    patterns: Vec<PatternDefinition>,
    phone_rule: Option<PhoneRule>,
}

impl PatternRegistry {
    /// Build the registry with the built-in patterns.
    #[must_use]
    pub fn new() -> Self {
        Self::with_phone_rule(PhoneRule::default())
    }

    /// Build the registry with the built-in patterns and a custom phone rule.
    #[must_use]
    pub fn with_phone_rule(phone_rule: PhoneRule) -> Self {
        Self {
            patterns: builtin_patterns(phone_rule),
            phone_rule: Some(phone_rule),
        }
    }

    /// Build a registry from explicit definitions.
    #[must_use]
    pub fn from_definitions(patterns: Vec<PatternDefinition>) -> Self {
        Self {
            patterns,
            phone_rule: None,
        }
    }

    /// Append a configured pattern. Its matches are accepted as-is.
    ///
    /// # Errors
    ///
    /// Returns an error if the regex does not compile.
    pub fn add_custom(&mut self, custom: &CustomPattern) -> Result<()> {
        let definition = PatternDefinition::new(
            PatternId::Custom(custom.name.clone()),
            custom.description.clone(),
            &custom.pattern,
            Arc::new(|_: &str| true),
        )?;
        self.patterns.push(definition);
        Ok(())
    }

    /// Remove a pattern by id. Returns `true` if it was present.
    pub fn disable(&mut self, id: &PatternId) -> bool {
        let before = self.patterns.len();
        self.patterns.retain(|p| &p.id != id);
        self.patterns.len() != before
    }

    /// Look up a pattern by id.
    #[must_use]
    pub fn get(&self, id: &PatternId) -> Option<&PatternDefinition> {
        self.patterns.iter().find(|p| &p.id == id)
    }

    /// Iterate patterns in registry order.
    pub fn iter(&self) -> impl Iterator<Item = &PatternDefinition> {
        self.patterns.iter()
    }

    /// Number of registered patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the registry has no patterns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Stable description of what this registry detects: every pattern id
    /// and regex source in order, plus the phone rule.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut fingerprint = String::new();
        for pattern in &self.patterns {
            fingerprint.push_str(&format!("{}\t{}\n", pattern.id, pattern.pattern()));
        }
        if let Some(rule) = self.phone_rule {
            fingerprint.push_str(&format!("phone\t{rule:?}\n"));
        }
        fingerprint
    }

    /// Run every regex over `text` without validation.
    ///
    /// Patterns with no match are omitted.
    #[must_use]
    pub fn detect_candidates(&self, text: &str) -> BTreeMap<PatternId, Vec<String>> {
        self.patterns
            .iter()
            .filter_map(|pattern| {
                let matches: Vec<String> =
                    pattern.candidates(text).map(str::to_string).collect();
                (!matches.is_empty()).then(|| (pattern.id.clone(), matches))
            })
            .collect()
    }
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn builtin(id: PatternId, description: &str, pattern: &str, validator: Validator) -> PatternDefinition {
    match PatternDefinition::new(id, description, pattern, validator) {
        Ok(definition) => definition,
        Err(e) => unreachable!("built-in pattern failed to compile: {e}"),
    }
}

/// The built-in SSN, credit card, email and phone patterns.
#[must_use]
pub fn builtin_patterns(phone_rule: PhoneRule) -> Vec<PatternDefinition> {
    vec![
        builtin(
            PatternId::Ssn,
            "Social Security Number",
            r"\b\d{3}[-.]?\d{2}[-.]?\d{4}\b",
            Arc::new(is_valid_ssn),
        ),
        builtin(
            PatternId::CreditCard,
            "Credit Card Number",
            r"\b(?:\d{4}[-. ]?){3}\d{1,7}\b",
            Arc::new(is_valid_credit_card),
        ),
        builtin(
            PatternId::Email,
            "Email Address",
            r"\b[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}\b",
            Arc::new(is_valid_email),
        ),
        builtin(
            PatternId::Phone,
            "Phone Number",
            r"\b\d{3}[-. ]?\d{3}[-. ]?\d{4}\b",
            Arc::new(move |candidate: &str| phone_rule.validate(candidate)),
        ),
    ]
}
