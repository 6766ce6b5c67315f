//! Replacement of validated matches with a redaction token.
//!
//! Matches are found in sanitized text, so a match may not appear verbatim
//! in the live input: tags may have been stripped, punctuation turned into
//! spaces and whitespace collapsed. Each match is located through a pattern
//! that tolerates exactly those differences, which also covers the literal
//! form, so one value written two ways is replaced everywhere.

use regex::Regex;

use super::engine::DetectionResult;
use crate::error::{Error, Result};

/// Default replacement for redacted matches.
pub const DEFAULT_REDACTION_TOKEN: &str = "[REDACTED]";

/// Characters or tags the sanitizer drops between two kept characters.
const DROPPED: &str = r"(?:[^\w\s@.\-]|<[^>]*>)";

/// Outcome of a successful redaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redaction {
    /// The rewritten text.
    pub text: String,

    /// Number of spans replaced.
    pub replaced: usize,
}

/// Replaces matched substrings with a fixed token.
#[derive(Debug, Clone)]
pub struct Redactor {
    token: String,
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(DEFAULT_REDACTION_TOKEN)
    }
}

impl Redactor {
    /// Create a redactor using `token` as the replacement.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// The replacement token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Replace every occurrence of every match in `result` within `text`.
    ///
    /// Longer matches are replaced first so a match nested inside another
    /// never leaves a partial value behind. Text outside the matches is left
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RedactionFailed`] if any match cannot be located in
    /// `text`. Nothing is rewritten in that case.
    pub fn redact(&self, text: &str, result: &DetectionResult) -> Result<Redaction> {
        let mut matches: Vec<&str> = result
            .findings()
            .flat_map(|f| f.raw_matches.iter().map(String::as_str))
            .collect();
        matches.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        matches.dedup();

        let locators = matches
            .iter()
            .map(|raw| {
                let locator = Locator::new(raw)?;
                if locator.is_match(text) {
                    Ok(locator)
                } else {
                    Err(Error::redaction_failed(format!(
                        "a {}-character match is no longer present in the input",
                        raw.chars().count()
                    )))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let mut redacted = text.to_string();
        let mut replaced = 0;
        for locator in &locators {
            let (next, count) = locator.replace_all(&redacted, &self.token);
            redacted = next;
            replaced += count;
        }

        Ok(Redaction {
            text: redacted,
            replaced,
        })
    }
}

struct Locator {
    tolerant: Regex,
}

impl Locator {
    fn new(raw: &str) -> Result<Self> {
        let mut pattern = String::new();
        let mut chars = raw.chars().peekable();
        while let Some(c) = chars.next() {
            if c.is_whitespace() {
                pattern.push_str(&format!(r"(?:\s|{DROPPED})+"));
                continue;
            }
            pattern.push_str(&regex::escape(&c.to_string()));
            if chars.peek().is_some_and(|next| !next.is_whitespace()) {
                pattern.push_str(&format!("{DROPPED}*"));
            }
        }
        let tolerant = Regex::new(&pattern)
            .map_err(|e| Error::redaction_failed(format!("cannot build locator: {e}")))?;
        Ok(Self { tolerant })
    }

    fn is_match(&self, text: &str) -> bool {
        self.tolerant.is_match(text)
    }

    fn replace_all(&self, text: &str, token: &str) -> (String, usize) {
        let count = self.tolerant.find_iter(text).count();
        let replaced = self.tolerant.replace_all(text, regex::NoExpand(token));
        (replaced.into_owned(), count)
    }
}
