//! Input normalization ahead of detection and caching.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// How characters outside the safe set (`\w`, whitespace, `@`, `.`, `-`)
/// are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizeMode {
    /// Replace each one with a space, so removing punctuation never joins
    /// two separate tokens into a new match.
    #[default]
    Spacing,
    /// Delete them outright.
    Strict,
}

fn tag_regex() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"<[^>]*>").unwrap_or_else(|e| unreachable!("{e}")))
}

fn unsafe_char_regex() -> &'static Regex {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    UNSAFE.get_or_init(|| Regex::new(r"[^\w\s@.\-]").unwrap_or_else(|e| unreachable!("{e}")))
}

/// Strips tags and unsafe characters from input text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sanitizer {
    mode: SanitizeMode,
}

impl Sanitizer {
    /// Create a sanitizer with the given mode.
    #[must_use]
    pub const fn new(mode: SanitizeMode) -> Self {
        Self { mode }
    }

    /// The configured mode.
    #[must_use]
    pub const fn mode(&self) -> SanitizeMode {
        self.mode
    }

    /// Strip HTML-like tags, handle unsafe characters, collapse whitespace
    /// and trim.
    #[must_use]
    pub fn sanitize(&self, text: &str) -> String {
        let without_tags = tag_regex().replace_all(text, "");
        let replacement = match self.mode {
            SanitizeMode::Spacing => " ",
            SanitizeMode::Strict => "",
        };
        let safe = unsafe_char_regex().replace_all(&without_tags, replacement);
        safe.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_tags_and_collapses_whitespace() {
        let sanitizer = Sanitizer::default();
        assert_eq!(
            sanitizer.sanitize("  <p>My SSN</p>\n\n is   <b>123-45-6789</b> "),
            "My SSN is 123-45-6789"
        );
    }

    #[test]
    fn test_keeps_safe_characters() {
        let sanitizer = Sanitizer::default();
        assert_eq!(sanitizer.sanitize("a_b@c.d-e"), "a_b@c.d-e");
    }

    #[test]
    fn test_spacing_mode_does_not_join_tokens() {
        let sanitizer = Sanitizer::new(SanitizeMode::Spacing);
        assert_eq!(sanitizer.sanitize("123(45)6789"), "123 45 6789");
    }

    #[test]
    fn test_strict_mode_deletes_unsafe_characters() {
        let sanitizer = Sanitizer::new(SanitizeMode::Strict);
        assert_eq!(sanitizer.sanitize("123(45)6789"), "123456789");
        assert_eq!(sanitizer.sanitize("hello, world!"), "hello world");
    }

    #[test]
    fn test_empty_and_whitespace() {
        let sanitizer = Sanitizer::default();
        assert_eq!(sanitizer.sanitize(""), "");
        assert_eq!(sanitizer.sanitize(" \t\n "), "");
    }

    #[test]
    fn test_mode_default_is_spacing() {
        assert_eq!(SanitizeMode::default(), SanitizeMode::Spacing);
        assert_eq!(Sanitizer::default().mode(), SanitizeMode::Spacing);
    }
}
