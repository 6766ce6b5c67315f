use std::fmt;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::detection::DetectionResult;

/// Identifier of a displayed prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PromptId(u64);

impl PromptId {
    /// Wrap a raw prompt number.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "prompt-{}", self.0)
    }
}

/// The user's answer to a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// "Keep": send the message unchanged.
    Proceed,
    /// "Remove": redact the matches and hold the message.
    Redact,
    /// Closed without choosing.
    Dismissed,
}

/// Contents of the sensitive-data prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptView {
    /// Heading.
    pub title: String,
    /// Sentence naming the categories found.
    pub message: String,
    /// Category descriptions in registry order.
    pub categories: Vec<String>,
    /// Label of the proceed action.
    pub keep_label: String,
    /// Label of the redact action.
    pub remove_label: String,
}

impl PromptView {
    /// Build the prompt for a detection result.
    #[must_use]
    pub fn for_result(result: &DetectionResult) -> Self {
        Self {
            title: "Sensitive Information Detected".to_string(),
            message: format!("{} found in your message", result.describe()),
            categories: result.findings().map(|f| f.description.clone()).collect(),
            keep_label: "Keep".to_string(),
            remove_label: "Remove".to_string(),
        }
    }
}

/// A displayed prompt and the channel its decision arrives on.
///
/// If the prompt is removed before the user answers, `decision` resolves
/// with an error, which callers treat as [`Decision::Dismissed`].
#[derive(Debug)]
pub struct PromptHandle {
    /// Prompt identifier, for [`Page::remove_prompt`](super::Page::remove_prompt).
    pub id: PromptId,
    /// Resolves with the user's answer.
    pub decision: oneshot::Receiver<Decision>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{Finding, PatternId};

    #[test]
    fn test_prompt_view_for_result() {
        let result: DetectionResult = [
            Finding {
                pattern_id: PatternId::Phone,
                raw_matches: vec!["555-123-4567".to_string()],
                description: "Phone Number".to_string(),
            },
            Finding {
                pattern_id: PatternId::Ssn,
                raw_matches: vec!["123-45-6789".to_string()],
                description: "Social Security Number".to_string(),
            },
        ]
        .into_iter()
        .collect();

        let view = PromptView::for_result(&result);
        assert_eq!(
            view.message,
            "Social Security Number and Phone Number found in your message"
        );
        assert_eq!(view.categories, vec!["Social Security Number", "Phone Number"]);
        assert_eq!(view.keep_label, "Keep");
        assert_eq!(view.remove_label, "Remove");
        // Matched values never appear in the prompt.
        assert!(!format!("{view:?}").contains("123-45-6789"));
    }

    #[test]
    fn test_prompt_id_display() {
        assert_eq!(PromptId::new(2).to_string(), "prompt-2");
    }
}
