//! Supported chat platforms.
//!
//! Each platform carries its hostnames, selectors and text-extraction
//! strategy as static data.

use std::fmt;

use serde::Serialize;

use super::{ElementId, Page};
use crate::error::Result;

/// How the message text is read from (and written back to) the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextExtraction {
    /// A form control's value, falling back to its text content.
    FormValue,
    /// A rich-text editor: child `<p>` texts joined with newlines, falling
    /// back to the text content when there are no paragraphs.
    Paragraphs,
}

impl TextExtraction {
    /// Read the current message text.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is detached.
    pub fn extract(self, page: &dyn Page, input: ElementId) -> Result<String> {
        match self {
            Self::FormValue => match page.value(input)? {
                Some(value) if !value.is_empty() => Ok(value),
                _ => page.text_content(input),
            },
            Self::Paragraphs => {
                let paragraphs = page.paragraphs(input)?;
                if paragraphs.is_empty() {
                    page.text_content(input)
                } else {
                    Ok(paragraphs.join("\n"))
                }
            }
        }
    }

    /// Replace the message text.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is detached or rejects the write.
    pub fn write(self, page: &dyn Page, input: ElementId, text: &str) -> Result<()> {
        match self {
            Self::FormValue => {
                if page.value(input)?.is_some() {
                    page.set_value(input, text)
                } else {
                    page.set_text_content(input, text)
                }
            }
            Self::Paragraphs => {
                let lines: Vec<String> = text.split('\n').map(str::to_string).collect();
                page.set_paragraphs(input, &lines)
            }
        }
    }
}

/// Static description of a platform's chat UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlatformConfig {
    /// Display name.
    pub name: &'static str,
    /// Hostnames served by the platform. Subdomains match too.
    pub hostnames: &'static [&'static str],
    /// Selector list for the message input.
    pub input_selector: &'static str,
    /// Selector list for the send control.
    pub submit_selector: &'static str,
    /// Event that sends the message.
    pub submit_event: &'static str,
    /// How to read the message text.
    pub text_extraction: TextExtraction,
}

const CHATGPT: PlatformConfig = PlatformConfig {
    name: "ChatGPT",
    hostnames: &["chatgpt.com", "chat.openai.com"],
    input_selector: "#prompt-textarea",
    submit_selector: r#"button[data-testid="send-button"]"#,
    submit_event: "click",
    text_extraction: TextExtraction::FormValue,
};

const CLAUDE: PlatformConfig = PlatformConfig {
    name: "Claude",
    hostnames: &["claude.ai"],
    input_selector: concat!(
        r#".ProseMirror[contenteditable="true"],"#,
        r#"[role="textbox"],"#,
        r#"div[contenteditable="true"],"#,
        r#".editor-wrapper [contenteditable="true"]"#,
    ),
    submit_selector: concat!(
        r#"button[type="submit"],"#,
        "button:has(svg),",
        "button.absolute,",
        r#"button[aria-label*="send" i],"#,
        r#"button[aria-label*="submit" i]"#,
    ),
    submit_event: "click",
    text_extraction: TextExtraction::Paragraphs,
};

const GEMINI: PlatformConfig = PlatformConfig {
    name: "Gemini",
    hostnames: &["gemini.google.com"],
    input_selector: r#"textarea[aria-label="Input box"]"#,
    submit_selector: r#"button[aria-label="Send message"]"#,
    submit_event: "click",
    text_extraction: TextExtraction::FormValue,
};

/// A supported chat platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Platform {
    /// chatgpt.com and chat.openai.com.
    ChatGpt,
    /// claude.ai.
    Claude,
    /// gemini.google.com.
    Gemini,
}

impl Platform {
    /// Every supported platform.
    pub const ALL: [Platform; 3] = [Self::ChatGpt, Self::Claude, Self::Gemini];

    /// Static configuration of the platform.
    #[must_use]
    pub const fn config(self) -> &'static PlatformConfig {
        match self {
            Self::ChatGpt => &CHATGPT,
            Self::Claude => &CLAUDE,
            Self::Gemini => &GEMINI,
        }
    }

    /// Find the platform serving `hostname`.
    ///
    /// Matches the exact host or any of its subdomains, ignoring case and a
    /// trailing dot.
    #[must_use]
    pub fn from_hostname(hostname: &str) -> Option<Self> {
        let host = hostname.trim_end_matches('.').to_ascii_lowercase();
        Self::ALL.into_iter().find(|platform| {
            platform.config().hostnames.iter().any(|domain| {
                host == *domain
                    || host
                        .strip_suffix(domain)
                        .is_some_and(|prefix| prefix.ends_with('.'))
            })
        })
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config().name)
    }
}
