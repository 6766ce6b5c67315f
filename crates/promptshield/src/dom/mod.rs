//! DOM adapter.
//!
//! The engine never touches a browser directly. Everything it needs from a
//! page (queries, reading and writing input text, listeners, mutation
//! notifications and overlay prompts) goes through the [`Page`] trait.
//! [`VirtualPage`] is an in-memory implementation used by tests and the CLI.

pub mod binder;
mod event;
pub mod platform;
mod prompt;
pub mod selector;
mod virtual_page;
pub mod waiter;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::Result;

pub use binder::{bind_unmarked, BoundControls, BOUND_MARKER};
pub use event::{DispatchOutcome, DomEvent, EventListener, Mutation};
pub use platform::{Platform, PlatformConfig, TextExtraction};
pub use prompt::{Decision, PromptHandle, PromptId, PromptView};
pub use selector::{ElementTree, SelectorList};
pub use virtual_page::{Activation, ChatElements, ElementSpec, VirtualPage};
pub use waiter::{await_element, WaitOptions};

/// Opaque handle to an element of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(u64);

impl ElementId {
    /// Wrap a raw element number.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw element number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A live document the engine is attached to.
///
/// Element handles become invalid once their element leaves the document;
/// operations on them return [`Error::ElementDetached`](crate::Error::ElementDetached).
#[async_trait]
pub trait Page: Send + Sync {
    /// Hostname of the current location.
    fn hostname(&self) -> String;

    /// First element matching `selector`, in document order.
    ///
    /// # Errors
    ///
    /// Returns an error if the selector is invalid.
    fn query_selector(&self, selector: &str) -> Result<Option<ElementId>>;

    /// Every element matching `selector`, in document order.
    ///
    /// # Errors
    ///
    /// Returns an error if the selector is invalid.
    fn query_selector_all(&self, selector: &str) -> Result<Vec<ElementId>>;

    /// Whether the element is still part of the document.
    fn is_connected(&self, element: ElementId) -> bool;

    /// Form-control value, or `None` if the element is not a form control.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is detached.
    fn value(&self, element: ElementId) -> Result<Option<String>>;

    /// Set a form-control value.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is detached or not a form control.
    fn set_value(&self, element: ElementId, value: &str) -> Result<()>;

    /// Concatenated text of the element and its descendants.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is detached.
    fn text_content(&self, element: ElementId) -> Result<String>;

    /// Replace the element's children with a single run of text.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is detached.
    fn set_text_content(&self, element: ElementId, text: &str) -> Result<()>;

    /// Text of each descendant `<p>` in document order.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is detached.
    fn paragraphs(&self, element: ElementId) -> Result<Vec<String>>;

    /// Replace the element's children with one `<p>` per line.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is detached.
    fn set_paragraphs(&self, element: ElementId, lines: &[String]) -> Result<()>;

    /// Value of an attribute.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is detached.
    fn attribute(&self, element: ElementId, name: &str) -> Result<Option<String>>;

    /// Set an attribute.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is detached.
    fn set_attribute(&self, element: ElementId, name: &str, value: &str) -> Result<()>;

    /// Remove an attribute. Returns `true` if it was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is detached.
    fn remove_attribute(&self, element: ElementId, name: &str) -> Result<bool>;

    /// Register a listener for `event` on `element`.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is detached.
    fn add_event_listener(
        &self,
        element: ElementId,
        event: &str,
        listener: Arc<dyn EventListener>,
    ) -> Result<()>;

    /// Unregister `listener` for `event` on `element`. Listeners are
    /// compared by identity. Returns `true` if one was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is detached.
    fn remove_event_listener(
        &self,
        element: ElementId,
        event: &str,
        listener: &Arc<dyn EventListener>,
    ) -> Result<bool>;

    /// Subscribe to document mutations.
    ///
    /// Dropping the receiver ends the subscription.
    fn observe(&self) -> broadcast::Receiver<Mutation>;

    /// Show an overlay prompt anchored at `anchor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the anchor is detached.
    fn show_prompt(&self, anchor: ElementId, view: PromptView) -> Result<PromptHandle>;

    /// Remove a prompt. Unknown ids are ignored.
    fn remove_prompt(&self, id: PromptId);

    /// Dispatch a synthetic event at `target`, running its listeners.
    ///
    /// Unless a listener prevents the default, the browser's own action for
    /// the event (such as sending a message on `click`) runs afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the target is detached.
    async fn dispatch(&self, target: ElementId, event: &str) -> Result<DispatchOutcome>;
}
