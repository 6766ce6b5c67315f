use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::ElementId;

/// An event being dispatched.
#[derive(Debug)]
pub struct DomEvent {
    name: String,
    target: ElementId,
    default_prevented: AtomicBool,
    propagation_stopped: AtomicBool,
}

impl DomEvent {
    /// Create an event of type `name` aimed at `target`.
    #[must_use]
    pub fn new(name: impl Into<String>, target: ElementId) -> Self {
        Self {
            name: name.into(),
            target,
            default_prevented: AtomicBool::new(false),
            propagation_stopped: AtomicBool::new(false),
        }
    }

    /// Event type, e.g. `click`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element the event was dispatched at.
    #[must_use]
    pub fn target(&self) -> ElementId {
        self.target
    }

    /// Suppress the browser's default action.
    pub fn prevent_default(&self) {
        self.default_prevented.store(true, Ordering::SeqCst);
    }

    /// Keep the event from reaching ancestor elements.
    pub fn stop_propagation(&self) {
        self.propagation_stopped.store(true, Ordering::SeqCst);
    }

    /// Whether [`prevent_default`](Self::prevent_default) was called.
    #[must_use]
    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented.load(Ordering::SeqCst)
    }

    /// Whether [`stop_propagation`](Self::stop_propagation) was called.
    #[must_use]
    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped.load(Ordering::SeqCst)
    }
}

/// Callback for page events.
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Handle one event. Errors must be logged, not propagated.
    async fn handle_event(&self, event: &DomEvent);
}

/// Result of [`Page::dispatch`](super::Page::dispatch).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// A listener prevented the default action.
    pub default_prevented: bool,
    /// Number of listeners that ran.
    pub listeners_run: usize,
}

/// A change to the observed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Elements were added or removed.
    ChildList {
        /// Roots of the inserted subtrees.
        added: Vec<ElementId>,
        /// Roots of the removed subtrees.
        removed: Vec<ElementId>,
    },
    /// An attribute changed.
    Attributes {
        /// Element whose attribute changed.
        target: ElementId,
        /// Attribute name.
        name: String,
    },
    /// Text inside an element changed.
    CharacterData {
        /// Element whose text changed.
        target: ElementId,
    },
    /// The page moved to a new location.
    Navigated {
        /// Hostname of the new location.
        hostname: String,
    },
}
