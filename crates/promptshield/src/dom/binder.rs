//! Idempotent listener binding.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{ElementId, EventListener, Page};
use crate::error::Result;

/// Attribute set on every element that already carries our listener.
pub const BOUND_MARKER: &str = "data-promptshield-bound";

/// Attach `listener` for `event` to every element matching `selector` that
/// is not yet marked, then mark it.
///
/// Returns the newly bound elements. Running it again over the same
/// document binds nothing.
///
/// # Errors
///
/// Returns an error if the selector is invalid.
pub fn bind_unmarked(
    page: &dyn Page,
    selector: &str,
    event: &str,
    listener: &Arc<dyn EventListener>,
) -> Result<Vec<ElementId>> {
    let mut bound = Vec::new();
    for element in page.query_selector_all(selector)? {
        match page.attribute(element, BOUND_MARKER) {
            Ok(Some(_)) => continue,
            Ok(None) => {}
            Err(e) if e.is_detached() => continue,
            Err(e) => return Err(e),
        }
        if let Err(e) = page
            .add_event_listener(element, event, Arc::clone(listener))
            .and_then(|()| page.set_attribute(element, BOUND_MARKER, "true"))
        {
            warn!(%element, event, error = %e, "Failed to bind listener");
            continue;
        }
        bound.push(element);
    }
    if !bound.is_empty() {
        debug!(count = bound.len(), event, "Bound listeners");
    }
    Ok(bound)
}

/// Controls one owner has bound with [`bind_unmarked`].
///
/// Dropping it unbinds them: listeners and markers are removed from every
/// element still in the document, so a later owner binds them afresh.
pub struct BoundControls {
    page: Arc<dyn Page>,
    selector: String,
    event: String,
    listener: Arc<dyn EventListener>,
    elements: Vec<ElementId>,
}

impl fmt::Debug for BoundControls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundControls")
            .field("selector", &self.selector)
            .field("event", &self.event)
            .field("elements", &self.elements)
            .finish_non_exhaustive()
    }
}

impl BoundControls {
    /// Nothing bound yet.
    #[must_use]
    pub fn new(
        page: Arc<dyn Page>,
        selector: impl Into<String>,
        event: impl Into<String>,
        listener: Arc<dyn EventListener>,
    ) -> Self {
        Self {
            page,
            selector: selector.into(),
            event: event.into(),
            listener,
            elements: Vec::new(),
        }
    }

    /// Bind every unmarked control currently matching the selector.
    /// Returns how many were newly bound.
    ///
    /// # Errors
    ///
    /// Returns an error if the selector is invalid.
    pub fn bind(&mut self) -> Result<usize> {
        let bound = bind_unmarked(self.page.as_ref(), &self.selector, &self.event, &self.listener)?;
        self.elements.retain(|&element| self.page.is_connected(element));
        self.elements.extend_from_slice(&bound);
        Ok(bound.len())
    }

    /// Controls bound and still in the document.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements
            .iter()
            .filter(|&&element| self.page.is_connected(element))
            .count()
    }

    /// Whether no bound control is left in the document.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove our listener and marker from every bound control.
    pub fn release(&mut self) {
        let mut released = 0;
        for element in self.elements.drain(..) {
            let outcome = self
                .page
                .remove_event_listener(element, &self.event, &self.listener)
                .and_then(|_| self.page.remove_attribute(element, BOUND_MARKER));
            match outcome {
                Ok(_) => released += 1,
                Err(e) if e.is_detached() => {}
                Err(e) => warn!(%element, error = %e, "Failed to unbind listener"),
            }
        }
        if released > 0 {
            debug!(count = released, event = %self.event, "Released listeners");
        }
    }
}

impl Drop for BoundControls {
    fn drop(&mut self) {
        self.release();
    }
}
