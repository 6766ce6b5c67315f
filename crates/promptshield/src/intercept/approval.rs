//! One-shot approvals for messages the user chose to send anyway.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::cache::content_key;
use crate::clock::Clock;

/// Approvals keyed by the content hash of the exact message text.
///
/// An approval is consumed by the first submit of the same text inside its
/// lifetime. It never matches a second time.
pub struct ApprovalLedger {
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    granted: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl std::fmt::Debug for ApprovalLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalLedger")
            .field("ttl", &self.ttl)
            .field("granted", &self.len())
            .finish_non_exhaustive()
    }
}

impl ApprovalLedger {
    /// Create an empty ledger whose approvals live for `ttl`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            clock,
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            granted: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.granted.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Approve `text` for one submit.
    pub fn grant(&self, text: &str) {
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.entries().insert(content_key(text), expires_at);
        trace!(%expires_at, "Approval granted");
    }

    /// Use up the approval for `text`. Returns `false` if there is none or
    /// it expired.
    pub fn consume(&self, text: &str) -> bool {
        let now = self.clock.now();
        let mut entries = self.entries();
        entries.retain(|_, expires_at| *expires_at > now);
        entries.remove(&content_key(text)).is_some()
    }

    /// Number of outstanding approvals, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Whether no approval is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
