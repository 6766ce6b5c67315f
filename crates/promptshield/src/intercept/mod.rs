//! Submit interception.
//!
//! The [`InterceptionController`] sits on the platform's send control. A
//! submit whose text contains validated sensitive data is blocked and the
//! user is asked to keep or remove the data. "Keep" replays the original
//! submit exactly once; "Remove" redacts the live input and leaves the
//! message unsent.

mod approval;
mod debounce;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::detection::{DetectionResult, Detector, Redactor};
use crate::dom::{
    Decision, DomEvent, ElementId, EventListener, Mutation, Page, Platform, PromptHandle,
    PromptView,
};
use crate::error::Result;

pub use approval::ApprovalLedger;
pub use debounce::{LiveChecker, FLAGGED_ATTRIBUTE};

const OUTCOME_CAPACITY: usize = 64;

/// How one submit attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Nothing to intercept; the native submit went ahead.
    Passed,
    /// The user kept the data and the submit was replayed once.
    Approved,
    /// The matches were replaced in the input; nothing was sent.
    Redacted,
    /// The submit stays blocked.
    Cancelled,
    /// Redaction could not be applied; the text is unchanged and the submit
    /// stays blocked.
    RedactionFailed,
}

impl fmt::Display for SubmitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Approved => write!(f, "approved"),
            Self::Redacted => write!(f, "redacted"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::RedactionFailed => write!(f, "redaction failed"),
        }
    }
}

/// Blocks sensitive submits until the user decides.
pub struct InterceptionController {
    page: Arc<dyn Page>,
    detector: Arc<Detector>,
    platform: Platform,
    redactor: Redactor,
    approvals: ApprovalLedger,
    pending: AtomicBool,
    outcomes: broadcast::Sender<SubmitOutcome>,
}

impl fmt::Debug for InterceptionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptionController")
            .field("platform", &self.platform)
            .field("redactor", &self.redactor)
            .field("approvals", &self.approvals)
            .field("pending", &self.is_pending())
            .finish_non_exhaustive()
    }
}

/// Clears the pending flag when the decision is over, however it ends.
struct PendingGuard<'a>(&'a AtomicBool);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl InterceptionController {
    /// Create a controller for `platform` on `page`.
    #[must_use]
    pub fn new(
        page: Arc<dyn Page>,
        detector: Arc<Detector>,
        platform: Platform,
        redactor: Redactor,
        approvals: ApprovalLedger,
    ) -> Self {
        let (outcomes, _) = broadcast::channel(OUTCOME_CAPACITY);
        Self {
            page,
            detector,
            platform,
            redactor,
            approvals,
            pending: AtomicBool::new(false),
            outcomes,
        }
    }

    /// Create a controller using the configured redaction token and
    /// approval lifetime.
    #[must_use]
    pub fn from_config(
        page: Arc<dyn Page>,
        detector: Arc<Detector>,
        platform: Platform,
        config: &Config,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(
            page,
            detector,
            platform,
            Redactor::new(config.intercept.redaction_token.clone()),
            ApprovalLedger::new(clock, config.approval_ttl()),
        )
    }

    /// The platform this controller intercepts.
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Whether a prompt is waiting for the user.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Outstanding "Keep" approvals.
    #[must_use]
    pub fn approvals(&self) -> &ApprovalLedger {
        &self.approvals
    }

    /// Receive the outcome of every submit attempt.
    #[must_use]
    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<SubmitOutcome> {
        self.outcomes.subscribe()
    }

    /// Listener to register on submit controls. It holds the controller
    /// weakly, so binding it never keeps the controller alive.
    #[must_use]
    pub fn listener(self: &Arc<Self>) -> Arc<dyn EventListener> {
        Arc::new(SubmitListener {
            controller: Arc::downgrade(self),
        })
    }

    /// Handle one submit event, returning once the attempt is resolved.
    pub async fn handle_submit(&self, event: &DomEvent) -> SubmitOutcome {
        let outcome = self.intercept(event).await;
        match outcome {
            SubmitOutcome::Passed => debug!(platform = %self.platform, "Submit passed"),
            SubmitOutcome::RedactionFailed => {
                warn!(platform = %self.platform, "Submit blocked, redaction failed");
            }
            _ => info!(platform = %self.platform, %outcome, "Submit intercepted"),
        }
        let _ = self.outcomes.send(outcome);
        outcome
    }

    async fn intercept(&self, event: &DomEvent) -> SubmitOutcome {
        if self.is_pending() {
            event.prevent_default();
            event.stop_propagation();
            debug!("Submit blocked while a prompt is pending");
            return SubmitOutcome::Cancelled;
        }

        let Some((input, text)) = self.read_input() else {
            return SubmitOutcome::Passed;
        };
        if text.trim().is_empty() {
            return SubmitOutcome::Passed;
        }
        if self.approvals.consume(&text) {
            debug!("Approved submit released");
            return SubmitOutcome::Passed;
        }

        let result = self.detector.detect(&text).await;
        if result.is_clean() {
            return SubmitOutcome::Passed;
        }

        event.prevent_default();
        event.stop_propagation();
        if self
            .pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return SubmitOutcome::Cancelled;
        }
        let pending = PendingGuard(&self.pending);

        let categories: Vec<String> = result.pattern_ids().map(ToString::to_string).collect();
        debug!(?categories, "Sensitive data in submit, asking user");

        match self.await_decision(input, &result).await {
            Decision::Proceed => {
                drop(pending);
                self.approvals.grant(&text);
                match self.page.dispatch(event.target(), event.name()).await {
                    Ok(_) => SubmitOutcome::Approved,
                    Err(e) => {
                        warn!(element = %event.target(), error = %e, "Failed to replay submit");
                        SubmitOutcome::Cancelled
                    }
                }
            }
            Decision::Redact => match self.apply_redaction(input, &result).await {
                Ok(replaced) => {
                    debug!(replaced, "Input redacted");
                    SubmitOutcome::Redacted
                }
                Err(e) => {
                    warn!(%input, error = %e, "Redaction abandoned");
                    SubmitOutcome::RedactionFailed
                }
            },
            Decision::Dismissed => SubmitOutcome::Cancelled,
        }
    }

    fn read_input(&self) -> Option<(ElementId, String)> {
        let config = self.platform.config();
        let input = match self.page.query_selector(config.input_selector) {
            Ok(Some(input)) => input,
            Ok(None) => {
                debug!(platform = %self.platform, "No input element, submit not checked");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Input lookup failed");
                return None;
            }
        };
        match config.text_extraction.extract(self.page.as_ref(), input) {
            Ok(text) => Some((input, text)),
            Err(e) => {
                warn!(%input, error = %e, "Failed to read input");
                None
            }
        }
    }

    /// Show the prompt and wait for an answer. Navigation or removal of the
    /// input counts as a dismissal.
    async fn await_decision(&self, input: ElementId, result: &DetectionResult) -> Decision {
        let mut mutations = self.page.observe();
        let PromptHandle { id, mut decision } =
            match self.page.show_prompt(input, PromptView::for_result(result)) {
                Ok(handle) => handle,
                Err(e) => {
                    warn!(%input, error = %e, "Failed to show prompt");
                    return Decision::Dismissed;
                }
            };

        let answer = loop {
            tokio::select! {
                answer = &mut decision => break answer.unwrap_or(Decision::Dismissed),
                mutation = mutations.recv() => match mutation {
                    Ok(Mutation::Navigated { hostname }) => {
                        debug!(%id, %hostname, "Navigation cancelled prompt");
                        break Decision::Dismissed;
                    }
                    Ok(Mutation::ChildList { .. }) | Err(RecvError::Lagged(_)) => {
                        if !self.page.is_connected(input) {
                            debug!(%id, %input, "Input removed, prompt cancelled");
                            break Decision::Dismissed;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Closed) => {
                        break (&mut decision).await.unwrap_or(Decision::Dismissed);
                    }
                },
            }
        };
        drop(mutations);
        self.page.remove_prompt(id);
        answer
    }

    async fn apply_redaction(&self, input: ElementId, result: &DetectionResult) -> Result<usize> {
        let extraction = self.platform.config().text_extraction;
        let live = extraction.extract(self.page.as_ref(), input)?;
        let redaction = self.redactor.redact(&live, result)?;
        extraction.write(self.page.as_ref(), input, &redaction.text)?;
        self.page.dispatch(input, "input").await?;
        Ok(redaction.replaced)
    }
}

struct SubmitListener {
    controller: Weak<InterceptionController>,
}

#[async_trait]
impl EventListener for SubmitListener {
    async fn handle_event(&self, event: &DomEvent) {
        if let Some(controller) = self.controller.upgrade() {
            controller.handle_submit(event).await;
        }
    }
}
