//! Debounced live checking of the message input.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::MIN_DEBOUNCE_MS;
use crate::detection::{DetectionResult, Detector};
use crate::dom::{DomEvent, ElementId, EventListener, Page, TextExtraction};

/// Attribute holding the comma-separated pattern ids found in the input.
/// Empty when the input is clean.
pub const FLAGGED_ATTRIBUTE: &str = "data-promptshield-flagged";

/// Runs detection once typing pauses.
///
/// Every `input` event restarts the quiet period; when it elapses the
/// current text is checked, the input is flagged and the result published.
/// The background task stops when the checker is dropped.
#[derive(Debug)]
pub struct LiveChecker {
    trigger: mpsc::UnboundedSender<()>,
    publisher: Arc<watch::Sender<DetectionResult>>,
    checks: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

struct InputListener {
    trigger: mpsc::UnboundedSender<()>,
}

#[async_trait]
impl EventListener for InputListener {
    async fn handle_event(&self, _event: &DomEvent) {
        // The checker is gone once the receiver closes.
        let _ = self.trigger.send(());
    }
}

impl LiveChecker {
    /// Start checking `input`. Quiet periods shorter than the minimum are
    /// raised to it.
    #[must_use]
    pub fn spawn(
        page: Arc<dyn Page>,
        detector: Arc<Detector>,
        extraction: TextExtraction,
        input: ElementId,
        quiet: Duration,
        publisher: Arc<watch::Sender<DetectionResult>>,
    ) -> Self {
        let quiet = quiet.max(Duration::from_millis(MIN_DEBOUNCE_MS));
        let (trigger, triggers) = mpsc::unbounded_channel();
        let checks = Arc::new(AtomicU64::new(0));
        let task = tokio::spawn(run(
            Target {
                page,
                detector,
                extraction,
                input,
            },
            quiet,
            triggers,
            Arc::clone(&publisher),
            Arc::clone(&checks),
        ));
        debug!(%input, quiet_ms = quiet.as_millis(), "Live checking started");
        Self {
            trigger,
            publisher,
            checks,
            task,
        }
    }

    /// Listener to register for `input` events on the input element.
    #[must_use]
    pub fn listener(&self) -> Arc<dyn EventListener> {
        Arc::new(InputListener {
            trigger: self.trigger.clone(),
        })
    }

    /// Restart the quiet period as if the user typed.
    pub fn notify(&self) {
        let _ = self.trigger.send(());
    }

    /// Receive every published result.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DetectionResult> {
        self.publisher.subscribe()
    }

    /// Number of checks run so far.
    #[must_use]
    pub fn checks_run(&self) -> u64 {
        self.checks.load(Ordering::Relaxed)
    }
}

impl Drop for LiveChecker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Target {
    page: Arc<dyn Page>,
    detector: Arc<Detector>,
    extraction: TextExtraction,
    input: ElementId,
}

async fn run(
    target: Target,
    quiet: Duration,
    mut triggers: mpsc::UnboundedReceiver<()>,
    publisher: Arc<watch::Sender<DetectionResult>>,
    checks: Arc<AtomicU64>,
) {
    while triggers.recv().await.is_some() {
        loop {
            tokio::select! {
                more = triggers.recv() => {
                    if more.is_none() {
                        return;
                    }
                }
                () = tokio::time::sleep(quiet) => break,
            }
        }

        let Target {
            page,
            detector,
            extraction,
            input,
        } = &target;
        let text = match extraction.extract(page.as_ref(), *input) {
            Ok(text) => text,
            Err(e) if e.is_detached() => {
                debug!(%input, "Input detached, live checking stopped");
                return;
            }
            Err(e) => {
                warn!(%input, error = %e, "Failed to read input");
                continue;
            }
        };

        let result = detector.detect(&text).await;
        checks.fetch_add(1, Ordering::Relaxed);
        let flagged = result
            .pattern_ids()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        if let Err(e) = page.set_attribute(*input, FLAGGED_ATTRIBUTE, &flagged) {
            warn!(%input, error = %e, "Failed to flag input");
        }
        trace!(%input, categories = result.len(), "Live check complete");
        publisher.send_replace(result);
    }
}
