//! Page lifecycle: find the chat input, bind to it and keep the bindings
//! current while the page re-renders.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::detection::{DetectionResult, Detector};
use crate::dom::{
    await_element, BoundControls, ElementId, Mutation, Page, Platform, WaitOptions,
};
use crate::intercept::{InterceptionController, LiveChecker};

/// Snapshot of a guard's attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardStatus {
    /// Platform the page belongs to.
    pub platform: Platform,
    /// The input currently watched.
    pub input: Option<ElementId>,
    /// Whether listeners are live on the input.
    pub attached: bool,
    /// Submit controls bound since the last attach.
    pub bound_controls: usize,
    /// How many times the guard attached to an input.
    pub attach_count: u32,
}

/// Entry point for protecting a page.
#[derive(Debug, Clone, Copy)]
pub struct ContentGuard;

impl ContentGuard {
    /// Start protecting `page`.
    ///
    /// Returns `None` when the page's host is not a supported platform.
    /// Otherwise a background task waits for the input element, binds the
    /// live checker and submit controls, and rebinds after every burst of
    /// document mutations. Must be called inside a tokio runtime.
    ///
    /// The guard stops when the page navigates to a host of another
    /// platform, or to an unsupported one, and releases its controls.
    /// Attach a new guard to protect the new platform.
    #[must_use]
    pub fn attach(
        page: Arc<dyn Page>,
        detector: Arc<Detector>,
        config: &Config,
        clock: Arc<dyn Clock>,
    ) -> Option<GuardHandle> {
        let hostname = page.hostname();
        let Some(platform) = Platform::from_hostname(&hostname) else {
            info!(%hostname, "Unsupported site, guard inactive");
            return None;
        };

        let controller = Arc::new(InterceptionController::from_config(
            Arc::clone(&page),
            Arc::clone(&detector),
            platform,
            config,
            clock,
        ));
        let (status, status_rx) = watch::channel(GuardStatus {
            platform,
            input: None,
            attached: false,
            bound_controls: 0,
            attach_count: 0,
        });
        let (results, _) = watch::channel(DetectionResult::new());
        let results = Arc::new(results);

        let session = Session {
            page,
            detector,
            platform,
            controller: Arc::clone(&controller),
            results: Arc::clone(&results),
            wait: config.wait_options(),
            debounce: config.debounce(),
            status,
        };
        info!(%platform, "Guard starting");
        Some(GuardHandle {
            task: tokio::spawn(session.run()),
            status: status_rx,
            controller,
            results,
        })
    }
}

/// Handle to a running guard. Dropping it stops the guard.
#[derive(Debug)]
pub struct GuardHandle {
    task: JoinHandle<()>,
    status: watch::Receiver<GuardStatus>,
    controller: Arc<InterceptionController>,
    results: Arc<watch::Sender<DetectionResult>>,
}

impl GuardHandle {
    /// Stop all background work and drop every observer.
    pub fn shutdown(self) {
        info!(platform = %self.controller.platform(), "Guard shutting down");
    }

    /// Current attachment status.
    #[must_use]
    pub fn status(&self) -> GuardStatus {
        self.status.borrow().clone()
    }

    /// Receive status changes.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<GuardStatus> {
        self.status.clone()
    }

    /// Wait until the guard is attached to an input. Returns `None` if the
    /// guard stopped first.
    pub async fn attached(&self) -> Option<GuardStatus> {
        let mut status = self.status.clone();
        let current = status.wait_for(|s| s.attached).await.ok()?;
        Some(current.clone())
    }

    /// The submit interception controller.
    #[must_use]
    pub fn controller(&self) -> &Arc<InterceptionController> {
        &self.controller
    }

    /// Receive every live-check result.
    #[must_use]
    pub fn subscribe_results(&self) -> watch::Receiver<DetectionResult> {
        self.results.subscribe()
    }
}

impl Drop for GuardHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Session {
    page: Arc<dyn Page>,
    detector: Arc<Detector>,
    platform: Platform,
    controller: Arc<InterceptionController>,
    results: Arc<watch::Sender<DetectionResult>>,
    wait: WaitOptions,
    debounce: Duration,
    status: watch::Sender<GuardStatus>,
}

/// What a burst of mutations means for the guard.
enum Burst {
    Changed,
    LeftPlatform(String),
    Closed,
}

impl Session {
    async fn run(self) {
        let config = self.platform.config();
        let mut controls = BoundControls::new(
            Arc::clone(&self.page),
            config.submit_selector,
            config.submit_event,
            self.controller.listener(),
        );
        loop {
            let hostname = self.page.hostname();
            if Platform::from_hostname(&hostname) != Some(self.platform) {
                info!(platform = %self.platform, %hostname, "Left platform, guard stopped");
                return;
            }

            let input = match await_element(self.page.as_ref(), config.input_selector, self.wait).await {
                Ok(Some(input)) => input,
                Ok(None) => {
                    warn!(
                        platform = %self.platform,
                        timeout_ms = self.wait.timeout.as_millis(),
                        "Input element not found, retrying on next page change"
                    );
                    // Only changes after the timeout count.
                    let mut mutations = self.page.observe();
                    if matches!(mutations.recv().await, Err(RecvError::Closed)) {
                        return;
                    }
                    continue;
                }
                Err(e) => {
                    warn!(platform = %self.platform, error = %e, "Input lookup failed, guard inactive");
                    return;
                }
            };

            let mut mutations = self.page.observe();
            let checker = match self.bind_input(input) {
                Ok(checker) => checker,
                Err(e) => {
                    warn!(%input, error = %e, "Failed to bind input, retrying on next page change");
                    if matches!(mutations.recv().await, Err(RecvError::Closed)) {
                        return;
                    }
                    continue;
                }
            };
            let mut bound = self.bind_controls(&mut controls);
            self.status.send_modify(|s| {
                s.input = Some(input);
                s.attached = true;
                s.bound_controls = bound;
                s.attach_count += 1;
            });
            info!(platform = %self.platform, %input, controls = bound, "Guard attached");

            loop {
                match next_burst(&mut mutations, self.platform).await {
                    Burst::Changed => {}
                    Burst::LeftPlatform(hostname) => {
                        info!(platform = %self.platform, %hostname, "Left platform, guard stopped");
                        self.detach();
                        return;
                    }
                    Burst::Closed => {
                        self.detach();
                        return;
                    }
                }
                if !self.page.is_connected(input) {
                    debug!(%input, "Input left the document, re-attaching");
                    break;
                }
                let newly = self.bind_controls(&mut controls);
                if newly > 0 {
                    bound += newly;
                    self.status.send_modify(|s| s.bound_controls = bound);
                }
            }

            drop(checker);
            self.detach();
        }
    }

    fn bind_input(&self, input: ElementId) -> crate::Result<LiveChecker> {
        let checker = LiveChecker::spawn(
            Arc::clone(&self.page),
            Arc::clone(&self.detector),
            self.platform.config().text_extraction,
            input,
            self.debounce,
            Arc::clone(&self.results),
        );
        self.page
            .add_event_listener(input, "input", checker.listener())?;
        Ok(checker)
    }

    fn bind_controls(&self, controls: &mut BoundControls) -> usize {
        match controls.bind() {
            Ok(newly) => newly,
            Err(e) => {
                warn!(platform = %self.platform, error = %e, "Submit binding failed");
                0
            }
        }
    }

    fn detach(&self) {
        self.status.send_modify(|s| {
            s.input = None;
            s.attached = false;
            s.bound_controls = 0;
        });
    }
}

/// Wait for a mutation, then drain whatever else is already queued.
///
/// The last navigation of the burst decides whether the page is still on
/// `platform`.
async fn next_burst(mutations: &mut broadcast::Receiver<Mutation>, platform: Platform) -> Burst {
    let mut left = None;
    let mut note = |mutation: Mutation| {
        if let Mutation::Navigated { hostname } = mutation {
            left = (Platform::from_hostname(&hostname) != Some(platform)).then_some(hostname);
        }
    };

    match mutations.recv().await {
        Ok(mutation) => note(mutation),
        Err(RecvError::Lagged(skipped)) => debug!(skipped, "Mutation backlog skipped"),
        Err(RecvError::Closed) => return Burst::Closed,
    }
    loop {
        match mutations.try_recv() {
            Ok(mutation) => note(mutation),
            Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Closed) => return Burst::Closed,
        }
    }

    match left {
        Some(hostname) => Burst::LeftPlatform(hostname),
        None => Burst::Changed,
    }
}
