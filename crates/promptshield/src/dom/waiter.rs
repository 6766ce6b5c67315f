//! Waiting for elements of dynamically rendered pages.

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

use super::{ElementId, Page};
use crate::error::Result;

/// Timing of [`await_element`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Pause before the second query.
    pub retry_delay: Duration,
    /// Overall limit.
    pub timeout: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(1000),
            timeout: Duration::from_millis(10_000),
        }
    }
}

/// Wait for an element matching `selector` to exist.
///
/// Queries once immediately and once more after the retry delay, then
/// watches document mutations until the selector matches. When the timeout
/// elapses the subscription is dropped and one last direct query decides
/// the result.
///
/// # Errors
///
/// Returns an error if the selector is invalid.
pub async fn await_element(
    page: &dyn Page,
    selector: &str,
    options: WaitOptions,
) -> Result<Option<ElementId>> {
    if let Some(element) = page.query_selector(selector)? {
        return Ok(Some(element));
    }

    let start = Instant::now();
    let deadline = start + options.timeout;
    sleep_until((start + options.retry_delay).min(deadline)).await;

    let mut mutations = page.observe();
    if let Some(element) = page.query_selector(selector)? {
        trace!(selector, "Element found after retry delay");
        return Ok(Some(element));
    }

    loop {
        tokio::select! {
            () = sleep_until(deadline) => break,
            mutation = mutations.recv() => match mutation {
                Ok(_) | Err(RecvError::Lagged(_)) => {
                    if let Some(element) = page.query_selector(selector)? {
                        trace!(selector, elapsed_ms = start.elapsed().as_millis(), "Element appeared");
                        return Ok(Some(element));
                    }
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    drop(mutations);

    let element = page.query_selector(selector)?;
    if element.is_none() {
        debug!(selector, timeout_ms = options.timeout.as_millis(), "Element not found before timeout");
    }
    Ok(element)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{ElementSpec, VirtualPage};
    use std::sync::Arc;

    fn delayed_append(page: &Arc<VirtualPage>, after: Duration, spec: ElementSpec) {
        let page = Arc::clone(page);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            page.append(page.body(), spec).unwrap();
        });
    }

    #[test]
    fn test_default_options() {
        let options = WaitOptions::default();
        assert_eq!(options.retry_delay, Duration::from_secs(1));
        assert_eq!(options.timeout, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_match() {
        let page = VirtualPage::new("chatgpt.com");
        let input = page
            .append(page.body(), ElementSpec::new("textarea").id("prompt-textarea"))
            .unwrap();

        let start = Instant::now();
        let found = await_element(&page, "#prompt-textarea", WaitOptions::default())
            .await
            .unwrap();
        assert_eq!(found, Some(input));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_after_retry_delay() {
        let page = Arc::new(VirtualPage::new("chatgpt.com"));
        delayed_append(
            &page,
            Duration::from_millis(500),
            ElementSpec::new("textarea").id("prompt-textarea"),
        );

        let start = Instant::now();
        let found = await_element(page.as_ref(), "#prompt-textarea", WaitOptions::default())
            .await
            .unwrap();
        assert!(found.is_some());
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_on_mutation() {
        let page = Arc::new(VirtualPage::new("chatgpt.com"));
        delayed_append(
            &page,
            Duration::from_secs(3),
            ElementSpec::new("textarea").id("prompt-textarea"),
        );

        let start = Instant::now();
        let found = await_element(page.as_ref(), "#prompt-textarea", WaitOptions::default())
            .await
            .unwrap();
        assert!(found.is_some());
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrelated_mutations_keep_waiting() {
        let page = Arc::new(VirtualPage::new("chatgpt.com"));
        delayed_append(&page, Duration::from_secs(2), ElementSpec::new("div"));
        delayed_append(
            &page,
            Duration::from_secs(4),
            ElementSpec::new("textarea").id("prompt-textarea"),
        );

        let start = Instant::now();
        let found = await_element(page.as_ref(), "#prompt-textarea", WaitOptions::default())
            .await
            .unwrap();
        assert!(found.is_some());
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_none() {
        let page = VirtualPage::new("chatgpt.com");
        let options = WaitOptions {
            retry_delay: Duration::from_millis(100),
            timeout: Duration::from_secs(2),
        };

        let start = Instant::now();
        let found = await_element(&page, "#prompt-textarea", options).await.unwrap();
        assert_eq!(found, None);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_delay_bounded_by_timeout() {
        let page = VirtualPage::new("chatgpt.com");
        let options = WaitOptions {
            retry_delay: Duration::from_secs(5),
            timeout: Duration::from_secs(1),
        };

        let start = Instant::now();
        assert_eq!(await_element(&page, "textarea", options).await.unwrap(), None);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_selector_errors() {
        let page = VirtualPage::new("chatgpt.com");
        assert!(await_element(&page, "[", WaitOptions::default()).await.is_err());
    }
}
