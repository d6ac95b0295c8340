//! Element polling for pages that render after the load event
//!
//! Product pages fill most of their DOM from JavaScript, so `find_element`
//! right after navigation often misses. This polls with exponential backoff
//! until the element appears or the ceiling passes.

use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::element::Element;

use crate::browser::BrowserError;

/// Wait for an element to appear in the DOM using exponential backoff polling
///
/// # Polling Strategy
/// - Starts at 100ms intervals
/// - Doubles each retry (exponential backoff)
/// - Caps at 1 second maximum interval
/// - Total duration limited by timeout parameter
pub async fn wait_for_element(
    page: &Page,
    selector: &str,
    timeout: Duration,
) -> Result<Element, BrowserError> {
    let start = std::time::Instant::now();
    let mut poll_interval = Duration::from_millis(100);
    let max_interval = Duration::from_secs(1);

    loop {
        if let Ok(element) = page.find_element(selector).await {
            return Ok(element);
        }

        if start.elapsed() >= timeout {
            return Err(BrowserError::ElementNotFound {
                selector: selector.to_string(),
                waited_ms: timeout.as_millis(),
            });
        }

        tokio::time::sleep(poll_interval).await;

        poll_interval = (poll_interval * 2).min(max_interval);
    }
}
