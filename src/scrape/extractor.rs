//! Field extraction from a loaded product page

use std::time::Duration;
use tracing::{error, info, warn};

use super::{ExtractFailure, PRICE_NOT_FOUND, ProductFacts, UNRESOLVED};
use crate::Config;
use crate::browser::{BrowserError, PageSession};
use crate::utils::constants::{
    BODY_SELECTOR, IMAGE_SELECTOR, MAX_IMAGES, MAX_REVIEWS, PRICE_SELECTORS, REVIEW_SELECTOR,
    TITLE_SELECTOR,
};

/// Wait ceilings applied during one extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractTimeouts {
    pub page_load: Duration,
    pub element_wait: Duration,
}

impl Default for ExtractTimeouts {
    fn default() -> Self {
        Self {
            page_load: Duration::from_secs(180),
            element_wait: Duration::from_secs(60),
        }
    }
}

impl From<&Config> for ExtractTimeouts {
    fn from(config: &Config) -> Self {
        Self {
            page_load: config.page_load_timeout(),
            element_wait: config.element_wait_timeout(),
        }
    }
}

/// Load `url` in `session` and read the product fields
///
/// Never fails: any fault is recorded in `ProductFacts::error` and the record
/// is returned with whatever was read before the fault.
pub async fn extract(
    session: &mut dyn PageSession,
    url: &str,
    timeouts: &ExtractTimeouts,
) -> ProductFacts {
    let mut facts = ProductFacts::unresolved();

    if let Err(failure) = fill_facts(session, url, timeouts, &mut facts).await {
        error!("Scrape of {} failed: {}", url, failure);
        facts.error = Some(failure.to_string());
    }

    facts
}

async fn fill_facts(
    session: &mut dyn PageSession,
    url: &str,
    timeouts: &ExtractTimeouts,
    facts: &mut ProductFacts,
) -> Result<(), ExtractFailure> {
    info!("Navigating to: {}", url);
    match tokio::time::timeout(timeouts.page_load, session.navigate(url)).await {
        Err(_) => {
            return Err(ExtractFailure::NavigationTimeout(format!(
                "{} did not finish loading within {}s",
                url,
                timeouts.page_load.as_secs()
            )));
        }
        Ok(result) => result.map_err(classify)?,
    }

    session
        .wait_for(BODY_SELECTOR, timeouts.element_wait)
        .await
        .map_err(|e| classify_wait(e, ExtractFailure::NavigationTimeout))?;

    session
        .wait_for(TITLE_SELECTOR, timeouts.element_wait)
        .await
        .map_err(|e| classify_wait(e, ExtractFailure::ElementMissing))?;

    let title = session.extract_text(TITLE_SELECTOR).await.map_err(classify)?;
    facts.title = trimmed_or(title, UNRESOLVED);

    facts.price = extract_price(session, timeouts.element_wait).await;
    facts.image_urls = extract_images(session).await?;
    facts.review_snippets = extract_reviews(session).await?;

    Ok(())
}

/// Primary selector, then secondary, then the not-found sentinel
async fn extract_price(session: &mut dyn PageSession, wait: Duration) -> String {
    for selector in PRICE_SELECTORS {
        if let Err(e) = session.wait_for(selector, wait).await {
            warn!("Price element '{}' not found, trying next selector: {}", selector, e);
            continue;
        }
        match session.extract_text(selector).await {
            Ok(text) => return trimmed_or(text, UNRESOLVED),
            Err(e) => warn!("Failed to read price from '{}': {}", selector, e),
        }
    }

    PRICE_NOT_FOUND.to_string()
}

/// A miss is an empty list; a read fault fails the attempt
async fn extract_images(session: &mut dyn PageSession) -> Result<Vec<String>, ExtractFailure> {
    let sources = session
        .extract_all_attributes(IMAGE_SELECTOR, "src")
        .await
        .map_err(classify)?;

    Ok(sources
        .into_iter()
        .take(MAX_IMAGES)
        .flatten()
        .filter(|src| !src.trim().is_empty())
        .collect())
}

async fn extract_reviews(session: &mut dyn PageSession) -> Result<Vec<String>, ExtractFailure> {
    let reviews = session
        .extract_all_text(REVIEW_SELECTOR)
        .await
        .map_err(classify)?;

    Ok(reviews
        .into_iter()
        .take(MAX_REVIEWS)
        .map(|review| review.trim().to_string())
        .filter(|review| !review.is_empty())
        .collect())
}

fn trimmed_or(text: Option<String>, fallback: &str) -> String {
    match text {
        Some(text) if !text.trim().is_empty() => text.trim().to_string(),
        _ => fallback.to_string(),
    }
}

/// A wait that ran out maps to `on_timeout`; anything else is an engine fault
fn classify_wait(err: BrowserError, on_timeout: fn(String) -> ExtractFailure) -> ExtractFailure {
    match err {
        BrowserError::ElementNotFound { .. } | BrowserError::Timeout(_) => {
            on_timeout(err.to_string())
        }
        other => classify(other),
    }
}

fn classify(err: BrowserError) -> ExtractFailure {
    match err {
        BrowserError::Timeout(_) => ExtractFailure::NavigationTimeout(err.to_string()),
        BrowserError::ElementNotFound { .. } => ExtractFailure::ElementMissing(err.to_string()),
        BrowserError::NavigationFailed(_)
        | BrowserError::Engine(_)
        | BrowserError::PageCreationFailed(_)
        | BrowserError::LaunchFailed(_) => ExtractFailure::AutomationEngine(err.to_string()),
        BrowserError::NotFound(_) | BrowserError::IoError(_) => {
            ExtractFailure::Unexpected(err.to_string())
        }
    }
}
