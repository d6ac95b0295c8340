//! Product page scraping
//!
//! # Architecture
//! - `extractor` - pulls fields out of one loaded page; failures become data
//! - `orchestrator` - session lifecycle, fixed-delay retry and the URL cache

mod extractor;
mod orchestrator;

pub use extractor::{ExtractTimeouts, extract};
pub use orchestrator::{
    RetryPolicy, ScrapeCache, ScrapeOrchestrator, cached, retry_with_fixed_delay,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::browser::SessionError;

/// Placeholder for a field that could not be resolved
pub const UNRESOLVED: &str = "N/A";

/// Recorded when neither price selector matched
pub const PRICE_NOT_FOUND: &str = "Price not found";

/// Facts extracted from one product page
///
/// Always fully shaped. `error` marks the record as unreliable; fields that
/// were read before the failure keep their values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFacts {
    pub title: String,
    pub price: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub review_snippets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProductFacts {
    /// A record with every field at its sentinel
    pub fn unresolved() -> Self {
        Self {
            title: UNRESOLVED.to_string(),
            price: UNRESOLVED.to_string(),
            image_urls: Vec::new(),
            review_snippets: Vec::new(),
            error: None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// Why an extraction attempt stopped early
///
/// Never returned to callers: the extractor stores the message in
/// [`ProductFacts::error`].
#[derive(Error, Debug)]
pub enum ExtractFailure {
    #[error("page did not load within the time limit: {0}")]
    NavigationTimeout(String),

    #[error("required page element is missing: {0}")]
    ElementMissing(String),

    #[error("browser automation error: {0}")]
    AutomationEngine(String),

    #[error("unexpected extraction error: {0}")]
    Unexpected(String),
}

/// Hard scrape failures
#[derive(Error, Debug, Clone)]
pub enum ScrapeError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("scrape failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl ScrapeError {
    /// Only page setup failures are worth another attempt; an engine that
    /// cannot start will not start on retry either
    pub fn is_transient(&self) -> bool {
        matches!(self, ScrapeError::Session(SessionError::Setup(_)))
    }
}
