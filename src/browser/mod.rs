//! Browser infrastructure for scoped, stealth-configured Chrome sessions
//!
//! A [`SessionProvider`] hands out one [`PageSession`] per scrape attempt.
//! Sessions are never shared: each owns its own Chrome process and profile
//! directory, and is torn down by [`PageSession::release`] (or, on unwind, by
//! `Drop`).

mod session;
mod wrapper;

pub use crate::browser_setup::{download_managed_browser, find_browser_executable};
pub use session::{ChromeSession, ChromeSessionProvider};
pub use wrapper::BrowserWrapper;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Element-level view of one loaded page
///
/// Misses are not errors: `extract_*` return `None` or an empty list when the
/// selector matches nothing. Errors mean the automation layer itself failed.
#[async_trait]
pub trait PageSession: Send {
    /// Load `url` and wait for the load lifecycle to finish
    async fn navigate(&mut self, url: &str) -> BrowserResult<()>;

    /// Poll until `selector` matches or `timeout` passes
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> BrowserResult<()>;

    /// Rendered text of the first match
    async fn extract_text(&mut self, selector: &str) -> BrowserResult<Option<String>>;

    /// Attribute of the first match
    async fn extract_attribute(
        &mut self,
        selector: &str,
        attribute: &str,
    ) -> BrowserResult<Option<String>>;

    /// Rendered text of every match, in document order
    async fn extract_all_text(&mut self, selector: &str) -> BrowserResult<Vec<String>>;

    /// Attribute of every match, in document order
    async fn extract_all_attributes(
        &mut self,
        selector: &str,
        attribute: &str,
    ) -> BrowserResult<Vec<Option<String>>>;

    /// Close the page and shut the engine down. Safe to call more than once.
    async fn release(&mut self) -> BrowserResult<()>;
}

/// Source of fresh, isolated page sessions
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn PageSession>, SessionError>;
}

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Failed to find browser executable: {0}")]
    NotFound(String),

    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Failed to create page: {0}")]
    PageCreationFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Element not found (timeout after {waited_ms}ms): '{selector}'")]
    ElementNotFound { selector: String, waited_ms: u128 },

    #[error("Browser engine error: {0}")]
    Engine(String),

    #[error("IO error: {0}")]
    IoError(String),
}

pub type BrowserResult<T> = Result<T, BrowserError>;

/// Failure to produce a usable session
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    /// The engine process never came up
    #[error("browser engine failed to start: {0}")]
    Init(String),

    /// The engine started but the page could not be prepared
    #[error("browser page setup failed: {0}")]
    Setup(String),
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        match err {
            chromiumoxide::error::CdpError::Timeout => {
                BrowserError::Timeout("CDP request timed out".into())
            }
            other => BrowserError::Engine(other.to_string()),
        }
    }
}
