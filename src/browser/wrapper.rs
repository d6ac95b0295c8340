//! Browser process lifecycle
//!
//! Owns the chromiumoxide `Browser`, its CDP handler task and the temporary
//! profile directory for one session.

use anyhow::{Context, Result};
use chromiumoxide::browser::Browser;
use chromiumoxide::page::Page;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Wrapper for Browser and its event handler task
///
/// Handler MUST be aborted to prevent it running indefinitely after
/// browser is closed; `Drop` does this for every exit path.
pub struct BrowserWrapper {
    browser: Browser,
    handler: JoinHandle<()>,
    user_data_dir: Option<PathBuf>,
}

impl BrowserWrapper {
    pub(crate) fn new(browser: Browser, handler: JoinHandle<()>, user_data_dir: PathBuf) -> Self {
        Self {
            browser,
            handler,
            user_data_dir: Some(user_data_dir),
        }
    }

    pub(crate) fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Close the browser and wait for the process to exit, then remove the
    /// profile directory
    ///
    /// `close()` alone leaves a zombie; `wait()` reaps it. The directory is
    /// removed last so Chrome has released its file handles.
    pub(crate) async fn shutdown(&mut self) -> Result<()> {
        let closed = self.browser.close().await.context("Failed to close browser");
        if let Err(e) = self.browser.wait().await {
            warn!("Failed to wait for browser exit: {}", e);
        }
        self.cleanup_temp_dir();
        closed.map(|_| ())
    }

    /// Clean up temp directory (blocking operation)
    ///
    /// Uses blocking `std::fs::remove_dir_all()` because this may be called
    /// from Drop context where async is not available.
    pub fn cleanup_temp_dir(&mut self) {
        if let Some(path) = self.user_data_dir.take() {
            info!("Cleaning up temp directory: {}", path.display());
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!(
                    "Failed to clean up temp directory {}: {}. Manual cleanup may be required.",
                    path.display(),
                    e
                );
            }
        }
    }
}

impl Drop for BrowserWrapper {
    fn drop(&mut self) {
        self.handler.abort();
        // Browser::drop() kills the Chrome process

        if self.user_data_dir.is_some() {
            warn!("BrowserWrapper dropped without shutdown; removing profile directory");
            self.cleanup_temp_dir();
        }
    }
}

/// Create a blank page for stealth injection
///
/// The page must be blank while the user-agent override and the webdriver
/// script are installed; navigation to the target URL happens afterwards.
pub async fn create_blank_page(wrapper: &BrowserWrapper) -> Result<Page> {
    let page = wrapper
        .browser()
        .new_page("about:blank")
        .await
        .context("Failed to create blank page")?;

    info!("Created blank page for stealth injection");
    Ok(page)
}
