//! Chrome-backed page sessions

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::wrapper::{BrowserWrapper, create_blank_page};
use super::{BrowserError, BrowserResult, PageSession, SessionError, SessionProvider};
use crate::BrowserConfig;
use crate::utils::constants::{HIDE_WEBDRIVER_SCRIPT, USER_AGENTS};
use crate::utils::wait_for_element;

/// Pick one user agent uniformly from the fixed pool
pub(crate) fn pick_user_agent() -> &'static str {
    let index = rand::rng().random_range(0..USER_AGENTS.len());
    USER_AGENTS[index]
}

/// Launches a fresh Chrome process per session
///
/// Each session gets a unique profile directory so concurrent scrapes in one
/// process never contend for Chrome's profile lock.
#[derive(Debug, Clone, Default)]
pub struct ChromeSessionProvider {
    config: BrowserConfig,
}

impl ChromeSessionProvider {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionProvider for ChromeSessionProvider {
    async fn acquire(&self) -> Result<Box<dyn PageSession>, SessionError> {
        let user_agent = pick_user_agent();
        let user_data_dir = std::env::temp_dir().join(format!(
            "landing_pipeline_{}_{}",
            std::process::id(),
            uuid::Uuid::new_v4().simple()
        ));

        let (browser, handler) = crate::browser_setup::launch_browser(
            &self.config,
            user_data_dir.clone(),
            user_agent,
        )
        .await
        .map_err(|e| SessionError::Init(format!("{e:#}")))?;

        // From here on, dropping the wrapper kills the process on any error path
        let wrapper = BrowserWrapper::new(browser, handler, user_data_dir);

        let page = create_blank_page(&wrapper)
            .await
            .map_err(|e| SessionError::Setup(format!("{e:#}")))?;

        apply_stealth(&page, user_agent)
            .await
            .map_err(|e| SessionError::Setup(e.to_string()))?;

        info!("Browser session ready (user agent: {})", user_agent);
        Ok(Box::new(ChromeSession::new(wrapper, page)))
    }
}

/// Reapply the user agent at the network layer and hide `navigator.webdriver`
async fn apply_stealth(page: &Page, user_agent: &str) -> BrowserResult<()> {
    page.execute(SetUserAgentOverrideParams::new(user_agent))
        .await?;
    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(HIDE_WEBDRIVER_SCRIPT))
        .await?;
    Ok(())
}

/// One page in one dedicated Chrome process
pub struct ChromeSession {
    wrapper: Option<BrowserWrapper>,
    page: Page,
}

impl ChromeSession {
    pub(crate) fn new(wrapper: BrowserWrapper, page: Page) -> Self {
        Self {
            wrapper: Some(wrapper),
            page,
        }
    }

    /// First element matching `selector`
    ///
    /// A miss is an empty match list; every error is an engine fault.
    async fn first_match(&self, selector: &str) -> BrowserResult<Option<Element>> {
        let elements = self.page.find_elements(selector).await?;
        if elements.is_empty() {
            debug!("No match for '{}'", selector);
        }
        Ok(elements.into_iter().next())
    }
}

/// A CDP request timeout during navigation is a page-load timeout
fn navigation_error(url: &str, err: CdpError) -> BrowserError {
    match err {
        CdpError::Timeout => BrowserError::Timeout(format!("{url} did not finish loading")),
        other => BrowserError::NavigationFailed(format!("{url}: {other}")),
    }
}

#[async_trait]
impl PageSession for ChromeSession {
    async fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| navigation_error(url, e))?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| navigation_error(url, e))?;
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> BrowserResult<()> {
        wait_for_element(&self.page, selector, timeout).await?;
        Ok(())
    }

    async fn extract_text(&mut self, selector: &str) -> BrowserResult<Option<String>> {
        match self.first_match(selector).await? {
            Some(element) => Ok(element.inner_text().await?),
            None => Ok(None),
        }
    }

    async fn extract_attribute(
        &mut self,
        selector: &str,
        attribute: &str,
    ) -> BrowserResult<Option<String>> {
        match self.first_match(selector).await? {
            Some(element) => Ok(element.attribute(attribute).await?),
            None => Ok(None),
        }
    }

    async fn extract_all_text(&mut self, selector: &str) -> BrowserResult<Vec<String>> {
        let elements = self.page.find_elements(selector).await?;
        let mut texts = Vec::with_capacity(elements.len());
        for element in elements {
            texts.push(element.inner_text().await?.unwrap_or_default());
        }
        Ok(texts)
    }

    async fn extract_all_attributes(
        &mut self,
        selector: &str,
        attribute: &str,
    ) -> BrowserResult<Vec<Option<String>>> {
        let elements = self.page.find_elements(selector).await?;
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            values.push(element.attribute(attribute).await?);
        }
        Ok(values)
    }

    async fn release(&mut self) -> BrowserResult<()> {
        let Some(mut wrapper) = self.wrapper.take() else {
            return Ok(());
        };

        info!("Shutting down browser session");
        if let Err(e) = self.page.clone().close().await {
            debug!("Page already closed: {}", e);
        }
        wrapper
            .shutdown()
            .await
            .map_err(|e| BrowserError::Engine(format!("{e:#}")))
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if self.wrapper.is_some() {
            warn!("ChromeSession dropped without release; killing browser process");
        }
    }
}
