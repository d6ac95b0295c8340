//! In-memory doubles for the browser and model seams
//!
//! Compiled for unit tests and behind the `testing` feature, which the
//! `tests/` integration suite enables.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::browser::{BrowserError, BrowserResult, PageSession, SessionError, SessionProvider};
use crate::copy::{ChatRequest, CompletionClient, ModelError};

#[derive(Debug, Clone)]
struct ScriptedElement {
    selector: String,
    text: String,
    attribute: Option<(String, String)>,
}

#[derive(Debug, Clone, Copy, Default)]
enum NavigateBehaviour {
    #[default]
    Load,
    Hang,
    TimeOut,
    Panic,
}

/// A page whose DOM is a flat list of `(selector, text, attribute)` entries
///
/// Clones share their counters, so a provider can hand out copies of one
/// template and the test can still count navigations across all of them.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPage {
    elements: Vec<ScriptedElement>,
    on_navigate: NavigateBehaviour,
    navigate_error: Option<String>,
    read_faults: Vec<(String, String)>,
    navigations: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one element matching `selector` with the given text
    pub fn with_element(mut self, selector: &str, text: &str) -> Self {
        self.elements.push(ScriptedElement {
            selector: selector.to_string(),
            text: text.to_string(),
            attribute: None,
        });
        self
    }

    /// Add one element matching `selector` carrying `name="value"`
    pub fn with_attribute(mut self, selector: &str, name: &str, value: &str) -> Self {
        self.elements.push(ScriptedElement {
            selector: selector.to_string(),
            text: String::new(),
            attribute: Some((name.to_string(), value.to_string())),
        });
        self
    }

    /// Navigation never completes
    pub fn hang_on_navigate(mut self) -> Self {
        self.on_navigate = NavigateBehaviour::Hang;
        self
    }

    /// Navigation fails the way a CDP request timeout surfaces
    pub fn time_out_navigate(mut self) -> Self {
        self.on_navigate = NavigateBehaviour::TimeOut;
        self
    }

    /// Navigation panics, as a buggy extractor step would
    pub fn panic_on_navigate(mut self) -> Self {
        self.on_navigate = NavigateBehaviour::Panic;
        self
    }

    /// Navigation fails with an engine error carrying `message`
    pub fn fail_navigate(mut self, message: &str) -> Self {
        self.navigate_error = Some(message.to_string());
        self
    }

    /// Every read of `selector` fails with an engine error carrying `message`;
    /// waits still succeed
    pub fn fail_reads_of(mut self, selector: &str, message: &str) -> Self {
        self.read_faults
            .push((selector.to_string(), message.to_string()));
        self
    }

    pub fn navigations(&self) -> usize {
        self.navigations.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    fn matching<'a>(&'a self, selector: &'a str) -> impl Iterator<Item = &'a ScriptedElement> + 'a {
        self.elements.iter().filter(move |e| e.selector == selector)
    }

    fn check_read(&self, selector: &str) -> BrowserResult<()> {
        match self.read_faults.iter().find(|(s, _)| s == selector) {
            Some((_, message)) => Err(BrowserError::Engine(message.clone())),
            None => Ok(()),
        }
    }

    fn attribute_of(element: &ScriptedElement, name: &str) -> Option<String> {
        element
            .attribute
            .as_ref()
            .filter(|(attr, _)| attr == name)
            .map(|(_, value)| value.clone())
    }
}

#[async_trait]
impl PageSession for ScriptedPage {
    async fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        self.navigations.fetch_add(1, Ordering::SeqCst);
        match self.on_navigate {
            NavigateBehaviour::Load => {}
            NavigateBehaviour::Hang => std::future::pending::<()>().await,
            NavigateBehaviour::TimeOut => {
                return Err(BrowserError::Timeout(format!("{url} did not finish loading")));
            }
            NavigateBehaviour::Panic => panic!("scripted navigation panic for {url}"),
        }
        match &self.navigate_error {
            Some(message) => Err(BrowserError::Engine(message.clone())),
            None => Ok(()),
        }
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> BrowserResult<()> {
        if self.matching(selector).next().is_some() {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound {
                selector: selector.to_string(),
                waited_ms: timeout.as_millis(),
            })
        }
    }

    async fn extract_text(&mut self, selector: &str) -> BrowserResult<Option<String>> {
        self.check_read(selector)?;
        Ok(self.matching(selector).next().map(|e| e.text.clone()))
    }

    async fn extract_attribute(
        &mut self,
        selector: &str,
        attribute: &str,
    ) -> BrowserResult<Option<String>> {
        self.check_read(selector)?;
        Ok(self
            .matching(selector)
            .next()
            .and_then(|e| Self::attribute_of(e, attribute)))
    }

    async fn extract_all_text(&mut self, selector: &str) -> BrowserResult<Vec<String>> {
        self.check_read(selector)?;
        Ok(self.matching(selector).map(|e| e.text.clone()).collect())
    }

    async fn extract_all_attributes(
        &mut self,
        selector: &str,
        attribute: &str,
    ) -> BrowserResult<Vec<Option<String>>> {
        self.check_read(selector)?;
        Ok(self
            .matching(selector)
            .map(|e| Self::attribute_of(e, attribute))
            .collect())
    }

    async fn release(&mut self) -> BrowserResult<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out clones of a template page, optionally failing first
#[derive(Debug)]
pub struct ScriptedProvider {
    template: ScriptedPage,
    setup_failures: AtomicUsize,
    fail_init: bool,
    acquisitions: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(template: ScriptedPage) -> Self {
        Self {
            template,
            setup_failures: AtomicUsize::new(0),
            fail_init: false,
            acquisitions: AtomicUsize::new(0),
        }
    }

    /// The first `times` acquisitions fail with a page setup error
    pub fn fail_setup_times(self, times: usize) -> Self {
        self.setup_failures.store(times, Ordering::SeqCst);
        self
    }

    /// Every acquisition fails as if the engine could not start
    pub fn fail_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> usize {
        self.template.navigations()
    }

    pub fn releases(&self) -> usize {
        self.template.releases()
    }
}

#[async_trait]
impl SessionProvider for ScriptedProvider {
    async fn acquire(&self) -> Result<Box<dyn PageSession>, SessionError> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);

        if self.fail_init {
            return Err(SessionError::Init("scripted engine start failure".into()));
        }

        let remaining = self.setup_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.setup_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(SessionError::Setup("scripted page setup failure".into()));
        }

        Ok(Box::new(self.template.clone()))
    }
}

/// Replays queued completions; the last one repeats once the queue drains
#[derive(Debug)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, ModelError>>>,
    last: Mutex<Option<ChatRequest>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<String, ModelError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always answer with the same body
    pub fn replying(body: &str) -> Self {
        Self::new(vec![Ok(body.to_string())])
    }

    /// Always fail with `error`
    pub fn failing(error: ModelError) -> Self {
        Self::new(vec![Err(error)])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.last.lock().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock() = Some(request.clone());

        let mut replies = self.replies.lock();
        match replies.len() {
            0 => Err(ModelError::EmptyResponse),
            1 => replies.front().cloned().unwrap_or(Err(ModelError::EmptyResponse)),
            _ => replies.pop_front().unwrap_or(Err(ModelError::EmptyResponse)),
        }
    }
}
