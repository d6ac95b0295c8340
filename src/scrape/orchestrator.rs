//! Scrape orchestration: session lifecycle, retry and the URL cache
//!
//! The two wrappers are plain functions composed in [`ScrapeOrchestrator::scrape`]:
//! cache lookup first, then retry around a single session-scoped attempt.

use futures::FutureExt;
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::extractor::{ExtractTimeouts, extract};
use super::{ProductFacts, ScrapeError};
use crate::browser::SessionProvider;
use crate::{Config, ScrapeConfig};

/// Fixed-delay retry settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(10),
        }
    }
}

impl From<&ScrapeConfig> for RetryPolicy {
    fn from(config: &ScrapeConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            delay: Duration::from_secs(config.retry_delay_secs),
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` is reached; the last error is returned
pub async fn retry_with_fixed_delay<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    is_retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && is_retryable(&e) => {
                warn!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt, attempts, e, policy.delay
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Bounded LRU cache of scrape results keyed by the exact URL string
///
/// Values are shared immutably; a hit hands back the same `Arc` that was
/// stored, error-carrying records included.
#[derive(Clone)]
pub struct ScrapeCache {
    inner: Cache<String, Arc<ProductFacts>>,
}

impl ScrapeCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .eviction_policy(EvictionPolicy::lru())
                .build(),
        }
    }

    pub async fn get(&self, url: &str) -> Option<Arc<ProductFacts>> {
        self.inner.get(url).await
    }

    pub async fn contains(&self, url: &str) -> bool {
        self.inner.get(url).await.is_some()
    }

    /// Drop every entry, e.g. after the target site changed its markup
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}

impl std::fmt::Debug for ScrapeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeCache")
            .field("entry_count", &self.inner.entry_count())
            .finish()
    }
}

/// Return the cached record for `url`, or run `compute` and cache its result
///
/// Concurrent misses for the same URL are coalesced: only one `compute` runs
/// and the others wait for its value. Errors are not cached.
pub async fn cached<F, Fut>(
    cache: &ScrapeCache,
    url: &str,
    compute: F,
) -> Result<Arc<ProductFacts>, ScrapeError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<ProductFacts, ScrapeError>>,
{
    if let Some(hit) = cache.get(url).await {
        debug!("Scrape cache hit: {}", url);
        return Ok(hit);
    }

    debug!("Scrape cache miss: {}", url);
    cache
        .inner
        .try_get_with(url.to_string(), async move { compute().await.map(Arc::new) })
        .await
        .map_err(|e| e.as_ref().clone())
}

/// Session-scoped, retried, cached product scraping
pub struct ScrapeOrchestrator {
    provider: Arc<dyn SessionProvider>,
    cache: ScrapeCache,
    retry: RetryPolicy,
    timeouts: ExtractTimeouts,
}

impl ScrapeOrchestrator {
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        cache: ScrapeCache,
        retry: RetryPolicy,
        timeouts: ExtractTimeouts,
    ) -> Self {
        Self {
            provider,
            cache,
            retry,
            timeouts,
        }
    }

    pub fn from_config(provider: Arc<dyn SessionProvider>, config: &Config) -> Self {
        Self::new(
            provider,
            ScrapeCache::new(config.scrape.cache_capacity),
            RetryPolicy::from(&config.scrape),
            ExtractTimeouts::from(config),
        )
    }

    pub fn cache(&self) -> &ScrapeCache {
        &self.cache
    }

    /// Scrape `url`, serving repeat requests from the cache
    ///
    /// A record with `error` set is a completed scrape: it is cached and not
    /// retried. Only session failures surface as `Err`.
    pub async fn scrape(&self, url: &str) -> Result<Arc<ProductFacts>, ScrapeError> {
        cached(&self.cache, url, || self.scrape_with_retry(url)).await
    }

    async fn scrape_with_retry(&self, url: &str) -> Result<ProductFacts, ScrapeError> {
        retry_with_fixed_delay(&self.retry, ScrapeError::is_transient, || {
            self.scrape_once(url)
        })
        .await
        .map_err(|e| {
            if e.is_transient() {
                ScrapeError::RetriesExhausted {
                    attempts: self.retry.max_attempts.max(1),
                    last: e.to_string(),
                }
            } else {
                e
            }
        })
    }

    /// One attempt in one fresh session; the session is released on every
    /// exit path, a panicking extractor included
    async fn scrape_once(&self, url: &str) -> Result<ProductFacts, ScrapeError> {
        let mut session = self.provider.acquire().await?;

        let outcome = AssertUnwindSafe(extract(session.as_mut(), url, &self.timeouts))
            .catch_unwind()
            .await;

        if let Err(e) = session.release().await {
            warn!("Error closing browser session: {}", e);
        }

        match outcome {
            Ok(facts) => {
                info!("Scrape of {} finished (degraded: {})", url, facts.is_degraded());
                Ok(facts)
            }
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::SessionError;
    use crate::testing::{ScriptedPage, ScriptedProvider};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn page() -> ScriptedPage {
        ScriptedPage::new()
            .with_element("body", "")
            .with_element("#productTitle", "Widget")
            .with_element(".a-price-whole", "10")
    }

    fn orchestrator(provider: Arc<ScriptedProvider>) -> ScrapeOrchestrator {
        ScrapeOrchestrator::new(
            provider,
            ScrapeCache::new(100),
            RetryPolicy {
                max_attempts: 3,
                delay: Duration::ZERO,
            },
            ExtractTimeouts {
                page_load: Duration::from_millis(50),
                element_wait: Duration::from_millis(10),
            },
        )
    }

    #[tokio::test]
    async fn second_scrape_is_served_from_cache() {
        let provider = Arc::new(ScriptedProvider::new(page()));
        let scraper = orchestrator(provider.clone());

        let first = scraper.scrape("https://shop.example/dp/1").await.unwrap();
        let second = scraper.scrape("https://shop.example/dp/1").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, *second);
        assert_eq!(provider.navigations(), 1);
        assert_eq!(provider.acquisitions(), 1);
        assert_eq!(provider.releases(), 1);
    }

    #[tokio::test]
    async fn cache_is_keyed_by_exact_url() {
        let provider = Arc::new(ScriptedProvider::new(page()));
        let scraper = orchestrator(provider.clone());

        scraper.scrape("https://shop.example/dp/1").await.unwrap();
        scraper.scrape("https://shop.example/dp/1?ref=x").await.unwrap();

        assert_eq!(provider.navigations(), 2);
    }

    #[tokio::test]
    async fn full_cache_evicts_the_least_recently_used_url() {
        let provider = Arc::new(ScriptedProvider::new(page()));
        let scraper = ScrapeOrchestrator::new(
            provider.clone(),
            ScrapeCache::new(2),
            RetryPolicy {
                max_attempts: 1,
                delay: Duration::ZERO,
            },
            ExtractTimeouts {
                page_load: Duration::from_millis(50),
                element_wait: Duration::from_millis(10),
            },
        );
        let settle = || scraper.cache().inner.run_pending_tasks();

        scraper.scrape("https://shop.example/dp/a").await.unwrap();
        settle().await;
        scraper.scrape("https://shop.example/dp/b").await.unwrap();
        settle().await;
        scraper.scrape("https://shop.example/dp/a").await.unwrap();
        settle().await;
        assert_eq!(provider.navigations(), 2);

        scraper.scrape("https://shop.example/dp/c").await.unwrap();
        settle().await;
        assert_eq!(provider.navigations(), 3);
        assert_eq!(scraper.cache().inner.entry_count(), 2);

        scraper.scrape("https://shop.example/dp/a").await.unwrap();
        assert_eq!(provider.navigations(), 3);

        scraper.scrape("https://shop.example/dp/b").await.unwrap();
        assert_eq!(provider.navigations(), 4);
    }

    #[tokio::test]
    async fn degraded_records_are_cached_and_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(
            ScriptedPage::new().with_element("body", ""),
        ));
        let scraper = orchestrator(provider.clone());

        let first = scraper.scrape("https://shop.example/dp/9").await.unwrap();
        assert!(first.is_degraded());
        assert_eq!(provider.acquisitions(), 1);

        let again = scraper.scrape("https://shop.example/dp/9").await.unwrap();
        assert_eq!(again.error, first.error);
        assert_eq!(provider.navigations(), 1);
    }

    #[tokio::test]
    async fn transient_setup_failures_are_retried() {
        let provider = Arc::new(ScriptedProvider::new(page()).fail_setup_times(2));
        let scraper = orchestrator(provider.clone());

        let facts = scraper.scrape("https://shop.example/dp/1").await.unwrap();
        assert_eq!(facts.title, "Widget");
        assert_eq!(provider.acquisitions(), 3);
        assert_eq!(provider.navigations(), 1);
    }

    #[tokio::test]
    async fn retries_stop_at_the_ceiling() {
        let provider = Arc::new(ScriptedProvider::new(page()).fail_setup_times(10));
        let scraper = orchestrator(provider.clone());

        let err = scraper.scrape("https://shop.example/dp/1").await.unwrap_err();
        assert!(matches!(err, ScrapeError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(provider.acquisitions(), 3);
        assert!(!scraper.cache().contains("https://shop.example/dp/1").await);
    }

    #[tokio::test]
    async fn engine_start_failure_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(page()).fail_init());
        let scraper = orchestrator(provider.clone());

        let err = scraper.scrape("https://shop.example/dp/1").await.unwrap_err();
        assert!(matches!(err, ScrapeError::Session(SessionError::Init(_))));
        assert_eq!(provider.acquisitions(), 1);
    }

    #[tokio::test]
    async fn session_is_released_when_extraction_panics() {
        let provider = Arc::new(ScriptedProvider::new(page().panic_on_navigate()));
        let scraper = Arc::new(orchestrator(provider.clone()));

        let task = tokio::spawn({
            let scraper = scraper.clone();
            async move { scraper.scrape("https://shop.example/dp/1").await.map(|_| ()) }
        });

        assert!(task.await.unwrap_err().is_panic());
        assert_eq!(provider.releases(), 1);
    }

    #[tokio::test]
    async fn retry_wrapper_skips_non_retryable_errors() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 5,
            delay: Duration::ZERO,
        };

        let result: Result<(), String> = retry_with_fixed_delay(
            &policy,
            |e: &String| e == "again",
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(if n < 1 { "again".to_string() } else { "stop".to_string() }) }
            },
        )
        .await;

        assert_eq!(result.unwrap_err(), "stop");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_wrapper_waits_the_fixed_delay() {
        let policy = RetryPolicy::default();
        let start = tokio::time::Instant::now();

        let result: Result<(), &str> =
            retry_with_fixed_delay(&policy, |_| true, || async { Err("down") }).await;

        assert_eq!(result.unwrap_err(), "down");
        assert_eq!(start.elapsed(), Duration::from_secs(20));
    }
}
