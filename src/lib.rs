//! Product landing-page pipeline
//!
//! Scrapes product facts from a rendered e-commerce page via chromiumoxide,
//! turns them into marketing copy through an OpenAI-compatible model, and
//! merges both into a landing-page record with a unique slug.

mod browser;
pub mod browser_setup;
pub mod campaign;
pub mod copy;
pub mod pipeline;
pub mod scrape;
pub mod slug;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod utils;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub scrape: ScrapeConfig,

    #[serde(default)]
    pub model: ModelConfig,
}

/// Browser launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Window size; the emulated viewport is set to the same dimensions
    #[serde(default)]
    pub window: WindowConfig,

    /// Ceiling for the initial page load
    #[serde(default = "default_page_load_timeout_secs")]
    pub page_load_timeout_secs: u64,

    /// Ceiling for each explicit element wait
    #[serde(default = "default_element_wait_timeout_secs")]
    pub element_wait_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_width")]
    pub width: u32,

    #[serde(default = "default_window_height")]
    pub height: u32,
}

/// Retry and cache settings for the scrape orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    #[serde(default = "default_scrape_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,
}

/// Hosted language model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_model_attempts")]
    pub max_attempts: u32,

    /// Backoff unit; attempt `n` sleeps `backoff_base_ms * 2^n`
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_headless() -> bool {
    true
}

fn default_window_width() -> u32 {
    1920
}

fn default_window_height() -> u32 {
    1080
}

fn default_page_load_timeout_secs() -> u64 {
    180
}

fn default_element_wait_timeout_secs() -> u64 {
    60
}

fn default_scrape_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    10
}

fn default_cache_capacity() -> u64 {
    100
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    500
}

fn default_model_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            window: WindowConfig::default(),
            page_load_timeout_secs: default_page_load_timeout_secs(),
            element_wait_timeout_secs: default_element_wait_timeout_secs(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_window_width(),
            height: default_window_height(),
        }
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_scrape_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_attempts: default_model_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            api_key_env: default_api_key_env(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

impl Config {
    /// Check the values that would otherwise fail late, mid-scrape
    pub fn validate(&self) -> Result<(), ConfigError> {
        utils::validate_navigation_timeout(self.browser.page_load_timeout_secs)?;
        utils::validate_element_timeout(self.browser.element_wait_timeout_secs)?;

        if self.scrape.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "scrape.max_attempts must be at least 1".into(),
            ));
        }
        if self.scrape.cache_capacity == 0 {
            return Err(ConfigError::Invalid(
                "scrape.cache_capacity must be at least 1".into(),
            ));
        }
        if self.model.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "model.max_attempts must be at least 1".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::Invalid(format!(
                "model.temperature must be within 0.0..=2.0, got {}",
                self.model.temperature
            )));
        }
        Ok(())
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.browser.page_load_timeout_secs)
    }

    pub fn element_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.browser.element_wait_timeout_secs)
    }
}

/// Load config from the given YAML file, or `config.yaml` in the package root
///
/// A missing default file yields `Config::default()`; a missing explicit path
/// is an error.
pub fn load_yaml_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let (config_path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config.yaml"),
            false,
        ),
    };

    if !explicit && !config_path.exists() {
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
        path: config_path.clone(),
        source,
    })?;
    let config: Config = serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: config_path.clone(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

pub use browser::{
    BrowserError, BrowserResult, BrowserWrapper, ChromeSession, ChromeSessionProvider,
    PageSession, SessionError, SessionProvider, download_managed_browser,
    find_browser_executable,
};
pub use copy::{
    CompletionClient, CopyGenerator, CopyOutcome, GeneratedCopy, ModelError, OpenAiClient,
    ProductCopy,
};
pub use pipeline::{MergedProductDetail, PipelineError, ProductPipeline};
pub use scrape::{ProductFacts, ScrapeError, ScrapeOrchestrator};
pub use slug::{SlugError, unique_slug};
pub use store::{LandingPage, LandingPageStore, MemoryLandingPageStore, StoreError};
