//! Chrome discovery and launch for scrape sessions

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use chromiumoxide::handler::viewport::Viewport;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

use crate::BrowserConfig;

/// Profile directory that is removed again unless the launch succeeds
struct ProfileDirGuard {
    path: PathBuf,
    armed: bool,
}

impl ProfileDirGuard {
    fn create(path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create profile directory {}", path.display()))?;
        Ok(Self { path, armed: true })
    }

    /// The launched browser owns the directory from here on
    fn disarm(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for ProfileDirGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed profile dir after failed launch: {}", self.path.display()),
            Err(e) => warn!("Failed to remove profile dir {}: {}", self.path.display(), e),
        }
    }
}

/// Well-known install locations for the current platform
fn install_candidates() -> Vec<PathBuf> {
    let fixed: &[&str] = if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Chromium\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/opt/google/chrome/chrome",
        ]
    };

    let mut candidates: Vec<PathBuf> = fixed.iter().map(PathBuf::from).collect();
    if cfg!(target_os = "macos")
        && let Some(home) = dirs::home_dir()
    {
        candidates.push(home.join("Applications/Google Chrome.app/Contents/MacOS/Google Chrome"));
    }
    candidates
}

/// Resolve a browser named on `PATH`
fn which(binary: &str) -> Option<PathBuf> {
    let output = Command::new("which").arg(binary).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let found = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!found.is_empty()).then(|| PathBuf::from(found))
}

/// Locate Chrome/Chromium: `CHROMIUM_PATH`, then install locations, then `PATH`
pub async fn find_browser_executable() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            info!("Using browser from CHROMIUM_PATH: {}", path.display());
            return Ok(path);
        }
        warn!("CHROMIUM_PATH points to a missing file: {}", path.display());
    }

    if let Some(path) = install_candidates().into_iter().find(|p| p.exists()) {
        info!("Found browser at: {}", path.display());
        return Ok(path);
    }

    if !cfg!(target_os = "windows")
        && let Some(path) = ["chromium", "chromium-browser", "google-chrome", "chrome"]
            .into_iter()
            .find_map(which)
    {
        info!("Found browser on PATH: {}", path.display());
        return Ok(path);
    }

    Err(anyhow::anyhow!("Chrome/Chromium executable not found"))
}

/// Fetch a Chromium build into the user cache and return its executable
pub async fn download_managed_browser() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(|| std::env::temp_dir().join(".cache"))
        .join("landing_pipeline/chromium");
    std::fs::create_dir_all(&cache_dir).context("Failed to create browser cache directory")?;

    info!("Downloading managed Chromium into {}", cache_dir.display());
    let fetcher = BrowserFetcher::new(
        BrowserFetcherOptions::builder()
            .with_path(&cache_dir)
            .build()
            .context("Failed to build fetcher options")?,
    );
    let revision = fetcher.fetch().await.context("Failed to fetch browser")?;

    Ok(revision.executable_path)
}

/// Flags every session launches with
///
/// chromiumoxide's default argument set includes `--enable-automation`, which
/// sets `navigator.webdriver` and shows the automation infobar, so defaults are
/// disabled and the safe subset is restated here.
const SESSION_ARGS: &[&str] = &[
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--disable-extensions",
    "--disable-notifications",
    "--disable-popup-blocking",
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-breakpad",
    "--disable-component-extensions-with-background-pages",
    "--disable-features=TranslateUI",
    "--disable-hang-monitor",
    "--disable-ipc-flooding-protection",
    "--disable-prompt-on-repost",
    "--ignore-certificate-errors",
    "--metrics-recording-only",
    "--no-first-run",
    "--no-default-browser-check",
    "--password-store=basic",
    "--use-mock-keychain",
    "--hide-scrollbars",
    "--mute-audio",
];

/// Launch settings for one session
///
/// The CDP request timeout equals the page-load ceiling so a slow navigation
/// is cut off by that ceiling rather than by chromiumoxide's 30 s default. The
/// emulated viewport matches the window.
fn session_browser_config(
    config: &BrowserConfig,
    user_data_dir: &Path,
    chrome_path: PathBuf,
    user_agent: &str,
) -> Result<chromiumoxide::BrowserConfig> {
    let (width, height) = (config.window.width, config.window.height);
    let mut builder = BrowserConfigBuilder::default()
        .disable_default_args()
        .request_timeout(Duration::from_secs(config.page_load_timeout_secs))
        .window_size(width, height)
        .viewport(Viewport {
            width,
            height,
            ..Viewport::default()
        })
        .user_data_dir(user_data_dir)
        .chrome_executable(chrome_path);

    builder = if config.headless {
        builder.headless_mode(HeadlessMode::New)
    } else {
        builder.with_head()
    };

    // Sessions run unattended in containers, where setuid sandboxing fails
    builder
        .arg(format!("--user-agent={user_agent}"))
        .arg(format!("--window-size={width},{height}"))
        .args(SESSION_ARGS.iter().copied())
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))
}

/// Find or download Chrome and start it for one stealth scrape session
///
/// `user_data_dir` must be unique per session so concurrent sessions never
/// contend for Chrome's profile lock. It is removed again if the launch fails.
pub async fn launch_browser(
    config: &BrowserConfig,
    user_data_dir: PathBuf,
    user_agent: &str,
) -> Result<(Browser, JoinHandle<()>)> {
    let chrome_path = match find_browser_executable().await {
        Ok(path) => path,
        Err(e) => {
            warn!("{e}; falling back to a managed download");
            download_managed_browser().await?
        }
    };

    let profile = ProfileDirGuard::create(user_data_dir)?;
    let browser_config = session_browser_config(config, &profile.path, chrome_path, user_agent)?;

    debug!("Launching browser with config: {:?}", browser_config);
    let (browser, mut handler) = Browser::launch(browser_config)
        .await
        .context("Failed to launch browser")?;

    let handler_task = task::spawn(async move {
        while let Some(event) = handler.next().await {
            let Err(e) = event else { continue };
            let message = e.to_string();

            // chromiumoxide cannot decode some newer CDP events; those are noise
            // (mattsse/chromiumoxide#167, #229)
            if message.contains("data did not match any variant of untagged enum Message")
                || message.contains("Failed to deserialize WS response")
            {
                trace!("Suppressed undecodable CDP message: {}", message);
            } else {
                error!("Browser handler error: {:?}", e);
            }
        }
        debug!("Browser handler task completed");
    });

    profile.disarm();
    Ok((browser, handler_task))
}
