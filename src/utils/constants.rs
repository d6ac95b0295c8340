//! Shared constants for browser sessions and product extraction
//!
//! Selector lists and the user agent pool live here so a markup change on the
//! target site is a one-file update.

/// User agents rotated per browser session
///
/// Drawn uniformly at random at session start, then reapplied through
/// `Network.setUserAgentOverride` so the navigation request and
/// `navigator.userAgent` agree.
pub const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
];

/// Injected before any page script runs
pub const HIDE_WEBDRIVER_SCRIPT: &str =
    "Object.defineProperty(navigator, 'webdriver', {get: () => undefined})";

/// Generic marker that the document rendered at all
pub const BODY_SELECTOR: &str = "body";

/// Required; its absence fails the scrape attempt
pub const TITLE_SELECTOR: &str = "#productTitle";

/// Tried in order before giving up on the price
pub const PRICE_SELECTORS: [&str; 2] = [".a-price-whole", "#priceblock_ourprice"];

pub const IMAGE_SELECTOR: &str = "#main-image-container img";

pub const REVIEW_SELECTOR: &str = "[data-hook=\"review-collapsed\"]";

pub const MAX_IMAGES: usize = 5;

pub const MAX_REVIEWS: usize = 3;
