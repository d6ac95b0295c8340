//! Timeout validation for browser wait ceilings

use std::time::Duration;

use crate::ConfigError;

/// Maximum page-load ceiling (5 minutes)
/// Covers slow-loading sites, heavy SPAs, and network delays
pub const MAX_NAVIGATION_TIMEOUT_SECS: u64 = 300;

/// Maximum ceiling for a single element wait (2 minutes)
pub const MAX_ELEMENT_TIMEOUT_SECS: u64 = 120;

/// Validate the page-load ceiling
///
/// # Returns
/// * `Ok(Duration)` - Validated Duration object
/// * `Err(ConfigError)` - If the value is zero or exceeds MAX_NAVIGATION_TIMEOUT_SECS
pub fn validate_navigation_timeout(secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 || secs > MAX_NAVIGATION_TIMEOUT_SECS {
        return Err(ConfigError::Invalid(format!(
            "page load timeout must be within 1..={}s ({} minutes). Received: {}s",
            MAX_NAVIGATION_TIMEOUT_SECS,
            MAX_NAVIGATION_TIMEOUT_SECS / 60,
            secs
        )));
    }

    Ok(Duration::from_secs(secs))
}

/// Validate the per-element wait ceiling
pub fn validate_element_timeout(secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 || secs > MAX_ELEMENT_TIMEOUT_SECS {
        return Err(ConfigError::Invalid(format!(
            "element wait timeout must be within 1..={}s. Received: {}s",
            MAX_ELEMENT_TIMEOUT_SECS, secs
        )));
    }

    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_values_inside_the_ceiling() {
        assert_eq!(
            validate_navigation_timeout(180).unwrap(),
            Duration::from_secs(180)
        );
        assert_eq!(validate_element_timeout(60).unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn rejects_zero_and_oversized_values() {
        assert!(validate_navigation_timeout(0).is_err());
        assert!(validate_navigation_timeout(301).is_err());
        assert!(validate_element_timeout(121).is_err());
    }
}
