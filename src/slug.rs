//! URL slugs for landing pages

use thiserror::Error;
use tracing::debug;

use crate::store::{LandingPageStore, StoreError};

/// Characters of the title that feed the slug
const SLUG_SOURCE_CHARS: usize = 45;

/// Candidates checked before giving up: the base and `-1` through `-9`
pub const MAX_SLUG_PROBES: u32 = 10;

const FALLBACK_SLUG: &str = "untitled";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlugError {
    #[error("no free slug for '{base}' after {probes} attempts")]
    Exhausted { base: String, probes: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Lowercase, drop punctuation, and join words with single hyphens
///
/// Unicode letters and digits are kept.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_separator = false;

    for c in value.chars().flat_map(char::to_lowercase) {
        if c == '-' || c.is_whitespace() {
            pending_separator = true;
        } else if c.is_alphanumeric() || c == '_' {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c);
        }
    }

    slug.trim_matches(|c| c == '-' || c == '_').to_string()
}

/// Base slug for `title`: its first 45 characters, slugified
pub fn base_slug(title: &str) -> String {
    let head: String = title.chars().take(SLUG_SOURCE_CHARS).collect();
    let slug = slugify(&head);
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// First slug derived from `title` that `store` does not hold yet
///
/// The check is advisory: nothing reserves the slug between this call and
/// the eventual write.
pub async fn unique_slug(store: &dyn LandingPageStore, title: &str) -> Result<String, SlugError> {
    let base = base_slug(title);

    for probe in 0..MAX_SLUG_PROBES {
        let candidate = if probe == 0 {
            base.clone()
        } else {
            format!("{base}-{probe}")
        };

        if !store.slug_exists(&candidate).await? {
            debug!("Slug '{}' is free", candidate);
            return Ok(candidate);
        }
        debug!("Slug '{}' is taken", candidate);
    }

    Err(SlugError::Exhausted {
        base,
        probes: MAX_SLUG_PROBES,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::MergedProductDetail;
    use crate::store::MemoryLandingPageStore;

    async fn store_with(slugs: &[&str]) -> MemoryLandingPageStore {
        let store = MemoryLandingPageStore::new();
        for slug in slugs {
            let mut detail = MergedProductDetail::placeholder();
            detail.slug = slug.to_string();
            store.upsert(detail).await.unwrap();
        }
        store
    }

    #[test]
    fn slugify_normalizes_words() {
        assert_eq!(slugify("Widget"), "widget");
        assert_eq!(slugify("  Acme -- Kettle, 1.7L!  "), "acme-kettle-17l");
        assert_eq!(slugify("snake_case stays"), "snake_case-stays");
        assert_eq!(slugify("Café Crème"), "café-crème");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn base_slug_uses_first_45_characters() {
        let title = "a".repeat(40) + " bcdefghij";
        assert_eq!(base_slug(&title), "a".repeat(40) + "-bcde");
        assert_eq!(base_slug("???"), "untitled");
        assert_eq!(base_slug(""), "untitled");
    }

    #[tokio::test]
    async fn free_base_is_returned_as_is() {
        let store = store_with(&[]).await;
        assert_eq!(unique_slug(&store, "Widget").await.unwrap(), "widget");
    }

    #[tokio::test]
    async fn probes_numbered_suffixes() {
        let store = store_with(&["widget", "widget-1"]).await;
        assert_eq!(unique_slug(&store, "Widget").await.unwrap(), "widget-2");
    }

    #[tokio::test]
    async fn gives_up_after_ten_candidates() {
        let taken: Vec<String> = std::iter::once("widget".to_string())
            .chain((1..=10).map(|n| format!("widget-{n}")))
            .collect();
        let taken: Vec<&str> = taken.iter().map(String::as_str).collect();
        let store = store_with(&taken).await;

        assert_eq!(
            unique_slug(&store, "Widget").await.unwrap_err(),
            SlugError::Exhausted {
                base: "widget".into(),
                probes: MAX_SLUG_PROBES
            }
        );
    }

    #[tokio::test]
    async fn ninth_suffix_is_the_last_candidate() {
        let taken: Vec<String> = std::iter::once("widget".to_string())
            .chain((1..=8).map(|n| format!("widget-{n}")))
            .collect();
        let taken: Vec<&str> = taken.iter().map(String::as_str).collect();
        let store = store_with(&taken).await;

        assert_eq!(unique_slug(&store, "Widget").await.unwrap(), "widget-9");
    }
}
