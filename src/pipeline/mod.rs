//! URL in, landing-page record out
//!
//! # Architecture
//! - `detail` - the merged record, its defaults and manual edits
//! - this module - [`ProductPipeline`], which wires scraper, copy generator,
//!   slug assignment and the landing-page store together

mod detail;

pub use detail::{
    DEFAULT_BENEFITS, DEFAULT_CTA, DEFAULT_HEADLINE, DEFAULT_LINK, DEFAULT_PRICE,
    DEFAULT_SUBHEADLINE, DEFAULT_URGENCY, DEFAULT_USP, DetailEdit, MergedProductDetail,
    Testimonial,
};

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::copy::{CopyGenerator, CopyOutcome, GeneratedCopy, NOT_AVAILABLE};
use crate::scrape::{ProductFacts, ScrapeError, ScrapeOrchestrator, UNRESOLVED};
use crate::slug::{SlugError, unique_slug};
use crate::store::{LandingPage, LandingPageStore, StoreError};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid product URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    #[error(transparent)]
    Slug(#[from] SlugError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("required fields are blank: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
}

/// Only absolute `http`/`https` URLs with a host are accepted
pub fn validate_product_url(raw: &str) -> Result<Url, PipelineError> {
    let invalid = |reason: String| PipelineError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".into()));
    }
    Ok(url)
}

/// Text the slug is derived from: the headline, else the scraped title
fn slug_source<'a>(copy: &'a GeneratedCopy, facts: &'a ProductFacts) -> &'a str {
    if copy.headline != NOT_AVAILABLE {
        &copy.headline
    } else if facts.title != UNRESOLVED {
        &facts.title
    } else {
        ""
    }
}

pub struct ProductPipeline {
    scraper: ScrapeOrchestrator,
    generator: CopyGenerator,
    store: Arc<dyn LandingPageStore>,
}

impl ProductPipeline {
    pub fn new(
        scraper: ScrapeOrchestrator,
        generator: CopyGenerator,
        store: Arc<dyn LandingPageStore>,
    ) -> Self {
        Self {
            scraper,
            generator,
            store,
        }
    }

    pub fn scraper(&self) -> &ScrapeOrchestrator {
        &self.scraper
    }

    pub fn store(&self) -> &Arc<dyn LandingPageStore> {
        &self.store
    }

    /// Scrape `url`, generate copy, and assign a free slug
    ///
    /// A degraded scrape skips generation; the record keeps sentinel copy and
    /// carries the scrape error. A failed generation likewise carries its
    /// error. Neither is a hard failure.
    pub async fn process(&self, url: &str) -> Result<MergedProductDetail, PipelineError> {
        validate_product_url(url)?;
        let url = url.trim();
        let facts = self.scraper.scrape(url).await?;

        let (copy, error) = match &facts.error {
            Some(scrape_error) => {
                warn!("Skipping copy generation for degraded scrape of {}", url);
                (GeneratedCopy::default(), Some(scrape_error.clone()))
            }
            None => match self.generator.generate(&facts).await {
                CopyOutcome::Generated(product) => (product.copy, None),
                CopyOutcome::Failed { error } => {
                    warn!("Copy generation for {} failed: {}", url, error);
                    (GeneratedCopy::default(), Some(error))
                }
            },
        };

        let slug = unique_slug(self.store.as_ref(), slug_source(&copy, &facts)).await?;
        info!("Processed {} into landing page '{}'", url, slug);

        Ok(MergedProductDetail::merge(url, &facts, copy, slug, error))
    }

    /// A complete record built without a real product
    ///
    /// The model is still asked for copy; whatever it cannot supply falls back
    /// to fixed defaults.
    pub async fn default_detail(&self) -> Result<MergedProductDetail, PipelineError> {
        let outcome = self.generator.generate(&ProductFacts::unresolved()).await;
        if let Some(error) = outcome.error() {
            warn!("Default copy generation failed ({}); using fixed defaults", error);
        }

        let mut detail = MergedProductDetail::with_defaults(outcome.copy());
        detail.slug = unique_slug(self.store.as_ref(), &detail.copy.headline).await?;
        Ok(detail)
    }

    /// Validate `detail`, give it a slug if it has none, and store it
    pub async fn save(&self, mut detail: MergedProductDetail) -> Result<LandingPage, PipelineError> {
        let missing = detail.missing_required_fields();
        if !missing.is_empty() {
            return Err(PipelineError::MissingFields(missing));
        }

        if detail.slug.trim().is_empty() {
            detail.slug = unique_slug(self.store.as_ref(), &detail.copy.headline).await?;
        }

        Ok(self.store.upsert(detail).await?)
    }

    /// Apply a manual edit to a stored page
    pub async fn edit(&self, slug: &str, edit: DetailEdit) -> Result<LandingPage, PipelineError> {
        let mut detail = self
            .store
            .get(slug)
            .await?
            .ok_or_else(|| StoreError::NotFound(slug.to_string()))?
            .detail;

        edit.apply(&mut detail);
        self.save(detail).await
    }

    pub async fn publish(&self, slug: &str) -> Result<LandingPage, PipelineError> {
        Ok(self.store.publish(slug).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_only_absolute_http_urls() {
        assert!(validate_product_url("https://www.amazon.com/dp/B0TEST").is_ok());
        assert!(validate_product_url("http://shop.example/item?id=1").is_ok());

        for bad in ["ftp://shop.example/x", "not a url", "/dp/B0TEST", "mailto:a@b.c", ""] {
            assert!(
                matches!(validate_product_url(bad), Err(PipelineError::InvalidUrl { .. })),
                "{bad}"
            );
        }
    }

    #[test]
    fn slug_source_prefers_headline_then_title() {
        let mut facts = ProductFacts::unresolved();
        let mut copy = GeneratedCopy::default();
        assert_eq!(slug_source(&copy, &facts), "");

        facts.title = "Acme Kettle".into();
        assert_eq!(slug_source(&copy, &facts), "Acme Kettle");

        copy.headline = "Boil faster".into();
        assert_eq!(slug_source(&copy, &facts), "Boil faster");
    }

    #[test]
    fn missing_fields_error_lists_names() {
        let err = PipelineError::MissingFields(vec!["headline", "cta"]);
        assert_eq!(err.to_string(), "required fields are blank: headline, cta");
    }
}
