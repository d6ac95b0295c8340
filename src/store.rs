//! Landing-page persistence seam
//!
//! The pipeline only needs slug lookups and create-or-update by slug; the
//! in-memory store here backs the CLI and the tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::pipeline::MergedProductDetail;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("landing page not found: {0}")]
    NotFound(String),

    #[error("landing page already published: {0}")]
    AlreadyPublished(String),

    #[error("landing page has no slug")]
    MissingSlug,

    #[error("store backend error: {0}")]
    Backend(String),
}

/// A stored landing page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandingPage {
    pub detail: MergedProductDetail,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LandingPage {
    pub fn slug(&self) -> &str {
        &self.detail.slug
    }
}

#[async_trait]
pub trait LandingPageStore: Send + Sync {
    async fn slug_exists(&self, slug: &str) -> Result<bool, StoreError>;

    /// Create, or replace the detail of, the page keyed by `detail.slug`
    ///
    /// Replacing keeps the publication flag and creation time.
    async fn upsert(&self, detail: MergedProductDetail) -> Result<LandingPage, StoreError>;

    async fn get(&self, slug: &str) -> Result<Option<LandingPage>, StoreError>;

    async fn publish(&self, slug: &str) -> Result<LandingPage, StoreError>;

    async fn delete(&self, slug: &str) -> Result<(), StoreError>;
}

/// Process-local store keyed by slug
#[derive(Debug, Default)]
pub struct MemoryLandingPageStore {
    pages: DashMap<String, LandingPage>,
}

impl MemoryLandingPageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

#[async_trait]
impl LandingPageStore for MemoryLandingPageStore {
    async fn slug_exists(&self, slug: &str) -> Result<bool, StoreError> {
        Ok(self.pages.contains_key(slug))
    }

    async fn upsert(&self, detail: MergedProductDetail) -> Result<LandingPage, StoreError> {
        if detail.slug.trim().is_empty() {
            return Err(StoreError::MissingSlug);
        }

        let now = Utc::now();
        let page = match self.pages.entry(detail.slug.clone()) {
            Entry::Occupied(mut entry) => {
                let page = entry.get_mut();
                page.detail = detail;
                page.updated_at = now;
                page.clone()
            }
            Entry::Vacant(entry) => {
                info!("Created landing page '{}'", detail.slug);
                entry
                    .insert(LandingPage {
                        detail,
                        is_published: false,
                        created_at: now,
                        updated_at: now,
                    })
                    .clone()
            }
        };
        Ok(page)
    }

    async fn get(&self, slug: &str) -> Result<Option<LandingPage>, StoreError> {
        Ok(self.pages.get(slug).map(|page| page.clone()))
    }

    async fn publish(&self, slug: &str) -> Result<LandingPage, StoreError> {
        let mut page = self
            .pages
            .get_mut(slug)
            .ok_or_else(|| StoreError::NotFound(slug.to_string()))?;

        if page.is_published {
            warn!("Landing page '{}' is already published", slug);
            return Err(StoreError::AlreadyPublished(slug.to_string()));
        }

        page.is_published = true;
        page.updated_at = Utc::now();
        info!("Published landing page '{}'", slug);
        Ok(page.clone())
    }

    async fn delete(&self, slug: &str) -> Result<(), StoreError> {
        self.pages
            .remove(slug)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(slug.to_string()))
    }
}
