use serde::{Deserialize, Serialize};

use crate::copy::{GeneratedCopy, NOT_AVAILABLE, ProductCopy};
use crate::scrape::{ProductFacts, UNRESOLVED};

pub const DEFAULT_LINK: &str = "https://example.com/buy-now";
pub const DEFAULT_PRICE: &str = "99.99";
pub const DEFAULT_HEADLINE: &str = "Default Headline";
pub const DEFAULT_SUBHEADLINE: &str = "Default Subheadline";
pub const DEFAULT_USP: &str = "Default USP";
pub const DEFAULT_BENEFITS: [&str; 2] = ["Benefit 1", "Benefit 2"];
pub const DEFAULT_CTA: &str = "Buy Now";
pub const DEFAULT_URGENCY: &str = "Limited Time Offer!";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Testimonial {
    pub text: String,
    pub author: String,
    #[serde(default)]
    pub stars: u8,
    #[serde(default)]
    pub date: String,
}

/// The record handed to the landing-page store and to presentation
///
/// Serializes flat: copy fields sit next to the product fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedProductDetail {
    /// Product URL the record was built from
    pub link: String,
    pub title: String,
    pub price: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub review_snippets: Vec<String>,
    #[serde(flatten)]
    pub copy: GeneratedCopy,
    #[serde(default)]
    pub testimonials: Vec<Testimonial>,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MergedProductDetail {
    pub fn merge(
        link: &str,
        facts: &ProductFacts,
        copy: GeneratedCopy,
        slug: String,
        error: Option<String>,
    ) -> Self {
        Self {
            link: link.to_string(),
            title: facts.title.clone(),
            price: facts.price.clone(),
            image_urls: facts.image_urls.clone(),
            review_snippets: facts.review_snippets.clone(),
            copy,
            testimonials: Vec::new(),
            slug,
            error,
        }
    }

    /// Every field at its sentinel, no link and no slug
    pub fn placeholder() -> Self {
        Self::merge(
            "",
            &ProductFacts::unresolved(),
            GeneratedCopy::default(),
            String::new(),
            None,
        )
    }

    /// Fixed defaults, overridden by whatever `generated` actually supplied
    ///
    /// Slug is left empty for the caller to assign.
    pub fn with_defaults(generated: Option<&ProductCopy>) -> Self {
        let pick = |value: Option<&String>, default: &str| match value {
            Some(v) if v != NOT_AVAILABLE && v != UNRESOLVED && !v.trim().is_empty() => v.clone(),
            _ => default.to_string(),
        };
        let copy = generated.map(|g| &g.copy);

        let benefits = match copy {
            Some(c) if c.benefits.iter().any(|b| b != NOT_AVAILABLE) => c.benefits.clone(),
            _ => DEFAULT_BENEFITS.iter().map(|b| b.to_string()).collect(),
        };
        let headline = pick(copy.map(|c| &c.headline), DEFAULT_HEADLINE);

        Self {
            link: DEFAULT_LINK.to_string(),
            title: headline.clone(),
            price: pick(generated.map(|g| &g.price), DEFAULT_PRICE),
            image_urls: Vec::new(),
            review_snippets: Vec::new(),
            copy: GeneratedCopy {
                headline,
                subheadline: pick(copy.map(|c| &c.subheadline), DEFAULT_SUBHEADLINE),
                usp: pick(copy.map(|c| &c.usp), DEFAULT_USP),
                benefits,
                cta: pick(copy.map(|c| &c.cta), DEFAULT_CTA),
                testimonial: pick(copy.map(|c| &c.testimonial), NOT_AVAILABLE),
                urgency: pick(copy.map(|c| &c.urgency), DEFAULT_URGENCY),
            },
            testimonials: Vec::new(),
            slug: String::new(),
            error: None,
        }
    }

    /// Names of the fields that must be filled before the page is stored
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        [
            ("headline", &self.copy.headline),
            ("subheadline", &self.copy.subheadline),
            ("link", &self.link),
            ("price", &self.price),
            ("usp", &self.copy.usp),
            ("cta", &self.copy.cta),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    /// `key: value` lines for plain-text display
    pub fn to_key_values(&self) -> Vec<(&'static str, String)> {
        let mut lines = vec![
            ("slug", self.slug.clone()),
            ("link", self.link.clone()),
            ("title", self.title.clone()),
            ("price", self.price.clone()),
            ("headline", self.copy.headline.clone()),
            ("subheadline", self.copy.subheadline.clone()),
            ("usp", self.copy.usp.clone()),
            ("benefits", self.copy.benefits.join(", ")),
            ("cta", self.copy.cta.clone()),
            ("testimonial", self.copy.testimonial.clone()),
            ("urgency", self.copy.urgency.clone()),
            ("image_urls", self.image_urls.join(" ")),
        ];
        if let Some(error) = &self.error {
            lines.push(("error", error.clone()));
        }
        lines
    }
}

/// A manual correction to a merged record; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailEdit {
    pub link: Option<String>,
    pub price: Option<String>,
    pub headline: Option<String>,
    pub subheadline: Option<String>,
    pub usp: Option<String>,
    /// Comma-separated
    pub benefits: Option<String>,
    pub cta: Option<String>,
    pub urgency: Option<String>,
    pub testimonials: Option<Vec<Testimonial>>,
}

impl DetailEdit {
    pub fn apply(self, detail: &mut MergedProductDetail) {
        let set = |target: &mut String, value: Option<String>| {
            if let Some(value) = value {
                *target = value.trim().to_string();
            }
        };

        set(&mut detail.link, self.link);
        set(&mut detail.price, self.price);
        set(&mut detail.copy.headline, self.headline);
        set(&mut detail.copy.subheadline, self.subheadline);
        set(&mut detail.copy.usp, self.usp);
        set(&mut detail.copy.cta, self.cta);
        set(&mut detail.copy.urgency, self.urgency);

        if let Some(benefits) = self.benefits {
            detail.copy.benefits = benefits
                .split(',')
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(testimonials) = self.testimonials {
            detail.testimonials = testimonials
                .into_iter()
                .filter(|t| !t.text.trim().is_empty() && !t.author.trim().is_empty())
                .collect();
        }
    }
}
