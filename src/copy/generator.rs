//! Prompting and retry loop around a [`CompletionClient`]

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use super::client::{ChatMessage, ChatRequest, CompletionClient, ResponseFormat};
use super::{ALL_ATTEMPTS_FAILED, CopyOutcome, GeneratedCopy, GenerationError, ProductCopy};
use crate::ModelConfig;
use crate::scrape::ProductFacts;

const SYSTEM_INSTRUCTION: &str =
    "You are a JSON generator. Return ONLY valid JSON matching the exact format provided.";

/// Reviews quoted in the prompt
const PROMPT_REVIEWS: usize = 3;

/// Request parameters and retry schedule
#[derive(Debug, Clone, PartialEq)]
pub struct CopySettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_attempts: u32,
    /// Attempt `n` (from 0) that fails sleeps `backoff_base * 2^n`
    pub backoff_base: Duration,
}

impl Default for CopySettings {
    fn default() -> Self {
        Self::from(&ModelConfig::default())
    }
}

impl From<&ModelConfig> for CopySettings {
    fn from(config: &ModelConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_attempts: config.max_attempts,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
        }
    }
}

/// Turns product facts into landing-page copy
#[derive(Clone)]
pub struct CopyGenerator {
    client: Arc<dyn CompletionClient>,
    settings: CopySettings,
}

impl CopyGenerator {
    pub fn new(client: Arc<dyn CompletionClient>, settings: CopySettings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &CopySettings {
        &self.settings
    }

    pub fn build_prompt(facts: &ProductFacts) -> String {
        let reviews = facts
            .review_snippets
            .iter()
            .take(PROMPT_REVIEWS)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            r#"Write high-converting landing page copy for this product as a single JSON object.

Product:
- Title: {title}
- Price: {price}
- Reviews: {reviews}

Return exactly these keys:
{{
    "headline": "benefit-led headline, at most 50 characters",
    "subheadline": "supporting line on the main benefit, at most 100 characters",
    "usp": "unique selling proposition, at most 20 words",
    "benefits": ["benefit, at most 10 words", "benefit, at most 10 words", "benefit, at most 10 words"],
    "cta": "call to action, 3 to 5 words",
    "testimonial": "short customer-style testimonial, at most 20 words",
    "urgency": "urgency phrase, at most 10 words"
}}

Use persuasive, emotionally engaging language that reads well on mobile and is specific to the product above."#,
            title = facts.title,
            price = facts.price,
        )
    }

    pub fn request_for(&self, facts: &ProductFacts) -> ChatRequest {
        ChatRequest {
            model: self.settings.model.clone(),
            messages: vec![
                ChatMessage::system(SYSTEM_INSTRUCTION),
                ChatMessage::user(Self::build_prompt(facts)),
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            response_format: Some(ResponseFormat::JsonObject),
        }
    }

    /// Generate with the configured attempt ceiling
    pub async fn generate(&self, facts: &ProductFacts) -> CopyOutcome {
        self.generate_with_attempts(facts, self.settings.max_attempts)
            .await
    }

    /// Up to `max_attempts` model calls; missing keys never trigger a retry
    ///
    /// The failure message reflects the last attempt's failure class.
    pub async fn generate_with_attempts(
        &self,
        facts: &ProductFacts,
        max_attempts: u32,
    ) -> CopyOutcome {
        let request = self.request_for(facts);

        for attempt in 0..max_attempts {
            match self.attempt(&request).await {
                Ok(copy) => {
                    info!("Generated copy for '{}' on attempt {}", facts.title, attempt + 1);
                    return CopyOutcome::Generated(ProductCopy {
                        copy,
                        title: facts.title.clone(),
                        price: facts.price.clone(),
                        image_urls: facts.image_urls.clone(),
                    });
                }
                Err(e) => {
                    error!(
                        "Copy generation attempt {}/{} failed: {}",
                        attempt + 1,
                        max_attempts,
                        e
                    );
                    if attempt + 1 == max_attempts {
                        return CopyOutcome::Failed {
                            error: e.outcome_message().to_string(),
                        };
                    }
                    let delay = self.backoff(attempt);
                    debug!("Backing off {:?} before next attempt", delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        CopyOutcome::Failed {
            error: ALL_ATTEMPTS_FAILED.to_string(),
        }
    }

    async fn attempt(&self, request: &ChatRequest) -> Result<GeneratedCopy, GenerationError> {
        let raw = self.client.complete(request).await?;
        debug!("Model response: {}", raw);
        GeneratedCopy::parse(&raw)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.settings
            .backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copy::{ModelError, NOT_AVAILABLE, PARSE_FAILED, PROCESSING_FAILED, Role};
    use crate::testing::ScriptedModel;

    fn facts() -> ProductFacts {
        ProductFacts {
            title: "Acme Kettle".into(),
            price: "39.".into(),
            image_urls: vec!["https://img/1.jpg".into()],
            review_snippets: vec![
                "Boils fast".into(),
                "Quiet".into(),
                "Pretty".into(),
                "Fourth review".into(),
            ],
            error: None,
        }
    }

    fn generator(model: Arc<ScriptedModel>) -> CopyGenerator {
        CopyGenerator::new(
            model,
            CopySettings {
                backoff_base: Duration::ZERO,
                ..CopySettings::default()
            },
        )
    }

    #[test]
    fn prompt_quotes_title_price_and_three_reviews() {
        let prompt = CopyGenerator::build_prompt(&facts());
        assert!(prompt.contains("- Title: Acme Kettle"));
        assert!(prompt.contains("- Price: 39."));
        assert!(prompt.contains("- Reviews: Boils fast, Quiet, Pretty"));
        assert!(!prompt.contains("Fourth review"));
        for key in ["headline", "subheadline", "usp", "benefits", "cta", "testimonial", "urgency"] {
            assert!(prompt.contains(&format!("\"{key}\"")), "{key}");
        }
    }

    #[tokio::test]
    async fn request_uses_json_mode_and_model_settings() {
        let model = Arc::new(ScriptedModel::replying("{}"));
        generator(model.clone()).generate(&facts()).await;

        let request = model.last_request().unwrap();
        assert_eq!(request.model, "gpt-3.5-turbo");
        assert_eq!(request.temperature, 0.7);
        assert_eq!(request.max_tokens, 500);
        assert_eq!(request.response_format, Some(ResponseFormat::JsonObject));
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[0].content, SYSTEM_INSTRUCTION);
        assert_eq!(request.messages[1].role, Role::User);
    }

    #[tokio::test]
    async fn partial_response_is_completed_and_merged() {
        let model = Arc::new(ScriptedModel::replying(
            r#"{"headline": "Boil in 90 seconds", "benefits": ["Fast", "Quiet"]}"#,
        ));
        let outcome = generator(model.clone()).generate(&facts()).await;

        let product = outcome.copy().unwrap();
        assert_eq!(product.copy.headline, "Boil in 90 seconds");
        assert_eq!(product.copy.benefits, vec!["Fast", "Quiet"]);
        assert_eq!(product.copy.urgency, NOT_AVAILABLE);
        assert_eq!(product.title, "Acme Kettle");
        assert_eq!(product.price, "39.");
        assert_eq!(product.image_urls, vec!["https://img/1.jpg"]);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn always_failing_model_stops_at_the_ceiling() {
        let model = Arc::new(ScriptedModel::failing(ModelError::Http("reset".into())));
        let outcome = generator(model.clone()).generate(&facts()).await;

        assert_eq!(outcome.error(), Some(PROCESSING_FAILED));
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn persistent_garbage_reports_parse_failure() {
        let model = Arc::new(ScriptedModel::replying("not json at all"));
        let outcome = generator(model.clone())
            .generate_with_attempts(&facts(), 5)
            .await;

        assert_eq!(outcome.error(), Some(PARSE_FAILED));
        assert_eq!(model.calls(), 5);
    }

    #[tokio::test]
    async fn recovers_after_a_bad_response() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok("```json oops".into()),
            Err(ModelError::EmptyResponse),
            Ok(r#"{"headline": "Third time lucky"}"#.into()),
        ]));
        let outcome = generator(model.clone()).generate(&facts()).await;

        assert_eq!(outcome.copy().unwrap().copy.headline, "Third time lucky");
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn zero_attempts_reports_all_attempts_failed() {
        let model = Arc::new(ScriptedModel::replying("{}"));
        let outcome = generator(model.clone())
            .generate_with_attempts(&facts(), 0)
            .await;

        assert_eq!(outcome.error(), Some(ALL_ATTEMPTS_FAILED));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles_and_skips_the_final_sleep() {
        let model = Arc::new(ScriptedModel::failing(ModelError::EmptyResponse));
        let generator = CopyGenerator::new(model, CopySettings::default());
        let start = tokio::time::Instant::now();

        generator.generate(&facts()).await;

        // 1s after the first failure, 2s after the second, none after the third
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }
}
