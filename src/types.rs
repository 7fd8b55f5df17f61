//! Shared types for KleinValue.
//!
//! These types form the data model used across all modules: the listing
//! handed in by the page extractor, the typed request settings, and the
//! estimation record handed back to the UI layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// A marketplace listing as scraped from the item page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub title: String,
    /// Free text; may embed a "Product Specifications:" block.
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_location")]
    pub location: String,
    /// Seller's asking price in EUR, `None` when the page shows none.
    #[serde(default)]
    pub price: Option<f64>,
    /// Absolute image URLs in gallery order.
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub posting_time: Option<DateTime<Utc>>,
}

fn default_location() -> String {
    "Unknown".to_string()
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.price {
            Some(p) => write!(f, "{} (€{p:.2}, {})", self.title, self.location),
            None => write!(f, "{} (no price, {})", self.title, self.location),
        }
    }
}

impl Listing {
    /// Whether the estimate is above the seller's asking price.
    ///
    /// A missing or zero price never counts as a good deal, and neither
    /// does a failed estimation.
    pub fn is_good_value(&self, estimation: &Estimation) -> bool {
        let listed = self.price.unwrap_or(0.0);
        let estimated = estimation.value.unwrap_or(0.0);
        listed > 0.0 && estimated > listed
    }

    /// Helper to build a test/sample listing with sensible defaults.
    #[cfg(test)]
    pub fn sample() -> Self {
        Listing {
            title: "iPhone 12".to_string(),
            description: "Good condition, 128GB".to_string(),
            location: "10115 Berlin".to_string(),
            price: Some(300.0),
            images: vec![
                "https://img.example.com/1.jpg".to_string(),
                "https://img.example.com/2.jpg".to_string(),
            ],
            url: "https://www.kleinanzeigen.de/s-anzeige/iphone-12/123".to_string(),
            posting_time: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    #[default]
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
}

impl ProviderId {
    /// All known providers (useful for iteration).
    pub const ALL: &'static [ProviderId] =
        &[ProviderId::Gemini, ProviderId::OpenAi, ProviderId::Anthropic];

    /// Stable identifier used in settings and cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "gemini",
            ProviderId::OpenAi => "openai",
            ProviderId::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a provider identifier (case-insensitive).
impl std::str::FromStr for ProviderId {
    type Err = crate::error::EstimatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderId::Gemini),
            "openai" | "gpt" => Ok(ProviderId::OpenAi),
            "anthropic" | "claude" => Ok(ProviderId::Anthropic),
            other => Err(crate::error::EstimatorError::UnknownProvider(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Request settings
// ---------------------------------------------------------------------------

pub const DEFAULT_RANDOM_SEED: u32 = 1337;
pub const MAX_RANDOM_SEED: u32 = 2_147_483_647;
pub const DEFAULT_MAX_IMAGES: u8 = 4;
pub const MAX_IMAGES_LIMIT: u8 = 10;

/// Validated settings for a single estimator instance.
///
/// Built once from the settings store via [`EstimationRequestSettings::builder`]
/// and passed to estimators explicitly. Sampling values that are `None` fall
/// back to the provider's own default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimationRequestSettings {
    pub provider: ProviderId,
    pub model_name: String,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub random_seed: u32,
    pub max_images: u8,
    pub enable_images: bool,
}

impl Default for EstimationRequestSettings {
    fn default() -> Self {
        Self::builder(ProviderId::default()).build()
    }
}

impl EstimationRequestSettings {
    pub fn builder(provider: ProviderId) -> EstimationRequestSettingsBuilder {
        EstimationRequestSettingsBuilder {
            provider,
            model_name: None,
            temperature: None,
            top_p: None,
            top_k: None,
            random_seed: None,
            max_images: None,
            enable_images: None,
        }
    }
}

/// Builder that clamps every field into its documented range.
#[derive(Debug, Clone)]
pub struct EstimationRequestSettingsBuilder {
    provider: ProviderId,
    model_name: Option<String>,
    temperature: Option<f64>,
    top_p: Option<f64>,
    top_k: Option<i64>,
    random_seed: Option<i64>,
    max_images: Option<i64>,
    enable_images: Option<bool>,
}

impl EstimationRequestSettingsBuilder {
    pub fn model_name(mut self, model: impl Into<String>) -> Self {
        self.model_name = Some(model.into());
        self
    }

    pub fn temperature(mut self, value: Option<f64>) -> Self {
        self.temperature = value;
        self
    }

    pub fn top_p(mut self, value: Option<f64>) -> Self {
        self.top_p = value;
        self
    }

    pub fn top_k(mut self, value: Option<i64>) -> Self {
        self.top_k = value;
        self
    }

    pub fn random_seed(mut self, value: Option<i64>) -> Self {
        self.random_seed = value;
        self
    }

    pub fn max_images(mut self, value: Option<i64>) -> Self {
        self.max_images = value;
        self
    }

    pub fn enable_images(mut self, value: Option<bool>) -> Self {
        self.enable_images = value;
        self
    }

    pub fn build(self) -> EstimationRequestSettings {
        let model_name = self
            .model_name
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.provider.meta().default_model.to_string());

        EstimationRequestSettings {
            provider: self.provider,
            model_name,
            temperature: self
                .temperature
                .filter(|t| t.is_finite())
                .map(|t| t.clamp(0.0, 2.0)),
            top_p: self.top_p.filter(|p| p.is_finite()).map(|p| p.clamp(0.0, 1.0)),
            top_k: self
                .top_k
                .filter(|k| *k > 0)
                .and_then(|k| u32::try_from(k).ok()),
            random_seed: self
                .random_seed
                .filter(|s| (0..=MAX_RANDOM_SEED as i64).contains(s))
                .map(|s| s as u32)
                .unwrap_or(DEFAULT_RANDOM_SEED),
            max_images: self
                .max_images
                .filter(|n| *n > 0)
                .map(|n| n.min(MAX_IMAGES_LIMIT as i64) as u8)
                .unwrap_or(DEFAULT_MAX_IMAGES),
            enable_images: self.enable_images.unwrap_or(true),
        }
    }
}

// ---------------------------------------------------------------------------
// Cost
// ---------------------------------------------------------------------------

/// Token usage (and, where the provider allows, a dollar figure) for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cost {
    pub provider: ProviderId,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Human-readable summary, e.g. `$0.000400` or `~512 tokens (OpenAI)`.
    pub formatted: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Set when usage metadata was missing and tokens are a guess.
    #[serde(default)]
    pub is_estimated: bool,
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (in={} out={})",
            self.formatted, self.prompt_tokens, self.completion_tokens
        )
    }
}

// ---------------------------------------------------------------------------
// Estimation
// ---------------------------------------------------------------------------

pub const DEFAULT_CONFIDENCE: f64 = 70.0;
pub const FALLBACK_CONFIDENCE: f64 = 50.0;
pub const NO_REASONING: &str = "No reasoning provided";
const FAILURE_REASONING: &str = "Analysis failed - please check your API key and try again";

/// A fair-value estimate for one listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimation {
    /// Euro amount rounded to 2 decimals; `None` only for failed estimations.
    pub value: Option<f64>,
    pub reasoning: String,
    /// Self-reported confidence, 0–100.
    pub confidence: f64,
    pub model: String,
    pub provider: ProviderId,
    pub provider_name: String,
    pub estimated_cost: Option<Cost>,
    #[serde(default)]
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Estimation {
    /// A failed estimation: no value, zero confidence, message for the UI.
    pub fn failure(provider: ProviderId, model: &str, message: impl Into<String>) -> Self {
        Estimation {
            value: None,
            reasoning: FAILURE_REASONING.to_string(),
            confidence: 0.0,
            model: model.to_string(),
            provider,
            provider_name: provider.meta().name.to_string(),
            estimated_cost: None,
            error: true,
            error_message: Some(message.into()),
        }
    }
}

impl fmt::Display for Estimation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.error {
            return write!(
                f,
                "[{}] estimation failed: {}",
                self.provider_name,
                self.error_message.as_deref().unwrap_or("unknown error"),
            );
        }
        write!(
            f,
            "[{} / {}] €{:.2} conf={:.0}%",
            self.provider_name,
            self.model,
            self.value.unwrap_or(0.0),
            self.confidence,
        )?;
        if let Some(cost) = &self.estimated_cost {
            write!(f, " cost={}", cost.formatted)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
