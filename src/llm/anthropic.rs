//! Anthropic Claude LLM integration.
//!
//! Implements the `PriceEstimator` trait using the Anthropic Messages API.
//! Handles request construction, text extraction from content blocks and
//! token accounting. Anthropic reports tokens only, so no dollar figure
//! is computed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::parse::parse_response;
use super::prompt::{build_prompt, system_prompt};
use super::{
    api_error_message, finish_estimation, run_guarded, HttpOptions, PriceEstimator,
    MAX_COMPLETION_TOKENS,
};
use crate::error::EstimatorError;
use crate::types::{Cost, Estimation, EstimationRequestSettings, Listing, ProviderId};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_TEMPERATURE: f64 = 0.2;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
    /// Nested parts, as seen on tool-result style blocks.
    #[serde(default)]
    content: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct AnthropicEstimator {
    http: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    temperature: f64,
}

impl AnthropicEstimator {
    pub fn new(
        api_key: SecretString,
        settings: &EstimationRequestSettings,
        http: &HttpOptions,
    ) -> Result<Self, EstimatorError> {
        Ok(Self {
            http: http.client()?,
            api_key,
            base_url: http.base_url(ProviderId::Anthropic).to_string(),
            model: settings.model_name.clone(),
            // Messages API only accepts 0..=1
            temperature: settings
                .temperature
                .map(|t| t.clamp(0.0, 1.0))
                .unwrap_or(DEFAULT_TEMPERATURE),
        })
    }

    async fn request_estimate(&self, listing: &Listing) -> Result<Estimation> {
        let prompt = build_prompt(listing, ProviderId::Anthropic.meta().supports_vision);
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_COMPLETION_TOKENS,
            temperature: self.temperature,
            system: system_prompt(),
            messages: vec![Message {
                role: "user",
                content: &prompt,
            }],
        };

        debug!(model = %self.model, "Requesting Anthropic estimate");

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = api_error_message(&error_text)
                .unwrap_or_else(|| format!("Anthropic API HTTP {}", status.as_u16()));
            anyhow::bail!(message);
        }

        let body: MessagesResponse = response
            .json()
            .await
            .context("Failed to parse Anthropic response")?;

        if body.stop_reason.as_deref() == Some("max_tokens") {
            debug!(model = %self.model, "Anthropic response hit max_tokens");
        }

        let text = block_text(&body.content);
        if text.trim().is_empty() {
            anyhow::bail!("Empty AI response");
        }

        let parsed = parse_response(&text);
        let cost = body.usage.as_ref().map(usage_cost);
        Ok(finish_estimation(parsed, ProviderId::Anthropic, &self.model, cost))
    }
}

/// Join the text of every content block, descending into nested parts.
fn block_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .map(|block| match (&block.text, &block.content) {
            (Some(text), _) if !text.is_empty() => text.clone(),
            (_, Some(parts)) => parts
                .iter()
                .map(|p| p.get("text").and_then(Value::as_str).unwrap_or_default())
                .collect::<Vec<_>>()
                .join("\n"),
            _ => {
                if block.content_type != "text" {
                    debug!(block_type = %block.content_type, "Skipping non-text content block");
                }
                String::new()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn usage_cost(usage: &Usage) -> Cost {
    let total_tokens = usage.input_tokens + usage.output_tokens;
    Cost {
        provider: ProviderId::Anthropic,
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens,
        formatted: format!("~{total_tokens} tokens (Anthropic)"),
        cost: None,
        currency: None,
        is_estimated: false,
    }
}

// ---------------------------------------------------------------------------
// PriceEstimator implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl PriceEstimator for AnthropicEstimator {
    async fn estimate_value_with_cancel(
        &self,
        listing: &Listing,
        cancel: &CancellationToken,
    ) -> Estimation {
        run_guarded(
            ProviderId::Anthropic,
            &self.model,
            cancel,
            self.request_estimate(listing),
        )
        .await
    }

    fn provider(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
