//! OpenAI GPT LLM integration.
//!
//! Implements the `PriceEstimator` trait against the Chat Completions API.
//! Uses the shared prompt and parser; listing images are passed as URLs
//! in the prompt text only.

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

const DEFAULT_TEMPERATURE: f64 = 0.2;
const DEFAULT_TOP_P: f64 = 1.0;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    /// Plain string, or an array of content parts on newer models.
    #[serde(default)]
    content: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OpenAiEstimator {
    http: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    temperature: f64,
    top_p: f64,
}

impl OpenAiEstimator {
    pub fn new(
        api_key: SecretString,
        settings: &EstimationRequestSettings,
        http: &HttpOptions,
    ) -> Result<Self, EstimatorError> {
        Ok(Self {
            http: http.client()?,
            api_key,
            base_url: http.base_url(ProviderId::OpenAi).to_string(),
            model: settings.model_name.clone(),
            temperature: settings
                .temperature
                .map(|t| t.clamp(0.0, 2.0))
                .unwrap_or(DEFAULT_TEMPERATURE),
            top_p: settings
                .top_p
                .map(|p| p.clamp(0.0, 1.0))
                .unwrap_or(DEFAULT_TOP_P),
        })
    }

    async fn request_estimate(&self, listing: &Listing) -> Result<Estimation> {
        let prompt = build_prompt(listing, ProviderId::OpenAi.meta().supports_vision);
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: MAX_COMPLETION_TOKENS,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt(),
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
        };

        debug!(model = %self.model, "Requesting OpenAI estimate");

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .context("OpenAI request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = api_error_message(&error_text)
                .unwrap_or_else(|| format!("OpenAI API HTTP {}", status.as_u16()));
            anyhow::bail!(message);
        }

        let body: ChatResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI response")?;

        let text = body
            .choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.as_ref())
            .map(content_text)
            .unwrap_or_default();

        if text.trim().is_empty() {
            anyhow::bail!("Empty AI response");
        }

        let parsed = parse_response(&text);
        let cost = body.usage.as_ref().map(usage_cost);
        Ok(finish_estimation(parsed, ProviderId::OpenAi, &self.model, cost))
    }
}

/// Flatten `message.content` whether it is a string or a list of parts.
fn content_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .map(|part| match part {
                Value::String(s) => s.clone(),
                other => other
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn usage_cost(usage: &ChatUsage) -> Cost {
    let prompt_tokens = if usage.prompt_tokens > 0 {
        usage.prompt_tokens
    } else {
        usage.total_tokens
    };
    let completion_tokens = usage.completion_tokens;
    let total_tokens = if usage.total_tokens > 0 {
        usage.total_tokens
    } else {
        prompt_tokens + completion_tokens
    };

    Cost {
        provider: ProviderId::OpenAi,
        prompt_tokens,
        completion_tokens,
        total_tokens,
        formatted: format!("~{total_tokens} tokens (OpenAI)"),
        cost: None,
        currency: None,
        is_estimated: false,
    }
}

// ---------------------------------------------------------------------------
// PriceEstimator implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl PriceEstimator for OpenAiEstimator {
    async fn estimate_value_with_cancel(
        &self,
        listing: &Listing,
        cancel: &CancellationToken,
    ) -> Estimation {
        run_guarded(
            ProviderId::OpenAi,
            &self.model,
            cancel,
            self.request_estimate(listing),
        )
        .await
    }

    fn provider(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
