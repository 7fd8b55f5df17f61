//! LLM integration for fair-value price estimation.
//!
//! Defines the `PriceEstimator` trait and provides implementations for
//! Gemini (Google), GPT (OpenAI) and Claude (Anthropic), plus the shared
//! prompt builder, response parser and the estimator factory.

pub mod anthropic;
pub mod catalog;
pub mod factory;
pub mod gemini;
pub mod openai;
pub mod parse;
pub mod prompt;
pub mod registry;

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::types::{Cost, Estimation, Listing, ProviderId};
use parse::ParsedEstimate;

/// Default request timeout for provider calls and image downloads.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Completion budget for the chat-style providers.
pub(crate) const MAX_COMPLETION_TOKENS: u32 = 900;

/// Abstraction over LLM price estimators.
///
/// Implementors never fail: transport errors, bad status codes, empty or
/// malformed bodies and cancellation all come back as an [`Estimation`]
/// with `error` set.
#[async_trait]
pub trait PriceEstimator: Send + Sync {
    /// Estimate a listing's fair value, abandoning the call once `cancel` fires.
    async fn estimate_value_with_cancel(
        &self,
        listing: &Listing,
        cancel: &CancellationToken,
    ) -> Estimation;

    /// Estimate a listing's fair value.
    async fn estimate_value(&self, listing: &Listing) -> Estimation {
        self.estimate_value_with_cancel(listing, &CancellationToken::new())
            .await
    }

    fn provider(&self) -> ProviderId;

    /// Model identifier string.
    fn model_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// HTTP options
// ---------------------------------------------------------------------------

/// Transport settings shared by every estimator the factory builds.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub timeout: Duration,
    base_urls: HashMap<ProviderId, String>,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            base_urls: HashMap::new(),
        }
    }
}

impl HttpOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Point a provider at another host (proxies, test servers).
    pub fn with_base_url(mut self, provider: ProviderId, url: impl Into<String>) -> Self {
        self.base_urls
            .insert(provider, url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn base_url(&self, provider: ProviderId) -> &str {
        self.base_urls
            .get(&provider)
            .map(String::as_str)
            .unwrap_or_else(|| default_base_url(provider))
    }

    pub(crate) fn client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder().timeout(self.timeout).build()
    }
}

pub fn default_base_url(provider: ProviderId) -> &'static str {
    match provider {
        ProviderId::Gemini => "https://generativelanguage.googleapis.com",
        ProviderId::OpenAi => "https://api.openai.com",
        ProviderId::Anthropic => "https://api.anthropic.com",
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Run one provider call, folding errors and cancellation into the result.
pub(crate) async fn run_guarded<F>(
    provider: ProviderId,
    model: &str,
    cancel: &CancellationToken,
    call: F,
) -> Estimation
where
    F: Future<Output = anyhow::Result<Estimation>> + Send,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            warn!(%provider, model, "Estimation cancelled");
            Estimation::failure(provider, model, "Estimation cancelled")
        }
        result = call => match result {
            Ok(estimation) => {
                info!(
                    %provider,
                    model,
                    value = estimation.value.unwrap_or(0.0),
                    confidence = estimation.confidence,
                    cost = estimation.estimated_cost.as_ref().map(|c| c.formatted.as_str()).unwrap_or("n/a"),
                    "Estimate complete"
                );
                estimation
            }
            Err(e) => {
                let message = format!("{e:#}");
                warn!(%provider, model, error = %message, "Estimation failed");
                Estimation::failure(provider, model, message)
            }
        }
    }
}

/// Stamp provider details onto a parsed response.
pub(crate) fn finish_estimation(
    parsed: ParsedEstimate,
    provider: ProviderId,
    model: &str,
    cost: Option<Cost>,
) -> Estimation {
    Estimation {
        value: Some(parsed.value),
        reasoning: parsed.reasoning,
        confidence: parsed.confidence,
        model: model.to_string(),
        provider,
        provider_name: provider.meta().name.to_string(),
        estimated_cost: cost,
        error: false,
        error_message: None,
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// The `error.message` field of an OpenAI/Anthropic/Gemini error body.
pub(crate) fn api_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ApiError>(body)
        .ok()?
        .error?
        .message
        .filter(|m| !m.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
