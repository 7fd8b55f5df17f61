//! Google Gemini LLM integration.
//!
//! Implements the `PriceEstimator` trait using the `generateContent` REST
//! endpoint. Gemini is the only provider that receives the listing photos:
//! they are downloaded, base64-encoded and attached as inline parts.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::future::join_all;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::parse::{extract_first_json_object, has_value_key, parse_response, strip_code_fences};
use super::prompt::build_prompt;
use super::{api_error_message, finish_estimation, run_guarded, HttpOptions, PriceEstimator};
use crate::error::EstimatorError;
use crate::types::{Cost, Estimation, EstimationRequestSettings, Listing, ProviderId};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const DEFAULT_TEMPERATURE: f64 = 0.0;
const DEFAULT_TOP_P: f64 = 1.0;
const DEFAULT_IMAGE_MIME: &str = "image/jpeg";
/// Larger photos are skipped rather than inlined.
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 4 * 1024 * 1024;

/// Token guess used when the response carries no usage metadata.
const FALLBACK_INPUT_TOKENS: u64 = 500;
const FALLBACK_OUTPUT_TOKENS: u64 = 100;

// ---------------------------------------------------------------------------
// Cost tables (USD per 1K tokens)
// ---------------------------------------------------------------------------

/// Returns (input_cost_per_1k, output_cost_per_1k) for known models.
fn model_costs(model: &str) -> (f64, f64) {
    match model {
        "gemini-2.5-pro" => (0.00125, 0.010),
        "gemini-2.5-flash" => (0.0003, 0.0025),
        "gemini-2.5-flash-lite" => (0.0001, 0.0004),
        "gemini-2.0-flash" => (0.0001, 0.0004),
        "gemini-1.5-pro" | "gemini-1.5-pro-latest" => (0.00125, 0.005),
        "gemini-1.5-flash" | "gemini-1.5-flash-latest" => (0.000075, 0.0003),
        "gemini-pro" => (0.0005, 0.0015),
        // 1.5 Flash pricing for anything unlisted
        _ => (0.000075, 0.0003),
    }
}

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    Inline { inline_data: InlineData },
}

#[derive(Debug, Clone, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    top_p: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    candidate_count: u32,
    seed: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct GeminiEstimator {
    http: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    max_images: usize,
    max_image_bytes: usize,
    enable_images: bool,
    generation: GenerationConfig,
}

impl GeminiEstimator {
    pub fn new(
        api_key: SecretString,
        settings: &EstimationRequestSettings,
        http: &HttpOptions,
    ) -> Result<Self, EstimatorError> {
        let generation = GenerationConfig {
            temperature: settings
                .temperature
                .map(|t| t.clamp(0.0, 2.0))
                .unwrap_or(DEFAULT_TEMPERATURE),
            top_p: settings
                .top_p
                .map(|p| p.clamp(0.0, 1.0))
                .unwrap_or(DEFAULT_TOP_P),
            top_k: settings.top_k.filter(|k| *k > 0),
            candidate_count: 1,
            seed: settings.random_seed,
        };

        debug!(model = %settings.model_name, ?generation, "Gemini estimator created");

        Ok(Self {
            http: http.client()?,
            api_key,
            base_url: http.base_url(ProviderId::Gemini).to_string(),
            model: settings.model_name.clone(),
            max_images: usize::from(settings.max_images),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            enable_images: settings.enable_images,
            generation,
        })
    }

    /// Cap on the size of a single downloaded photo.
    pub fn with_max_image_bytes(mut self, limit: usize) -> Self {
        self.max_image_bytes = limit;
        self
    }

    async fn request_estimate(&self, listing: &Listing) -> Result<Estimation> {
        let vision = ProviderId::Gemini.meta().supports_vision;
        let images = if vision && self.enable_images && !listing.images.is_empty() {
            self.load_images(&listing.images).await
        } else {
            Vec::new()
        };
        let with_images = !images.is_empty();

        let mut parts = vec![Part::Text {
            text: build_prompt(listing, with_images),
        }];
        parts.extend(images.into_iter().map(|inline_data| Part::Inline { inline_data }));

        let request = GenerateRequest {
            contents: vec![Content { parts }],
            generation_config: self.generation.clone(),
        };

        debug!(model = %self.model, with_images, "Requesting Gemini estimate");

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url,
            self.model,
            urlencoding::encode(self.api_key.expose_secret()),
        );

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| e.without_url())
            .context("Gemini request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let detail = api_error_message(&error_text).unwrap_or(error_text);
            anyhow::bail!("Gemini API HTTP {}: {detail}", status.as_u16());
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| e.without_url())
            .context("Failed to parse Gemini response")?;

        let text = extract_text(&body);
        if text.trim().is_empty() {
            anyhow::bail!("Empty AI response");
        }

        let parsed = parse_response(&text);
        debug!(strategy = ?parsed.strategy, fallback = parsed.strategy.is_fallback(), "Gemini response parsed");

        let cost = estimate_cost(&self.model, body.usage_metadata.as_ref());
        Ok(finish_estimation(parsed, ProviderId::Gemini, &self.model, Some(cost)))
    }

    /// Fetch up to `max_images` photos concurrently, dropping any that fail.
    async fn load_images(&self, urls: &[String]) -> Vec<InlineData> {
        let fetches = urls
            .iter()
            .take(self.max_images)
            .map(|url| self.fetch_image(url));

        let images: Vec<InlineData> = join_all(fetches).await.into_iter().flatten().collect();
        debug!(requested = urls.len().min(self.max_images), loaded = images.len(), "Listing images loaded");
        images
    }

    async fn fetch_image(&self, url: &str) -> Option<InlineData> {
        match self.try_fetch_image(url).await {
            Ok(image) => Some(image),
            Err(e) => {
                warn!(url, error = %format!("{e:#}"), "Skipping listing image");
                None
            }
        }
    }

    async fn try_fetch_image(&self, url: &str) -> Result<InlineData> {
        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .context("image request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("image HTTP {}", status.as_u16());
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(DEFAULT_IMAGE_MIME)
            .to_string();

        if let Some(len) = response.content_length() {
            if len > self.max_image_bytes as u64 {
                anyhow::bail!("image too large ({len} bytes, limit {})", self.max_image_bytes);
            }
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.context("failed to read image body")? {
            if bytes.len() + chunk.len() > self.max_image_bytes {
                anyhow::bail!("image exceeds {} bytes", self.max_image_bytes);
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(InlineData {
            mime_type,
            data: BASE64.encode(&bytes),
        })
    }
}

/// Pull the answer text out of `candidates[0].content.parts`.
///
/// A part whose text carries a `"value":` key wins (the model sometimes
/// adds a preamble part); otherwise all text parts are joined.
fn extract_text(response: &GenerateResponse) -> String {
    let Some(parts) = response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|c| &c.parts)
    else {
        return String::new();
    };

    for part in parts {
        let Some(text) = part.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
            continue;
        };
        let unfenced = strip_code_fences(text);
        if let Some(json) = extract_first_json_object(&unfenced) {
            if has_value_key(json) {
                return json.to_string();
            }
        }
        if has_value_key(&unfenced) {
            return unfenced;
        }
    }

    parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Dollar cost of one call from usage metadata, or a flagged guess.
fn estimate_cost(model: &str, usage: Option<&UsageMetadata>) -> Cost {
    let (input_per_1k, output_per_1k) = model_costs(model);

    let (input_tokens, output_tokens, is_estimated) = match usage {
        Some(u) => (u.prompt_token_count, u.candidates_token_count, false),
        None => (FALLBACK_INPUT_TOKENS, FALLBACK_OUTPUT_TOKENS, true),
    };

    let cost = (input_tokens as f64 / 1000.0) * input_per_1k
        + (output_tokens as f64 / 1000.0) * output_per_1k;

    let formatted = if is_estimated {
        format!("${cost:.6} (estimated)")
    } else {
        format!("${cost:.6}")
    };

    Cost {
        provider: ProviderId::Gemini,
        prompt_tokens: input_tokens,
        completion_tokens: output_tokens,
        total_tokens: input_tokens + output_tokens,
        formatted,
        cost: Some(cost),
        currency: Some("USD".to_string()),
        is_estimated,
    }
}

// ---------------------------------------------------------------------------
// PriceEstimator implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl PriceEstimator for GeminiEstimator {
    async fn estimate_value_with_cancel(
        &self,
        listing: &Listing,
        cancel: &CancellationToken,
    ) -> Estimation {
        run_guarded(
            ProviderId::Gemini,
            &self.model,
            cancel,
            self.request_estimate(listing),
        )
        .await
    }

    fn provider(&self) -> ProviderId {
        ProviderId::Gemini
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
