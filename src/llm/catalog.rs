//! Live model catalog.
//!
//! Lists the models a key can use on each provider, filtered down to the
//! text-generation models that make sense for price estimation.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{api_error_message, HttpOptions};
use crate::types::ProviderId;

static PRETTY_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(gpt|claude|sonnet|opus|haiku|mini|flash|pro)\b").expect("valid regex")
});
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static GEMINI_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"gemini-([0-9]+(?:\.[0-9]+)?)").expect("valid regex"));
static LEGACY_REVISION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:001|002|003)(?:[^0-9]|$)").expect("valid regex"));
static OLD_CLAUDE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"claude-(1|2)").expect("valid regex"));

const OPENAI_PREFIXES: &[&str] = &["gpt-4.1", "gpt-4o", "o4", "o3"];
const OPENAI_EXCLUDED: &[&str] = &["image", "vision", "dall", "tts", "audio", "whisper", "embedding"];
const GEMINI_IMAGE_KEYWORDS: &[&str] = &["imagen", "image", "img", "photo"];
const GEMINI_LEGACY_PREFIXES: &[&str] = &[
    "gemini-pro",
    "gemini-pro-vision",
    "gemini-ultra",
    "gemini-ultra-vision",
    "gemini-nano",
];

/// One selectable model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelOption {
    pub id: String,
    pub label: String,
    pub description: String,
}

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiModel {
    #[serde(default)]
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiModelList {
    #[serde(default)]
    models: Vec<GeminiModel>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiModel {
    #[serde(default)]
    id: String,
    #[serde(default)]
    owned_by: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicModel {
    #[serde(default)]
    id: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DataList<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

/// Fetch and filter the models available to `api_key` on `provider`.
pub async fn fetch_models(
    http: &HttpOptions,
    provider: ProviderId,
    api_key: &SecretString,
) -> Result<Vec<ModelOption>> {
    let key = api_key.expose_secret().trim();
    if key.is_empty() {
        anyhow::bail!("Enter your {} API key first.", provider.meta().short_name);
    }

    let client = http.client()?;
    let base = http.base_url(provider);

    let mut models = match provider {
        ProviderId::Gemini => {
            let url = format!(
                "{base}/v1beta/models?pageSize=200&key={}",
                urlencoding::encode(key)
            );
            let list: GeminiModelList = get_json(client.get(url), "Gemini").await?;
            filter_gemini(list.models)
        }
        ProviderId::OpenAi => {
            let request = client.get(format!("{base}/v1/models")).bearer_auth(key);
            let list: DataList<OpenAiModel> = get_json(request, "OpenAI").await?;
            filter_openai(list.data)
        }
        ProviderId::Anthropic => {
            let request = client
                .get(format!("{base}/v1/models"))
                .header("x-api-key", key)
                .header("anthropic-version", "2023-06-01");
            let list: DataList<AnthropicModel> = get_json(request, "Anthropic").await?;
            filter_anthropic(list.data)
        }
    };

    models.sort_by(|a, b| a.label.to_lowercase().cmp(&b.label.to_lowercase()));
    info!(%provider, count = models.len(), "Fetched model catalog");
    Ok(models)
}

async fn get_json<T: DeserializeOwned>(request: RequestBuilder, label: &str) -> Result<T> {
    let response = request
        .send()
        .await
        .map_err(reqwest::Error::without_url)
        .with_context(|| format!("{label} model list request failed"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = api_error_message(&body)
            .unwrap_or_else(|| format!("{label} API HTTP {}", status.as_u16()));
        anyhow::bail!(message);
    }

    response
        .json()
        .await
        .map_err(reqwest::Error::without_url)
        .with_context(|| format!("Failed to parse {label} model list"))
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

fn filter_gemini(models: Vec<GeminiModel>) -> Vec<ModelOption> {
    models
        .into_iter()
        .filter(|m| m.name.starts_with("models/gemini"))
        .filter(|m| m.supported_generation_methods.iter().any(|g| g == "generateContent"))
        .filter(|m| !is_image_only_gemini(m))
        .filter(|m| !is_legacy_gemini(&m.name))
        .map(|m| {
            let id = m.name.replacen("models/", "", 1);
            let name = m.display_name.filter(|n| !n.is_empty()).unwrap_or_else(|| id.clone());
            let label = match m.version.filter(|v| !v.is_empty()) {
                Some(version) => format!("{name} ({version})"),
                None => name,
            };
            ModelOption {
                id,
                label: label.trim().to_string(),
                description: m
                    .description
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| "Multimodal generation".to_string()),
            }
        })
        .collect()
}

fn is_image_only_gemini(model: &GeminiModel) -> bool {
    let id = model.name.replacen("models/", "", 1).to_lowercase();
    GEMINI_IMAGE_KEYWORDS.iter().any(|k| id.contains(k))
        || model
            .supported_generation_methods
            .iter()
            .any(|g| g.to_lowercase().contains("image"))
}

fn is_legacy_gemini(name: &str) -> bool {
    let id = name.replacen("models/", "", 1).to_lowercase();
    if GEMINI_LEGACY_PREFIXES.iter().any(|p| id.starts_with(p)) {
        return true;
    }

    let old_version = GEMINI_VERSION
        .captures(&id)
        .and_then(|c| c[1].parse::<f64>().ok())
        .is_some_and(|v| v < 1.5);

    old_version || LEGACY_REVISION.is_match(&id)
}

fn filter_openai(models: Vec<OpenAiModel>) -> Vec<ModelOption> {
    models
        .into_iter()
        .filter(|m| OPENAI_PREFIXES.iter().any(|p| m.id.starts_with(p)))
        .filter(|m| !OPENAI_EXCLUDED.iter().any(|k| m.id.contains(k)))
        .map(|m| ModelOption {
            label: prettify_model_id(&m.id),
            description: m
                .owned_by
                .filter(|o| !o.is_empty())
                .map(|o| format!("Owned by {o}"))
                .unwrap_or_else(|| "OpenAI model".to_string()),
            id: m.id,
        })
        .collect()
}

fn filter_anthropic(models: Vec<AnthropicModel>) -> Vec<ModelOption> {
    models
        .into_iter()
        .filter(|m| m.id.starts_with("claude"))
        .filter(|m| !OLD_CLAUDE.is_match(&m.id))
        .map(|m| ModelOption {
            label: prettify_model_id(&m.id),
            description: m
                .display_name
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| "Anthropic model".to_string()),
            id: m.id,
        })
        .collect()
}

/// Turn `gpt-4o-mini` into `GPT 4o Mini`.
pub fn prettify_model_id(id: &str) -> String {
    let spaced = id.replace('-', " ");
    let capitalized = PRETTY_KEYWORD.replace_all(&spaced, |caps: &regex::Captures| {
        let word = &caps[1];
        let mut chars = word.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        }
    });
    let collapsed = WHITESPACE.replace_all(&capitalized, " ");
    let trimmed = collapsed.trim();

    match trimmed.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("gpt") => format!("GPT{}", &trimmed[3..]),
        _ => trimmed.to_string(),
    }
}
