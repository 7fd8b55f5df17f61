//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `kleinvalue.toml` and deserializes into strongly-typed structs.
//! Every section is optional. Secrets (API keys) are referenced by env-var
//! name in the config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::EstimatorError;
use crate::llm::{HttpOptions, DEFAULT_TIMEOUT_SECS};
use crate::settings::SettingsSource;
use crate::types::{EstimationRequestSettings, ProviderId};

pub const DEFAULT_CONFIG_PATH: &str = "kleinvalue.toml";
pub const DEFAULT_HISTORY_PATH: &str = "kleinvalue_history.json";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub estimator: EstimatorConfig,
    pub providers: ProvidersConfig,
    pub http: HttpConfig,
    pub storage: StorageConfig,
}

/// Raw estimation settings as written by the user; clamped on use.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EstimatorConfig {
    pub provider: String,
    pub model_name: Option<String>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<i64>,
    pub random_seed: Option<i64>,
    pub max_images: Option<i64>,
    pub enable_images: Option<bool>,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            provider: ProviderId::default().to_string(),
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

#[derive(Debug, Deserialize, Clone)]
pub struct ProvidersConfig {
    #[serde(default = "ProviderConfig::gemini")]
    pub gemini: ProviderConfig,
    #[serde(default = "ProviderConfig::openai")]
    pub openai: ProviderConfig,
    #[serde(default = "ProviderConfig::anthropic")]
    pub anthropic: ProviderConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            gemini: ProviderConfig::gemini(),
            openai: ProviderConfig::openai(),
            anthropic: ProviderConfig::anthropic(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub api_key_env: String,
    /// Override for the provider host, e.g. a corporate proxy.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl ProviderConfig {
    fn with_env(env: &str) -> Self {
        Self {
            api_key_env: env.to_string(),
            base_url: None,
        }
    }

    fn gemini() -> Self {
        Self::with_env("GEMINI_API_KEY")
    }

    fn openai() -> Self {
        Self::with_env("OPENAI_API_KEY")
    }

    fn anthropic() -> Self {
        Self::with_env("ANTHROPIC_API_KEY")
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub history_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            history_path: PathBuf::from(DEFAULT_HISTORY_PATH),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    pub fn provider(&self, provider: ProviderId) -> &ProviderConfig {
        match provider {
            ProviderId::Gemini => &self.providers.gemini,
            ProviderId::OpenAi => &self.providers.openai,
            ProviderId::Anthropic => &self.providers.anthropic,
        }
    }

    /// Validated request settings for the configured provider.
    pub fn request_settings(&self) -> Result<EstimationRequestSettings, EstimatorError> {
        let provider: ProviderId = self.estimator.provider.parse()?;
        let mut builder = EstimationRequestSettings::builder(provider)
            .temperature(self.estimator.temperature)
            .top_p(self.estimator.top_p)
            .top_k(self.estimator.top_k)
            .random_seed(self.estimator.random_seed)
            .max_images(self.estimator.max_images)
            .enable_images(self.estimator.enable_images);
        if let Some(model) = &self.estimator.model_name {
            builder = builder.model_name(model.clone());
        }
        Ok(builder.build())
    }

    /// Resolve the API key for `provider`; unset or blank is `None`.
    pub fn api_key_for(&self, provider: ProviderId) -> Option<SecretString> {
        Self::resolve_env(&self.provider(provider).api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .map(SecretString::new)
    }

    pub fn http_options(&self) -> HttpOptions {
        let mut options =
            HttpOptions::default().with_timeout(Duration::from_secs(self.http.timeout_secs.max(1)));
        for provider in ProviderId::ALL {
            if let Some(url) = self.provider(*provider).base_url.as_deref() {
                options = options.with_base_url(*provider, url);
            }
        }
        options
    }
}

/// A config snapshot: settings never change after loading.
#[async_trait]
impl SettingsSource for AppConfig {
    async fn settings(&self) -> Result<EstimationRequestSettings, EstimatorError> {
        self.request_settings()
    }

    async fn api_key(&self, provider: ProviderId) -> Result<Option<SecretString>, EstimatorError> {
        Ok(self.api_key_for(provider))
    }
}

/// A config file read afresh on every call, so edits apply to the next estimate.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<AppConfig, EstimatorError> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            EstimatorError::SettingsUnavailable(format!("{}: {e}", self.path.display()))
        })?;
        AppConfig::from_toml(&contents).map_err(|e| {
            EstimatorError::SettingsUnavailable(format!("{}: {e:#}", self.path.display()))
        })
    }
}

#[async_trait]
impl SettingsSource for ConfigFile {
    async fn settings(&self) -> Result<EstimationRequestSettings, EstimatorError> {
        self.read().await?.request_settings()
    }

    async fn api_key(&self, provider: ProviderId) -> Result<Option<SecretString>, EstimatorError> {
        Ok(self.read().await?.api_key_for(provider))
    }
}
