//! Estimator construction and reuse.
//!
//! `build_estimator` maps a provider id to its concrete estimator.
//! `EstimatorFactory` wraps it with a single-slot cache keyed on
//! provider and model, so repeated estimates with unchanged settings
//! share one instance (and one HTTP connection pool).

use std::fmt;
use std::sync::{Arc, Mutex};

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use super::anthropic::AnthropicEstimator;
use super::gemini::GeminiEstimator;
use super::openai::OpenAiEstimator;
use super::{HttpOptions, PriceEstimator};
use crate::error::EstimatorError;
use crate::settings::SettingsSource;
use crate::types::{EstimationRequestSettings, ProviderId};

/// Build a fresh estimator for `settings.provider`.
pub fn build_estimator(
    api_key: SecretString,
    settings: &EstimationRequestSettings,
    http: &HttpOptions,
) -> Result<Arc<dyn PriceEstimator>, EstimatorError> {
    let estimator: Arc<dyn PriceEstimator> = match settings.provider {
        ProviderId::Gemini => Arc::new(GeminiEstimator::new(api_key, settings, http)?),
        ProviderId::OpenAi => Arc::new(OpenAiEstimator::new(api_key, settings, http)?),
        ProviderId::Anthropic => Arc::new(AnthropicEstimator::new(api_key, settings, http)?),
    };
    Ok(estimator)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CacheKey {
    provider: ProviderId,
    model: String,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

/// Hands out estimators for the current settings, reusing the last one
/// while provider and model stay the same.
///
/// A changed API key alone does not rebuild the instance; call
/// [`EstimatorFactory::invalidate`] after saving a new key.
pub struct EstimatorFactory {
    http: HttpOptions,
    cache: Mutex<Option<(CacheKey, Arc<dyn PriceEstimator>)>>,
}

impl Default for EstimatorFactory {
    fn default() -> Self {
        Self::new(HttpOptions::default())
    }
}

impl EstimatorFactory {
    pub fn new(http: HttpOptions) -> Self {
        Self {
            http,
            cache: Mutex::new(None),
        }
    }

    pub fn http_options(&self) -> &HttpOptions {
        &self.http
    }

    /// Resolve settings and key from `source`, then return the cached or a
    /// newly built estimator.
    pub async fn get_estimator(
        &self,
        source: &dyn SettingsSource,
    ) -> Result<Arc<dyn PriceEstimator>, EstimatorError> {
        let settings = source.settings().await?;
        let provider = settings.provider;

        let api_key = source
            .api_key(provider)
            .await?
            .filter(|k| !k.expose_secret().trim().is_empty())
            .ok_or(EstimatorError::MissingApiKey(provider))?;

        let key = CacheKey {
            provider,
            model: settings.model_name.clone(),
        };

        if let Some(existing) = self.cached(&key) {
            debug!(cache_key = %key, "Reusing estimator");
            return Ok(existing);
        }

        let estimator = build_estimator(api_key, &settings, &self.http)?;
        info!(cache_key = %key, "Created estimator");

        let mut slot = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some((key, Arc::clone(&estimator)));
        Ok(estimator)
    }

    /// Drop the cached estimator so the next call rebuilds it.
    pub fn invalidate(&self) {
        let mut slot = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }

    fn cached(&self, key: &CacheKey) -> Option<Arc<dyn PriceEstimator>> {
        let slot = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_ref()
            .filter(|(k, _)| k == key)
            .map(|(_, estimator)| Arc::clone(estimator))
    }
}
