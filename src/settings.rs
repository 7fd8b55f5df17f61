//! Settings seam between the estimator factory and wherever settings live.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::EstimatorError;
use crate::types::{EstimationRequestSettings, ProviderId};

/// Source of the current estimation settings and provider API keys.
///
/// Read on every `get_estimator` call, so implementations backed by a file
/// or store see edits without a restart.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn settings(&self) -> Result<EstimationRequestSettings, EstimatorError>;

    /// Stored key for `provider`, if any. Blank keys count as missing.
    async fn api_key(&self, provider: ProviderId) -> Result<Option<SecretString>, EstimatorError>;
}

/// Fixed in-memory settings, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings {
    pub settings: EstimationRequestSettings,
    pub keys: Vec<(ProviderId, SecretString)>,
}

impl StaticSettings {
    pub fn new(settings: EstimationRequestSettings) -> Self {
        Self {
            settings,
            keys: Vec::new(),
        }
    }

    pub fn with_key(mut self, provider: ProviderId, key: impl Into<String>) -> Self {
        self.keys.retain(|(p, _)| *p != provider);
        self.keys.push((provider, SecretString::new(key.into())));
        self
    }
}

#[async_trait]
impl SettingsSource for StaticSettings {
    async fn settings(&self) -> Result<EstimationRequestSettings, EstimatorError> {
        Ok(self.settings.clone())
    }

    async fn api_key(&self, provider: ProviderId) -> Result<Option<SecretString>, EstimatorError> {
        Ok(self
            .keys
            .iter()
            .find(|(p, _)| *p == provider)
            .map(|(_, k)| k.clone()))
    }
}
