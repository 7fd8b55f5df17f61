//! Setup errors surfaced by the estimator factory.
//!
//! Everything that can go wrong *during* an estimate is folded into an
//! error [`Estimation`](crate::types::Estimation) instead; these variants
//! cover the cases where no estimator can be produced at all and the
//! caller has to fix its configuration first.

use thiserror::Error;

use crate::types::ProviderId;

#[derive(Debug, Error)]
pub enum EstimatorError {
    /// No key stored for the selected provider. The UI should prompt for one.
    #[error("API key not configured for {0}. Set it in the config or environment.")]
    MissingApiKey(ProviderId),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// The settings store could not be read.
    #[error("Settings unavailable: {0}")]
    SettingsUnavailable(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl EstimatorError {
    /// Whether the remedy is asking the user for a key rather than retrying.
    pub fn needs_api_key(&self) -> bool {
        matches!(self, EstimatorError::MissingApiKey(_))
    }
}
