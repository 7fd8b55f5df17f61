//! Static provider metadata.
//!
//! One entry per supported backend: display names, the default model,
//! vision support and a short list of suggested models for settings UIs.

use crate::types::ProviderId;

/// A model suggested in the settings UI before the live catalog is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuggestedModel {
    pub id: &'static str,
    pub label: &'static str,
}

/// Static description of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderMeta {
    pub id: ProviderId,
    pub name: &'static str,
    pub short_name: &'static str,
    pub default_model: &'static str,
    /// Whether listing photos are attached to the request.
    pub supports_vision: bool,
    pub docs_url: &'static str,
    pub placeholder_key: &'static str,
    pub tagline: &'static str,
    pub suggested_models: &'static [SuggestedModel],
}

pub const PROVIDERS: &[ProviderMeta] = &[
    ProviderMeta {
        id: ProviderId::Gemini,
        name: "Google Gemini",
        short_name: "Gemini",
        default_model: "gemini-2.5-flash",
        supports_vision: true,
        docs_url: "https://aistudio.google.com/api-keys",
        placeholder_key: "AIzaSy...",
        tagline: "Vision-first valuations via Google AI Studio.",
        suggested_models: &[
            SuggestedModel { id: "gemini-2.5-flash", label: "Gemini 2.5 Flash (Recommended)" },
            SuggestedModel { id: "gemini-2.5-pro", label: "Gemini 2.5 Pro" },
            SuggestedModel { id: "gemini-2.5-flash-lite", label: "Gemini 2.5 Flash Lite" },
            SuggestedModel { id: "gemini-1.5-pro-latest", label: "Gemini 1.5 Pro (Latest)" },
            SuggestedModel { id: "gemini-1.5-flash-latest", label: "Gemini 1.5 Flash (Latest)" },
        ],
    },
    ProviderMeta {
        id: ProviderId::OpenAi,
        name: "OpenAI GPT",
        short_name: "OpenAI",
        default_model: "gpt-4.1-mini",
        supports_vision: false,
        docs_url: "https://platform.openai.com/docs",
        placeholder_key: "sk-...",
        tagline: "GPT-4o family with rapid refresh cadence.",
        suggested_models: &[
            SuggestedModel { id: "gpt-4.1-mini", label: "GPT-4.1 Mini (Recommended)" },
            SuggestedModel { id: "gpt-4.1", label: "GPT-4.1" },
            SuggestedModel { id: "gpt-4o-mini", label: "GPT-4o Mini" },
            SuggestedModel { id: "gpt-4o", label: "GPT-4o" },
            SuggestedModel { id: "o4-mini", label: "o4 Mini" },
        ],
    },
    ProviderMeta {
        id: ProviderId::Anthropic,
        name: "Anthropic Claude",
        short_name: "Claude",
        default_model: "claude-3-5-sonnet-20241022",
        supports_vision: false,
        docs_url: "https://docs.anthropic.com",
        placeholder_key: "sk-ant-...",
        tagline: "Claude 3.5 family tuned for reasoning.",
        suggested_models: &[
            SuggestedModel { id: "claude-3-5-sonnet-20241022", label: "Claude 3.5 Sonnet (Latest)" },
            SuggestedModel { id: "claude-3-opus-20240229", label: "Claude 3 Opus" },
            SuggestedModel { id: "claude-3-haiku-20240307", label: "Claude 3 Haiku" },
        ],
    },
];

impl ProviderMeta {
    /// What to tell a user who has no key configured in `env_var`.
    pub fn key_hint(&self, env_var: &str) -> String {
        format!(
            "Set {env_var} to your {} API key (looks like {}). Get one at {}",
            self.short_name, self.placeholder_key, self.docs_url
        )
    }
}

impl ProviderId {
    /// Static metadata for this provider.
    pub fn meta(&self) -> &'static ProviderMeta {
        match self {
            ProviderId::Gemini => &PROVIDERS[0],
            ProviderId::OpenAi => &PROVIDERS[1],
            ProviderId::Anthropic => &PROVIDERS[2],
        }
    }
}
