//! End-to-end: settings -> factory -> estimator -> history.

use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kleinvalue::config::AppConfig;
use kleinvalue::error::EstimatorError;
use kleinvalue::llm::catalog::fetch_models;
use kleinvalue::llm::factory::EstimatorFactory;
use kleinvalue::llm::HttpOptions;
use kleinvalue::settings::StaticSettings;
use kleinvalue::storage;
use kleinvalue::types::{EstimationRequestSettings, ProviderId};

use crate::mock_provider::*;

#[tokio::test]
async fn test_gemini_end_to_end() {
    let server = MockServer::start().await;
    mount_gemini(
        &server,
        "gemini-2.5-flash",
        "{\"value\": 380, \"reasoning\": \"iPhone 12 128GB in good condition sells for 350-400 EUR\", \"confidence\": 85}",
    )
    .await;

    let source = StaticSettings::new(EstimationRequestSettings::default()).with_key(ProviderId::Gemini, TEST_KEY);
    let factory = EstimatorFactory::new(http_for(&server));
    let estimator = factory.get_estimator(&source).await.unwrap();

    let listing = iphone_listing(vec![]);
    let estimation = estimator.estimate_value(&listing).await;

    assert!(!estimation.error);
    assert_eq!(estimation.value, Some(380.0));
    assert_eq!(estimation.confidence, 85.0);
    assert_eq!(estimation.model, "gemini-2.5-flash");
    assert_eq!(estimation.provider, ProviderId::Gemini);
    assert_eq!(estimation.provider_name, "Google Gemini");
    assert!(estimation.reasoning.contains("350-400"));
    assert!(listing.is_good_value(&estimation));

    let cost = estimation.estimated_cost.unwrap();
    assert!(!cost.is_estimated);
    assert_eq!(cost.prompt_tokens, 1200);
    assert_eq!(cost.currency.as_deref(), Some("USD"));
}

#[tokio::test]
async fn test_network_failure_is_isolated() {
    // Nothing listens on port 9; the connection is refused immediately.
    let http = HttpOptions::default()
        .with_timeout(Duration::from_secs(2))
        .with_base_url(ProviderId::OpenAi, "http://127.0.0.1:9");
    let source = StaticSettings::new(EstimationRequestSettings::builder(ProviderId::OpenAi).build())
        .with_key(ProviderId::OpenAi, TEST_KEY);

    let estimator = EstimatorFactory::new(http).get_estimator(&source).await.unwrap();
    let estimation = estimator.estimate_value(&iphone_listing(vec![])).await;

    assert!(estimation.error);
    assert_eq!(estimation.value, None);
    assert_eq!(estimation.confidence, 0.0);
    assert_eq!(estimation.model, "gpt-4.1-mini");
    assert_eq!(estimation.provider, ProviderId::OpenAi);
    assert!(estimation.error_message.is_some());
}

#[tokio::test]
async fn test_factory_reuses_instance_until_model_changes() {
    let factory = EstimatorFactory::default();
    let flash = StaticSettings::new(EstimationRequestSettings::default()).with_key(ProviderId::Gemini, TEST_KEY);

    let a = factory.get_estimator(&flash).await.unwrap();
    let b = factory.get_estimator(&flash).await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let pro = StaticSettings::new(
        EstimationRequestSettings::builder(ProviderId::Gemini)
            .model_name("gemini-2.5-pro")
            .build(),
    )
    .with_key(ProviderId::Gemini, TEST_KEY);
    let c = factory.get_estimator(&pro).await.unwrap();
    assert!(!Arc::ptr_eq(&b, &c));
}

#[tokio::test]
async fn test_factory_from_config_without_key() {
    let cfg = AppConfig::from_toml(
        "[estimator]\nprovider = \"anthropic\"\n\n[providers.anthropic]\napi_key_env = \"KV_IT_NEVER_SET\"\n",
    )
    .unwrap();

    let err = EstimatorFactory::new(cfg.http_options())
        .get_estimator(&cfg)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, EstimatorError::MissingApiKey(ProviderId::Anthropic)));
    assert!(err.needs_api_key());
}

#[tokio::test]
async fn test_cancelled_estimate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let source = StaticSettings::new(EstimationRequestSettings::builder(ProviderId::Anthropic).build())
        .with_key(ProviderId::Anthropic, TEST_KEY);
    let estimator = EstimatorFactory::new(http_for(&server))
        .get_estimator(&source)
        .await
        .unwrap();

    let cancel = tokio_util::sync::CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let estimation = estimator
        .estimate_value_with_cancel(&iphone_listing(vec![]), &cancel)
        .await;
    assert!(estimation.error);
    assert_eq!(estimation.error_message.as_deref(), Some("Estimation cancelled"));
}

#[tokio::test]
async fn test_estimate_saved_to_history() {
    let server = MockServer::start().await;
    mount_anthropic(&server, "{\"value\": 250, \"reasoning\": \"Below market\", \"confidence\": 70}").await;

    let source = StaticSettings::new(EstimationRequestSettings::builder(ProviderId::Anthropic).build())
        .with_key(ProviderId::Anthropic, TEST_KEY);
    let estimator = EstimatorFactory::new(http_for(&server))
        .get_estimator(&source)
        .await
        .unwrap();

    let listing = iphone_listing(vec![]);
    let estimation = estimator.estimate_value(&listing).await;

    let dir = tempfile::tempdir().unwrap();
    let history = dir.path().join("history.json");
    let item = storage::save_item(&history, &listing, &estimation).unwrap();
    assert!(!item.is_good_value);

    let items = storage::load_items(&history).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].estimation.value, Some(250.0));
    assert_eq!(items[0].listing.url, listing.url);
}

#[tokio::test]
async fn test_fetch_gemini_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1beta/models"))
        .and(query_param("pageSize", "200"))
        .and(query_param("key", TEST_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "models": [
                {
                    "name": "models/gemini-2.5-pro",
                    "displayName": "Gemini 2.5 Pro",
                    "supportedGenerationMethods": ["generateContent", "countTokens"]
                },
                {
                    "name": "models/gemini-2.5-flash",
                    "displayName": "Gemini 2.5 Flash",
                    "description": "Fast and versatile",
                    "supportedGenerationMethods": ["generateContent"]
                },
                {
                    "name": "models/imagen-3.0-generate-002",
                    "supportedGenerationMethods": ["predict"]
                },
                {
                    "name": "models/gemini-1.0-pro",
                    "supportedGenerationMethods": ["generateContent"]
                }
            ]
        })))
        .mount(&server)
        .await;

    let models = fetch_models(&http_for(&server), ProviderId::Gemini, &SecretString::new(TEST_KEY.into()))
        .await
        .unwrap();

    let ids: Vec<_> = models.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["gemini-2.5-flash", "gemini-2.5-pro"]);
    assert_eq!(models[0].description, "Fast and versatile");
    assert_eq!(models[1].description, "Multimodal generation");
}

#[tokio::test]
async fn test_fetch_models_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let err = fetch_models(&http_for(&server), ProviderId::OpenAi, &SecretString::new(TEST_KEY.into()))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "OpenAI API HTTP 403");
}
