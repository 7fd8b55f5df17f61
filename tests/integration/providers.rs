//! Provider wire contracts against a local mock server.

use secrecy::SecretString;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kleinvalue::llm::anthropic::AnthropicEstimator;
use kleinvalue::llm::gemini::GeminiEstimator;
use kleinvalue::llm::openai::OpenAiEstimator;
use kleinvalue::llm::PriceEstimator;
use kleinvalue::types::{EstimationRequestSettings, ProviderId};

use crate::mock_provider::*;

fn key() -> SecretString {
    SecretString::new(TEST_KEY.to_string())
}

#[tokio::test]
async fn test_gemini_inlines_images_and_skips_failures() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/img/1.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(vec![0x89, 0x50, 0x4e, 0x47]),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/2.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_gemini(
        &server,
        "gemini-2.5-flash",
        "```json\n{\"value\": 410, \"reasoning\": \"Photos show mint condition\", \"confidence\": 88}\n```",
    )
    .await;

    let listing = iphone_listing(vec![
        format!("{}/img/1.jpg", server.uri()),
        format!("{}/img/2.jpg", server.uri()),
    ]);
    let estimator = GeminiEstimator::new(key(), &settings(ProviderId::Gemini), &http_for(&server)).unwrap();
    let estimation = estimator.estimate_value(&listing).await;

    assert!(!estimation.error, "{:?}", estimation.error_message);
    assert_eq!(estimation.value, Some(410.0));
    assert_eq!(estimation.confidence, 88.0);

    let body = request_body(&server, "/v1beta/models/gemini-2.5-flash:generateContent").await;
    let parts = body["contents"][0]["parts"].as_array().unwrap();
    assert_eq!(parts.len(), 2, "one prompt part plus the one image that loaded");
    assert!(parts[0]["text"].as_str().unwrap().contains("IMAGES ARE PROVIDED"));
    assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
    assert_eq!(parts[1]["inline_data"]["data"], "iVBORw==");

    let config = &body["generationConfig"];
    assert_eq!(config["temperature"], 0.0);
    assert_eq!(config["topP"], 1.0);
    assert_eq!(config["candidateCount"], 1);
    assert_eq!(config["seed"], 1337);
    assert!(config.get("topK").is_none());
}

async fn mount_image(server: &MockServer, route: &str, bytes: Vec<u8>, expected: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(bytes),
        )
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_gemini_fetches_only_first_max_images() {
    let server = MockServer::start().await;
    mount_image(&server, "/img/1.jpg", vec![1, 2, 3], 1).await;
    mount_image(&server, "/img/2.jpg", vec![4, 5, 6], 1).await;
    mount_image(&server, "/img/3.jpg", vec![7, 8, 9], 0).await;
    mount_gemini(&server, "gemini-2.5-flash", "{\"value\": 400, \"confidence\": 80}").await;

    let settings = EstimationRequestSettings::builder(ProviderId::Gemini)
        .max_images(Some(2))
        .build();
    let listing = iphone_listing(
        (1..=3)
            .map(|n| format!("{}/img/{n}.jpg", server.uri()))
            .collect(),
    );
    let estimator = GeminiEstimator::new(key(), &settings, &http_for(&server)).unwrap();
    let estimation = estimator.estimate_value(&listing).await;
    assert!(!estimation.error, "{:?}", estimation.error_message);

    let body = request_body(&server, "/v1beta/models/gemini-2.5-flash:generateContent").await;
    let parts = body["contents"][0]["parts"].as_array().unwrap();
    assert_eq!(parts.len(), 3, "prompt plus the first two images");
    assert_eq!(parts[1]["inline_data"]["data"], "AQID");
    assert_eq!(parts[2]["inline_data"]["data"], "BAUG");
}

#[tokio::test]
async fn test_gemini_skips_oversized_image() {
    let server = MockServer::start().await;
    mount_image(&server, "/img/big.jpg", vec![0xff; 64], 1).await;
    mount_image(&server, "/img/small.jpg", vec![1, 2, 3], 1).await;
    mount_gemini(&server, "gemini-2.5-flash", "{\"value\": 400, \"confidence\": 80}").await;

    let listing = iphone_listing(vec![
        format!("{}/img/big.jpg", server.uri()),
        format!("{}/img/small.jpg", server.uri()),
    ]);
    let estimator = GeminiEstimator::new(key(), &settings(ProviderId::Gemini), &http_for(&server))
        .unwrap()
        .with_max_image_bytes(16);
    let estimation = estimator.estimate_value(&listing).await;
    assert!(!estimation.error, "{:?}", estimation.error_message);

    let body = request_body(&server, "/v1beta/models/gemini-2.5-flash:generateContent").await;
    let parts = body["contents"][0]["parts"].as_array().unwrap();
    assert_eq!(parts.len(), 2, "the oversized photo is left out");
    assert_eq!(parts[1]["inline_data"]["data"], "AQID");
}

#[tokio::test]
async fn test_gemini_images_disabled_lists_urls() {
    let server = MockServer::start().await;
    mount_gemini(&server, "gemini-2.5-pro", "VALUE: €250\nREASONING: fair").await;

    let settings = EstimationRequestSettings::builder(ProviderId::Gemini)
        .model_name("gemini-2.5-pro")
        .enable_images(Some(false))
        .top_k(Some(40))
        .build();
    let listing = iphone_listing(vec!["https://img.example.com/a.jpg".into()]);
    let estimator = GeminiEstimator::new(key(), &settings, &http_for(&server)).unwrap();
    let estimation = estimator.estimate_value(&listing).await;

    assert_eq!(estimation.value, Some(250.0));
    assert_eq!(estimation.confidence, 50.0);
    assert_eq!(estimation.reasoning, "fair");

    let body = request_body(&server, "/v1beta/models/gemini-2.5-pro:generateContent").await;
    let parts = body["contents"][0]["parts"].as_array().unwrap();
    assert_eq!(parts.len(), 1);
    assert!(parts[0]["text"]
        .as_str()
        .unwrap()
        .contains("- 1. https://img.example.com/a.jpg"));
    assert_eq!(body["generationConfig"]["topK"], 40);
}

#[tokio::test]
async fn test_openai_contract() {
    let server = MockServer::start().await;
    mount_openai(
        &server,
        "{\"value\": 320, \"reasoning\": \"Typical resale price\", \"confidence\": 75}",
    )
    .await;

    let estimator = OpenAiEstimator::new(key(), &settings(ProviderId::OpenAi), &http_for(&server)).unwrap();
    let listing = iphone_listing(vec!["https://img.example.com/a.jpg".into()]);
    let estimation = estimator.estimate_value(&listing).await;

    assert!(!estimation.error);
    assert_eq!(estimation.value, Some(320.0));
    assert_eq!(estimation.provider, ProviderId::OpenAi);
    assert_eq!(estimation.provider_name, "OpenAI GPT");
    assert_eq!(
        estimation.estimated_cost.as_ref().map(|c| c.formatted.as_str()),
        Some("~480 tokens (OpenAI)")
    );

    let body = request_body(&server, "/v1/chat/completions").await;
    assert_eq!(body["model"], "gpt-4.1-mini");
    assert_eq!(body["max_tokens"], 900);
    assert_eq!(body["temperature"], 0.2);
    assert_eq!(body["messages"][0]["role"], "system");
    let prompt = body["messages"][1]["content"].as_str().unwrap();
    assert!(prompt.contains("Listed Price: €300"));
    // Text-only model: photo URLs are listed, never promised as attachments.
    assert!(prompt.contains("- 1. https://img.example.com/a.jpg"));
    assert!(!prompt.contains("IMAGES ARE PROVIDED"));
}

#[tokio::test]
async fn test_anthropic_contract() {
    let server = MockServer::start().await;
    mount_anthropic(
        &server,
        "Here is my estimate:\n{\"value\": 299.999, \"reasoning\": \"Slight wear\", \"confidence\": 65}",
    )
    .await;

    let estimator =
        AnthropicEstimator::new(key(), &settings(ProviderId::Anthropic), &http_for(&server)).unwrap();
    let estimation = estimator.estimate_value(&iphone_listing(vec![])).await;

    assert!(!estimation.error);
    assert_eq!(estimation.value, Some(300.0));
    assert_eq!(estimation.confidence, 65.0);
    assert_eq!(estimation.model, "claude-3-5-sonnet-20241022");
    let cost = estimation.estimated_cost.unwrap();
    assert_eq!(cost.total_tokens, 590);
    assert_eq!(cost.formatted, "~590 tokens (Anthropic)");

    let body = request_body(&server, "/v1/messages").await;
    assert_eq!(body["max_tokens"], 900);
    assert!(body["system"].as_str().unwrap().starts_with("You are KleinValue Advisor"));
    assert_eq!(body["messages"][0]["role"], "user");
}

#[tokio::test]
async fn test_http_error_uses_api_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": { "message": "Incorrect API key provided", "type": "invalid_request_error" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let http = http_for(&server);
    let listing = iphone_listing(vec![]);

    let openai = OpenAiEstimator::new(key(), &settings(ProviderId::OpenAi), &http).unwrap();
    let e = openai.estimate_value(&listing).await;
    assert!(e.error);
    assert_eq!(e.value, None);
    assert_eq!(e.error_message.as_deref(), Some("Incorrect API key provided"));

    let anthropic = AnthropicEstimator::new(key(), &settings(ProviderId::Anthropic), &http).unwrap();
    let e = anthropic.estimate_value(&listing).await;
    assert!(e.error);
    assert_eq!(e.error_message.as_deref(), Some("Anthropic API HTTP 529"));
}

#[tokio::test]
async fn test_gemini_server_error_becomes_error_estimation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;

    let estimator = GeminiEstimator::new(key(), &settings(ProviderId::Gemini), &http_for(&server)).unwrap();
    let e = estimator.estimate_value(&iphone_listing(vec![])).await;

    assert!(e.error);
    assert_eq!(e.value, None);
    assert_eq!(e.confidence, 0.0);
    assert_eq!(e.provider, ProviderId::Gemini);
    let message = e.error_message.unwrap();
    assert!(message.starts_with("Gemini API HTTP 500"), "{message}");
    assert!(!message.contains(TEST_KEY));
}

#[tokio::test]
async fn test_empty_response_text_is_error() {
    let server = MockServer::start().await;
    mount_openai(&server, "   ").await;

    let estimator = OpenAiEstimator::new(key(), &settings(ProviderId::OpenAi), &http_for(&server)).unwrap();
    let e = estimator.estimate_value(&iphone_listing(vec![])).await;
    assert!(e.error);
    assert_eq!(e.error_message.as_deref(), Some("Empty AI response"));
}
