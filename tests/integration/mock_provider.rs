//! Mock LLM backends for integration testing.
//!
//! Wraps a `wiremock::MockServer` per test and builds provider-shaped
//! response bodies, so estimators run their real HTTP path against a
//! local server.

use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kleinvalue::llm::HttpOptions;
use kleinvalue::types::{EstimationRequestSettings, Listing, ProviderId};

pub const TEST_KEY: &str = "test-key-123";

/// A listing like the ones scraped from kleinanzeigen item pages.
pub fn iphone_listing(images: Vec<String>) -> Listing {
    serde_json::from_value(json!({
        "title": "iPhone 12",
        "description": "Good condition, 128GB",
        "location": "10115 Berlin",
        "price": 300.0,
        "images": images,
        "url": "https://www.kleinanzeigen.de/s-anzeige/iphone-12/2895551234"
    }))
    .unwrap()
}

/// Route every provider at `server`.
pub fn http_for(server: &MockServer) -> HttpOptions {
    ProviderId::ALL
        .iter()
        .fold(HttpOptions::default().with_timeout(Duration::from_secs(5)), |opts, p| {
            opts.with_base_url(*p, server.uri())
        })
}

pub fn settings(provider: ProviderId) -> EstimationRequestSettings {
    EstimationRequestSettings::builder(provider).build()
}

pub fn gemini_body(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }],
        "usageMetadata": {
            "promptTokenCount": 1200,
            "candidatesTokenCount": 80,
            "totalTokenCount": 1280
        }
    })
}

pub fn openai_body(text: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": text },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 420, "completion_tokens": 60, "total_tokens": 480 }
    })
}

pub fn anthropic_body(text: &str) -> Value {
    json!({
        "id": "msg_1",
        "type": "message",
        "role": "assistant",
        "content": [{ "type": "text", "text": text }],
        "stop_reason": "end_turn",
        "usage": { "input_tokens": 500, "output_tokens": 90 }
    })
}

/// Mount a Gemini `generateContent` endpoint answering with `text`.
pub async fn mount_gemini(server: &MockServer, model: &str, text: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/v1beta/models/{model}:generateContent")))
        .and(query_param("key", TEST_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body(text)))
        .expect(1)
        .mount(server)
        .await;
}

pub async fn mount_openai(server: &MockServer, text: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", format!("Bearer {TEST_KEY}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_body(text)))
        .expect(1)
        .mount(server)
        .await;
}

pub async fn mount_anthropic(server: &MockServer, text: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", TEST_KEY))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_body(text)))
        .expect(1)
        .mount(server)
        .await;
}

/// JSON body of the first request the server saw on `route`.
pub async fn request_body(server: &MockServer, route: &str) -> Value {
    let requests = server.received_requests().await.unwrap_or_default();
    let request = requests
        .iter()
        .find(|r| r.url.path() == route)
        .unwrap_or_else(|| panic!("no request to {route}"));
    serde_json::from_slice(&request.body).unwrap()
}
