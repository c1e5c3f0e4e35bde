//! Wire-format tests for the Gemini HTTP clients against a stub server:
//! request shape, response parsing, retry behavior, error classification.

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use mindwell::config::{EmbeddingConfig, LlmConfig};
use mindwell::embedding::{Embedder, GeminiEmbedder};
use mindwell::llm::{ChatModel, ChatRequest, GeminiChat};
use mindwell::models::HistoryPair;

fn chat_config(base_url: &str, key_env: &str) -> LlmConfig {
    std::env::set_var(key_env, "test-key");
    LlmConfig {
        base_url: base_url.to_string(),
        api_key_env: key_env.to_string(),
        ..LlmConfig::default()
    }
}

fn embed_config(base_url: &str, key_env: &str, max_retries: u32) -> EmbeddingConfig {
    std::env::set_var(key_env, "test-key");
    EmbeddingConfig {
        provider: "gemini".to_string(),
        model: "text-embedding-004".to_string(),
        url: Some(base_url.to_string()),
        api_key_env: key_env.to_string(),
        max_retries,
        ..EmbeddingConfig::default()
    }
}

#[tokio::test]
async fn chat_request_carries_system_history_and_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:generateContent"))
        .and(query_param("key", "test-key"))
        .and(body_partial_json(json!({
            "systemInstruction": { "parts": [{ "text": "be supportive" }] },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Take a breath." }] }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let chat = GeminiChat::new(&chat_config(&server.uri(), "GEMINI_WIRE_TEST_KEY_1")).unwrap();
    let reply = chat
        .generate(&ChatRequest {
            system: "be supportive".to_string(),
            history: vec![HistoryPair {
                user: "hi".to_string(),
                assistant: "hello".to_string(),
            }],
            message: "I feel stressed".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(reply, "Take a breath.");

    // History pairs become alternating user/model turns ending with the new
    // message.
    let requests: Vec<Request> = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let contents = body["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[0]["role"], "user");
    assert_eq!(contents[1]["role"], "model");
    assert_eq!(contents[2]["parts"][0]["text"], "I feel stressed");
}

#[tokio::test]
async fn chat_server_error_surfaces_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(1)
        .mount(&server)
        .await;

    let chat = GeminiChat::new(&chat_config(&server.uri(), "GEMINI_WIRE_TEST_KEY_2")).unwrap();
    let err = chat
        .generate(&ChatRequest {
            system: String::new(),
            history: Vec::new(),
            message: "hello".to_string(),
        })
        .await
        .err()
        .unwrap();

    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn embedder_parses_batch_response_in_order() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/text-embedding-004:batchEmbedContents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [
                { "values": [0.1, 0.2, 0.3] },
                { "values": [0.4, 0.5, 0.6] }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let embedder =
        GeminiEmbedder::new(&embed_config(&server.uri(), "GEMINI_WIRE_TEST_KEY_3", 0)).unwrap();
    let vectors = embedder
        .embed(&["first".to_string(), "second".to_string()])
        .await
        .unwrap();

    assert_eq!(vectors.len(), 2);
    assert!((vectors[0][0] - 0.1).abs() < 1e-6);
    assert!((vectors[1][2] - 0.6).abs() < 1e-6);
}

#[tokio::test]
async fn embedder_retries_after_rate_limit() {
    let server = MockServer::start().await;

    // First call is rate limited, second succeeds.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [{ "values": [1.0, 2.0] }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let embedder =
        GeminiEmbedder::new(&embed_config(&server.uri(), "GEMINI_WIRE_TEST_KEY_4", 2)).unwrap();
    let vectors = embedder.embed(&["text".to_string()]).await.unwrap();
    assert_eq!(vectors.len(), 1);
}

#[tokio::test]
async fn embedder_client_error_fails_immediately() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(1)
        .mount(&server)
        .await;

    let embedder =
        GeminiEmbedder::new(&embed_config(&server.uri(), "GEMINI_WIRE_TEST_KEY_5", 3)).unwrap();
    let err = embedder.embed(&["text".to_string()]).await.err().unwrap();
    assert!(err.to_string().contains("400"));
}

#[test]
fn missing_api_key_is_a_startup_error() {
    let config = LlmConfig {
        api_key_env: "GEMINI_WIRE_TEST_KEY_UNSET".to_string(),
        ..LlmConfig::default()
    };
    assert!(GeminiChat::new(&config).is_err());
}
