//! HTTP completion client against a mock OpenAI-compatible server

use agent_memory::{
    config::CompressorConfig,
    context::{fallback_summary, ChatMessage, CompletionClient, CompletionError, ContextCompressor, OpenAiCompletionClient},
};
use secrecy::SecretString;

fn config_for(server: &mockito::ServerGuard) -> CompressorConfig {
    CompressorConfig {
        endpoint: format!("{}/v1/chat/completions", server.url()),
        api_key: Some(SecretString::new("sk-test".to_string())),
        timeout_secs: 5,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_completion_success() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"  The user asked about Rust.  "}}]}"#)
        .create_async()
        .await;

    let client = OpenAiCompletionClient::new(&config_for(&server)).unwrap();
    let reply = client.complete(&[ChatMessage::user("Summarize")], 100).await.unwrap();

    assert_eq!(reply, "The user asked about Rust.");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_completion_api_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(500)
        .with_body("upstream exploded")
        .create_async()
        .await;

    let client = OpenAiCompletionClient::new(&config_for(&server)).unwrap();
    let result = client.complete(&[ChatMessage::user("Summarize")], 100).await;
    assert!(matches!(result, Err(CompletionError::ApiError(_))));
}

#[tokio::test]
async fn test_completion_empty_choices() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices":[]}"#)
        .create_async()
        .await;

    let client = OpenAiCompletionClient::new(&config_for(&server)).unwrap();
    let result = client.complete(&[ChatMessage::user("Summarize")], 100).await;
    assert!(matches!(result, Err(CompletionError::EmptyResponse)));
}

#[tokio::test]
async fn test_compressor_uses_llm_summary() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"Discussed borrow checker errors."}}]}"#)
        .create_async()
        .await;

    let compressor = ContextCompressor::from_config(&config_for(&server));
    assert!(compressor.is_llm_backed());
    let summary = compressor.compress("USER: why does this not compile?", 200).await;
    assert_eq!(summary, "Discussed borrow checker errors.");
}

#[tokio::test]
async fn test_compressor_falls_back_on_server_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(503)
        .create_async()
        .await;

    let compressor = ContextCompressor::from_config(&config_for(&server));
    let text = "USER: explain lifetimes\nAGENT(coder): lifetimes annotate references";
    assert_eq!(compressor.compress(text, 200).await, fallback_summary(text));
}

#[test]
fn test_compressor_without_key_is_offline() {
    let compressor = ContextCompressor::from_config(&CompressorConfig::default());
    assert!(!compressor.is_llm_backed());
}
