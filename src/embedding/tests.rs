use super::*;
use crate::config::EmbeddingConfig;
use crate::error::ApiError;
use std::time::Duration;

fn test_config() -> EmbeddingConfig {
    EmbeddingConfig {
        provider_url: "http://localhost:9999/v1".to_string(),
        api_key: "test-key".to_string(),
        model: "text-embedding-ada-002".to_string(),
        tag_model: "gpt-3.5-turbo".to_string(),
    }
}

#[test]
fn test_normalize_text_replaces_newlines() {
    assert_eq!(normalize_text("hello\nworld"), "hello world");
    assert_eq!(normalize_text("a\r\nb\rc"), "a b c");
    assert_eq!(normalize_text("no newlines"), "no newlines");
}

#[test]
fn test_parse_tag_list_normalizes() {
    let tags = parse_tag_list("Machine Learning, ai,  ,NLP", 5);
    assert_eq!(tags, vec!["machine learning", "ai", "nlp"]);
}

#[test]
fn test_parse_tag_list_truncates_to_max() {
    let tags = parse_tag_list("a, b, c, d, e, f", 3);
    assert_eq!(tags, vec!["a", "b", "c"]);
}

#[test]
fn test_parse_tag_list_empty_input() {
    assert!(parse_tag_list("", 5).is_empty());
    assert!(parse_tag_list(" , , ", 5).is_empty());
}

#[test]
fn test_classify_status_rate_limit_is_transient() {
    let err = OpenAiEmbedder::classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
    assert!(matches!(err, ApiError::EmbeddingUnavailable(_)));
    assert!(err.is_transient());
}

#[test]
fn test_classify_status_auth_failure_is_config_error() {
    let err = OpenAiEmbedder::classify_status(reqwest::StatusCode::UNAUTHORIZED, "bad key");
    assert!(matches!(err, ApiError::Config(_)));
    assert!(!err.is_transient());
}

#[test]
fn test_classify_status_server_error_is_transient() {
    let err = OpenAiEmbedder::classify_status(reqwest::StatusCode::BAD_GATEWAY, "upstream down");
    assert!(matches!(err, ApiError::EmbeddingUnavailable(_)));
    assert!(err.is_transient());
}

#[test]
fn test_classify_status_client_error_surfaces_immediately() {
    let err = OpenAiEmbedder::classify_status(reqwest::StatusCode::BAD_REQUEST, "bad input");
    assert!(matches!(err, ApiError::InvalidInput(_)));
    assert!(!err.is_transient());
}

#[test]
fn test_tag_prompt_bounds_content() {
    let content = "x".repeat(10_000);
    let prompt = OpenAiEmbedder::tag_prompt(&content, "", 5);

    // Only the first 2 KB of content lands in the prompt
    assert!(prompt.len() < 3_000);
    assert!(prompt.contains("5 tags"));
}

#[test]
fn test_tag_prompt_includes_context() {
    let prompt = OpenAiEmbedder::tag_prompt("body", "\n\nExisting metadata: Author: Alice", 3);
    assert!(prompt.contains("Author: Alice"));
}

#[test]
fn test_embedder_reports_configured_dimension() {
    let embedder = OpenAiEmbedder::new(&test_config(), 1536, Duration::from_millis(10));
    assert_eq!(embedder.dimension(), 1536);
}

#[tokio::test]
#[ignore = "requires embedding provider"]
async fn test_embed_against_live_provider() {
    let config = EmbeddingConfig {
        provider_url: std::env::var("EMBED_PROVIDER_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
        api_key: std::env::var("EMBED_PROVIDER_KEY").unwrap_or_default(),
        model: "text-embedding-ada-002".to_string(),
        tag_model: "gpt-3.5-turbo".to_string(),
    };

    let embedder = OpenAiEmbedder::new(&config, 1536, Duration::from_millis(350));
    let embedding = embedder.embed("hello world").await.unwrap();
    assert_eq!(embedding.vector.len(), 1536);
}
