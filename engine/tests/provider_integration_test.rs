//! Integration tests for the Messages-API provider client
//!
//! Validates request shape, response parsing and error mapping against a
//! mock server.

use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use bindery_engine::llm::anthropic::AnthropicProvider;
use bindery_engine::llm::{
    CompletionRequest, ContentBlock, ConversationMessage, LLMError, LLMProvider, ReasoningConfig,
    StopReason,
};
use bindery_engine::tools::definitions;

fn request<'a>(
    messages: &'a [ConversationMessage],
    tools: &'a [bindery_engine::llm::ToolDefinition],
    reasoning: Option<ReasoningConfig>,
) -> CompletionRequest<'a> {
    CompletionRequest {
        model: "claude-sonnet-4-6",
        system_prompt: "You are a test.",
        tools,
        messages,
        max_output_tokens: 16000,
        reasoning,
    }
}

#[tokio::test]
async fn test_tool_use_response_is_parsed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "test-key"))
        .and(body_partial_json(json!({
            "model": "claude-sonnet-4-6",
            "max_tokens": 16000,
            "system": "You are a test.",
            "messages": [{"role": "user", "content": "fetch 6AL5"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "thinking", "thinking": "need the file", "signature": "sig-1"},
                {"type": "text", "text": "Fetching it now."},
                {"type": "tool_use", "id": "toolu_1", "name": "fetch_structure", "input": {"pdb_id": "6AL5"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 1200, "output_tokens": 80}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new(server.uri(), "test-key");
    let messages = vec![ConversationMessage::user("fetch 6AL5")];
    let tools = definitions::all();

    let response = provider
        .complete(request(&messages, &tools, None))
        .await
        .unwrap();

    assert_eq!(response.stop_reason, StopReason::ToolUse);
    assert_eq!(response.usage.total(), 1280);
    assert_eq!(response.content.len(), 3);
    assert_eq!(
        response.content[0],
        ContentBlock::InternalReasoning {
            text: "need the file".to_string(),
            opaque_signature: "sig-1".to_string(),
        }
    );
    assert_eq!(response.content[1], ContentBlock::text("Fetching it now."));
    assert!(matches!(
        &response.content[2],
        ContentBlock::ToolCall { name, input, .. }
            if name == "fetch_structure" && input["pdb_id"] == "6AL5"
    ));
}

#[tokio::test]
async fn test_reasoning_budget_is_sent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(body_partial_json(json!({
            "thinking": {"type": "enabled", "budget_tokens": 10000}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "Deep answer."}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 3}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new(server.uri(), "test-key");
    let messages = vec![ConversationMessage::user("explain the binding mode")];

    let response = provider
        .complete(request(&messages, &[], Some(ReasoningConfig::enabled(10_000))))
        .await
        .unwrap();

    assert_eq!(response.stop_reason, StopReason::EndTurn);
    assert_eq!(response.content, vec![ContentBlock::text("Deep answer.")]);
}

#[tokio::test]
async fn test_http_errors_are_mapped() {
    let cases = [
        (401, "auth"),
        (429, "rate"),
        (529, "unavailable"),
        (400, "invalid"),
    ];

    for (status, kind) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new(server.uri(), "test-key");
        let messages = vec![ConversationMessage::user("hello")];
        let err = provider
            .complete(request(&messages, &[], None))
            .await
            .unwrap_err();

        let matched = match kind {
            "auth" => matches!(err, LLMError::AuthenticationFailed(_)),
            "rate" => matches!(err, LLMError::RateLimitExceeded),
            "unavailable" => matches!(err, LLMError::ProviderUnavailable(_)),
            _ => matches!(err, LLMError::InvalidRequest(_)),
        };
        assert!(matched, "HTTP {} mapped to {:?}", status, err);
    }
}

#[tokio::test]
async fn test_malformed_body_is_a_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new(server.uri(), "test-key");
    let messages = vec![ConversationMessage::user("hello")];
    let err = provider
        .complete(request(&messages, &[], None))
        .await
        .unwrap_err();

    assert!(matches!(err, LLMError::ParseError(_)));
}

#[tokio::test]
async fn test_unreachable_server_is_a_network_error() {
    let provider = AnthropicProvider::new("http://127.0.0.1:1", "test-key");
    let messages = vec![ConversationMessage::user("hello")];
    let err = provider
        .complete(request(&messages, &[], None))
        .await
        .unwrap_err();

    assert!(matches!(err, LLMError::NetworkError(_)));
}
