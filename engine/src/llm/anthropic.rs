use super::{
    CompletionRequest, CompletionResponse, ContentBlock, LLMError, LLMProvider, StopReason, Usage,
};
use crate::config::LLMConfig;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<serde_json::Value>,
    stop_reason: Option<StopReason>,
    #[serde(default)]
    usage: Usage,
}

impl AnthropicProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Build from config, reading the key from the configured environment variable
    pub fn from_config(config: &LLMConfig) -> super::Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            LLMError::AuthenticationFailed(format!(
                "environment variable {} is not set",
                config.api_key_env
            ))
        })?;
        Ok(Self::new(config.base_url.clone(), api_key))
    }

    fn build_payload(request: &CompletionRequest<'_>) -> serde_json::Value {
        let mut payload = json!({
            "model": request.model,
            "max_tokens": request.max_output_tokens,
            "system": request.system_prompt,
            "tools": request.tools,
            "messages": request.messages,
        });
        if let Some(reasoning) = request.reasoning {
            payload["thinking"] = json!(reasoning);
        }
        payload
    }
}

/// Convert raw response blocks, skipping block types the engine does not model
///
/// `redacted_thinking` is among the skipped types. A tool-use continuation
/// sent with thinking enabled must echo those blocks, so tool-dispatch
/// iterations must never request reasoning (see `router::select_model`).
fn parse_content(raw: Vec<serde_json::Value>) -> Vec<ContentBlock> {
    raw.into_iter()
        .filter_map(|value| {
            let kind = value
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or("?")
                .to_string();
            match serde_json::from_value::<ContentBlock>(value) {
                Ok(block) => Some(block),
                Err(e) => {
                    warn!("Skipping unsupported content block '{}': {}", kind, e);
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn check_health(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn complete(&self, request: CompletionRequest<'_>) -> super::Result<CompletionResponse> {
        let url = format!("{}/messages", self.base_url.trim_end_matches('/'));
        let payload = Self::build_payload(&request);

        debug!(
            "Calling {} model={} messages={}",
            url,
            request.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| LLMError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return Err(match status.as_u16() {
                401 | 403 => LLMError::AuthenticationFailed(text),
                429 => LLMError::RateLimitExceeded,
                code if code >= 500 => {
                    LLMError::ProviderUnavailable(format!("HTTP {}: {}", code, text))
                }
                _ => LLMError::InvalidRequest(text),
            });
        }

        let data: MessagesResponse = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        Ok(CompletionResponse {
            content: parse_content(data.content),
            stop_reason: data.stop_reason.unwrap_or(StopReason::Other),
            usage: data.usage,
        })
    }
}
