//! Adapter for OpenAI-compatible chat completion endpoints (on-prem gateways).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::error::ProviderError;
use super::provider::{preview, read_capped, transport_error, ChatProvider};
use super::types::*;

const PROVIDER: &str = "openai_compat";

/// Adapter posting to a single chat completions URL.
///
/// The URL is used as given; internal gateways rarely follow the `/v1/chat/completions`
/// layout exactly.
#[derive(Debug, Clone)]
pub struct OpenAiCompatAdapter {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    native_json_mode: bool,
}

impl OpenAiCompatAdapter {
    /// Create with custom configuration.
    pub fn with_config(
        api_key: impl Into<String>,
        url: impl Into<String>,
        timeout: Duration,
        native_json_mode: bool,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key.into();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| ProviderError::config("Invalid API key format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| ProviderError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            timeout,
            native_json_mode,
        })
    }
}

// =============================================================================
// API TYPES
// =============================================================================

#[derive(Serialize)]
struct ChatApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a Message> for ApiMessage<'a> {
    fn from(m: &'a Message) -> Self {
        Self {
            role: m.role.as_str(),
            content: &m.content,
        }
    }
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatApiResponse {
    choices: Option<Vec<Choice>>,
    usage: Option<Usage>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
    code: Option<serde_json::Value>,
}

impl ApiError {
    fn code_string(&self) -> Option<String> {
        match &self.code {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        }
    }
}

// =============================================================================
// CHAT PROVIDER IMPL
// =============================================================================

#[async_trait]
impl ChatProvider for OpenAiCompatAdapter {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let start = Instant::now();

        let api_req = ChatApiRequest {
            model: &req.model,
            messages: req.messages.iter().map(ApiMessage::from).collect(),
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            response_format: if req.json_mode && self.native_json_mode {
                Some(ResponseFormat {
                    format_type: "json_object",
                })
            } else {
                None
            },
        };

        let response = self
            .client
            .post(&self.url)
            .json(&api_req)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let reply = read_capped(PROVIDER, response).await?;

        if !reply.status.is_success() {
            let status = reply.status.as_u16();
            if let Ok(parsed) = serde_json::from_str::<ChatApiResponse>(&reply.body) {
                if let Some(error) = parsed.error {
                    let ctx = match error.code_string() {
                        Some(code) => reply.context.clone().with_code(code),
                        None => reply.context.clone(),
                    };
                    let message = error.message.unwrap_or_default();
                    return Err(ProviderError::upstream_with_context(
                        PROVIDER,
                        format!("HTTP {status}: {message}"),
                        ctx,
                    ));
                }
            }

            return Err(ProviderError::upstream_with_context(
                PROVIDER,
                format!("HTTP {status}: {}", preview(&reply.body)),
                reply.context,
            ));
        }

        let parsed: ChatApiResponse = serde_json::from_str(&reply.body).map_err(|e| {
            ProviderError::upstream(PROVIDER, format!("Invalid response envelope: {e}"))
        })?;

        if let Some(error) = parsed.error {
            return Err(ProviderError::upstream_with_context(
                PROVIDER,
                error.message.unwrap_or_default(),
                reply.context,
            ));
        }

        let choice = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| ProviderError::upstream(PROVIDER, "No choices in response"))?;

        let content = choice
            .message
            .and_then(|m| m.content)
            .unwrap_or_default();

        let (input_tokens, output_tokens) = parsed
            .usage
            .map(|u| (u.prompt_tokens.unwrap_or(0), u.completion_tokens.unwrap_or(0)))
            .unwrap_or((0, 0));

        Ok(ChatResponse {
            content,
            input_tokens,
            output_tokens,
            latency: start.elapsed(),
            finish_reason: FinishReason::from(choice.finish_reason),
        })
    }
}
