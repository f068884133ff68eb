//! Adapter for the Gemini `generateContent` REST API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::error::ProviderError;
use super::provider::{preview, read_capped, transport_error, ChatProvider};
use super::types::*;

const PROVIDER: &str = "gemini";

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini API adapter.
#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl GeminiAdapter {
    /// Create with custom configuration.
    pub fn with_config(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key.into();
        let base_url: String = base_url.into();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let key_value = HeaderValue::from_str(&api_key)
            .map_err(|_| ProviderError::config("Invalid API key format"))?;
        headers.insert("x-goog-api-key", key_value);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| ProviderError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn generate_url(&self, model: &str) -> String {
        let model = model.trim();
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

// =============================================================================
// API TYPES
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    usage_metadata: Option<UsageMetadata>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
    status: Option<String>,
}

// =============================================================================
// CHAT PROVIDER IMPL
// =============================================================================

#[async_trait]
impl ChatProvider for GeminiAdapter {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let start = Instant::now();

        let system_instruction = req.system_text().map(|text| Content {
            role: None,
            parts: vec![Part { text }],
        });

        let contents: Vec<Content> = req
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| Content {
                role: Some(match m.role {
                    Role::Assistant => "model",
                    _ => "user",
                }),
                parts: vec![Part {
                    text: m.content.clone(),
                }],
            })
            .collect();

        let api_req = GenerateRequest {
            system_instruction,
            contents,
            generation_config: GenerationConfig {
                temperature: req.temperature,
                max_output_tokens: req.max_tokens,
                response_mime_type: req.json_mode.then_some("application/json"),
            },
        };

        let response = self
            .client
            .post(self.generate_url(&req.model))
            .json(&api_req)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let reply = read_capped(PROVIDER, response).await?;

        if !reply.status.is_success() {
            let status = reply.status.as_u16();
            let parsed = serde_json::from_str::<GenerateResponse>(&reply.body)
                .ok()
                .and_then(|p| p.error);
            return Err(match parsed {
                Some(error) => {
                    let ctx = match error.status {
                        Some(code) => reply.context.clone().with_code(code),
                        None => reply.context.clone(),
                    };
                    ProviderError::upstream_with_context(
                        PROVIDER,
                        format!("HTTP {status}: {}", error.message.unwrap_or_default()),
                        ctx,
                    )
                }
                None => ProviderError::upstream_with_context(
                    PROVIDER,
                    format!("HTTP {status}: {}", preview(&reply.body)),
                    reply.context,
                ),
            });
        }

        let parsed: GenerateResponse = serde_json::from_str(&reply.body).map_err(|e| {
            ProviderError::upstream(PROVIDER, format!("Invalid response envelope: {e}"))
        })?;

        let candidate = match parsed.candidates.and_then(|c| c.into_iter().next()) {
            Some(c) => c,
            None => {
                let reason = parsed
                    .prompt_feedback
                    .and_then(|f| f.block_reason)
                    .map(|r| format!("prompt blocked: {r}"))
                    .unwrap_or_else(|| "No candidates in response".to_string());
                return Err(ProviderError::upstream_with_context(
                    PROVIDER,
                    reason,
                    reply.context,
                ));
            }
        };

        // Responses can be split across several text parts.
        let content: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        let (input_tokens, output_tokens) = parsed
            .usage_metadata
            .map(|u| {
                (
                    u.prompt_token_count.unwrap_or(0),
                    u.candidates_token_count.unwrap_or(0),
                )
            })
            .unwrap_or((0, 0));

        Ok(ChatResponse {
            content,
            input_tokens,
            output_tokens,
            latency: start.elapsed(),
            finish_reason: FinishReason::from(candidate.finish_reason),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_url_strips_models_prefix() {
        let adapter =
            GeminiAdapter::with_config("k", "http://localhost:1/v1beta/", Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            adapter.generate_url("models/gemini-2.5-flash"),
            "http://localhost:1/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(
            adapter.generate_url("gemini-2.0-flash"),
            "http://localhost:1/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }
}
