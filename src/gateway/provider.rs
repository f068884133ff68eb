//! Provider adapter capability shared by every upstream API shape.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;

use super::error::{ErrorContext, ProviderError};
use super::types::{ChatRequest, ChatResponse};

/// Maximum allowed response body length (1MB).
pub(crate) const MAX_RESPONSE_LEN: usize = 1_024 * 1_024;

/// Trait for chat completion providers.
///
/// An adapter performs exactly one HTTP exchange per call and returns the raw text the
/// model produced. JSON parsing and fallback are the gateway's job.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Short provider name for logs and usage records.
    fn name(&self) -> &'static str;

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;
}

/// Raw upstream reply, read under the size cap.
pub(crate) struct RawReply {
    pub status: StatusCode,
    pub body: String,
    pub context: ErrorContext,
}

/// Extract request ID from response headers.
fn extract_request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Stream the body to enforce the size limit.
pub(crate) async fn read_capped(
    provider: &'static str,
    mut response: reqwest::Response,
) -> Result<RawReply, ProviderError> {
    let status = response.status();
    let request_id = extract_request_id(response.headers());

    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let new_len = bytes.len() + chunk.len();
        if new_len > MAX_RESPONSE_LEN {
            return Err(ProviderError::upstream(
                provider,
                format!("Response too large: {new_len} bytes"),
            ));
        }
        bytes.extend_from_slice(&chunk);
    }

    let ctx = ErrorContext::new().with_status(status.as_u16());
    let context = match request_id {
        Some(id) => ctx.with_request_id(id),
        None => ctx,
    };

    Ok(RawReply {
        status,
        body: String::from_utf8_lossy(&bytes).to_string(),
        context,
    })
}

/// Map a reqwest send error, separating timeouts from other transport failures.
pub(crate) fn transport_error(err: reqwest::Error, timeout: std::time::Duration) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::Http(err)
    }
}

/// Short body excerpt for error messages.
pub(crate) fn preview(body: &str) -> String {
    const LIMIT: usize = 500;
    let trimmed = body.trim();
    if trimmed.chars().count() <= LIMIT {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(LIMIT).collect();
        format!("{head}…")
    }
}
