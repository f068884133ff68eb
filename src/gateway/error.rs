//! Error types for the completion gateway.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Failure class surfaced to stage handlers and HTTP callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    /// Missing or invalid credentials/endpoint. No network call was made.
    ConfigError,
    /// Transport failure or timeout.
    ConnectionError,
    /// Upstream answered with a non-2xx status or an unusable envelope.
    UpstreamError,
    /// Completion text was not JSON, or lacked the stage's required shape.
    ParseError,
}

impl FailureKind {
    /// Short code for logs and usage records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "config_error",
            Self::ConnectionError => "connection_error",
            Self::UpstreamError => "upstream_error",
            Self::ParseError => "parse_error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Additional context from provider errors for debugging.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// HTTP status code from the provider.
    pub http_status: Option<u16>,
    /// Provider-specific error code (e.g. "RESOURCE_EXHAUSTED").
    pub provider_code: Option<String>,
    /// Request ID from provider (x-request-id header).
    pub request_id: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// Errors a provider adapter can return for a single attempt.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Configuration error (missing API key, malformed header value, etc.).
    #[error("configuration error: {0}")]
    Config(String),

    /// Request timed out.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// HTTP/network error before a status line was received.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream returned an error status or a body we cannot unwrap.
    #[error("{provider} error: {message}")]
    Upstream {
        provider: &'static str,
        message: String,
        context: Option<ErrorContext>,
    },
}

impl ProviderError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn upstream(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            provider,
            message: message.into(),
            context: None,
        }
    }

    pub fn upstream_with_context(
        provider: &'static str,
        message: impl Into<String>,
        context: ErrorContext,
    ) -> Self {
        Self::Upstream {
            provider,
            message: message.into(),
            context: Some(context),
        }
    }

    /// Classify into the gateway-level failure taxonomy.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Config(_) => FailureKind::ConfigError,
            Self::Timeout(_) => FailureKind::ConnectionError,
            Self::Http(e) if e.is_status() => FailureKind::UpstreamError,
            Self::Http(e) if e.is_decode() => FailureKind::UpstreamError,
            Self::Http(_) => FailureKind::ConnectionError,
            Self::Upstream { .. } => FailureKind::UpstreamError,
        }
    }

    /// Get a short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Timeout(_) => "timeout",
            Self::Http(_) => "http_error",
            Self::Upstream { .. } => "upstream_error",
        }
    }

    /// Get the error context if available.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::Upstream { context, .. } => context.as_ref(),
            _ => None,
        }
    }

    /// Get the request ID if available.
    pub fn request_id(&self) -> Option<&str> {
        self.context().and_then(|c| c.request_id.as_deref())
    }
}

/// One failed attempt against a single fallback candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub model: String,
    pub kind: FailureKind,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl AttemptRecord {
    pub fn new(model: impl Into<String>, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            kind,
            detail: detail.into(),
            http_status: None,
            provider_code: None,
            request_id: None,
        }
    }

    /// Copy provider diagnostics onto the record.
    pub fn context(mut self, ctx: Option<&ErrorContext>) -> Self {
        if let Some(ctx) = ctx {
            self.http_status = ctx.http_status;
            self.provider_code = ctx.provider_code.clone();
            self.request_id = ctx.request_id.clone();
        }
        self
    }
}

/// Terminal gateway failure.
///
/// `kind` and `detail` describe the last attempt. `attempts` lists every failed attempt in
/// the order it was made; it is empty for failures raised before any attempt.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {detail}")]
pub struct CompletionFailure {
    pub kind: FailureKind,
    pub detail: String,
    pub attempts: Vec<AttemptRecord>,
}

impl CompletionFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            attempts: Vec::new(),
        }
    }

    pub fn config(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::ConfigError, detail)
    }

    pub fn parse(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::ParseError, detail)
    }

    /// Build the terminal failure from the attempt history: last error wins.
    pub(crate) fn from_attempts(attempts: Vec<AttemptRecord>) -> Self {
        match attempts.last() {
            Some(last) => Self {
                kind: last.kind,
                detail: last.detail.clone(),
                attempts,
            },
            None => Self::config("no model candidates configured"),
        }
    }

    /// Number of attempts that reached a provider.
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_attempt_wins() {
        let attempts = vec![
            AttemptRecord::new("a", FailureKind::ConnectionError, "timeout after 1s"),
            AttemptRecord::new("b", FailureKind::ParseError, "not json"),
        ];
        let failure = CompletionFailure::from_attempts(attempts);
        assert_eq!(failure.kind, FailureKind::ParseError);
        assert_eq!(failure.detail, "not json");
        assert_eq!(failure.attempt_count(), 2);
    }

    #[test]
    fn attempt_record_carries_provider_context() {
        let err = ProviderError::upstream_with_context(
            "openai_compat",
            "HTTP 429: slow down",
            ErrorContext::new()
                .with_status(429)
                .with_code("rate_limit_exceeded")
                .with_request_id("req-7"),
        );
        let record = AttemptRecord::new("m", err.kind(), err.to_string()).context(err.context());
        assert_eq!(record.http_status, Some(429));
        assert_eq!(record.provider_code.as_deref(), Some("rate_limit_exceeded"));
        assert_eq!(record.request_id.as_deref(), Some("req-7"));

        let json = serde_json::to_value(AttemptRecord::new("m", FailureKind::ParseError, "x"))
            .unwrap();
        assert!(json.get("requestId").is_none() && json.get("request_id").is_none());
    }

    #[test]
    fn empty_history_is_config_error() {
        let failure = CompletionFailure::from_attempts(Vec::new());
        assert_eq!(failure.kind, FailureKind::ConfigError);
    }

    #[test]
    fn upstream_error_classification() {
        let err = ProviderError::upstream_with_context(
            "gemini",
            "model not found",
            ErrorContext::new().with_status(404).with_request_id("r1"),
        );
        assert_eq!(err.kind(), FailureKind::UpstreamError);
        assert_eq!(err.request_id(), Some("r1"));
        assert_eq!(
            ProviderError::Timeout(Duration::from_secs(1)).kind(),
            FailureKind::ConnectionError
        );
        assert_eq!(ProviderError::config("x").kind(), FailureKind::ConfigError);
    }
}
