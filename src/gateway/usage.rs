//! Usage tracking via the UsageSink trait.
//!
//! The gateway reports every attempt through a UsageSink. This decouples the gateway
//! from where the records end up:
//! - The server uses TracingUsageSink (structured log lines)
//! - Tests use NoopUsageSink or a recording sink

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Status of a provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Success,
    Error,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Success => "success",
            CallStatus::Error => "error",
        }
    }
}

/// Record of one gateway attempt.
#[derive(Debug, Clone)]
pub struct ProviderCallRecord {
    /// Provider name: "gemini", "openai_compat", etc.
    pub provider: &'static str,
    /// Model attempted.
    pub model: String,
    /// Position of the model in the fallback list (0-based).
    pub candidate_index: usize,
    /// Input tokens consumed.
    pub input_tokens: u32,
    /// Output tokens generated.
    pub output_tokens: u32,
    /// Latency in milliseconds.
    pub latency_ms: u64,
    /// Call status.
    pub status: CallStatus,
    /// Error code if status is Error.
    pub error_code: Option<String>,
    /// Which code path made this call.
    pub caller: &'static str,
    /// When the call was made.
    pub timestamp: DateTime<Utc>,
}

impl ProviderCallRecord {
    /// Create a new record with required fields, defaulting others.
    pub fn new(
        provider: &'static str,
        model: impl Into<String>,
        candidate_index: usize,
        caller: &'static str,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            candidate_index,
            input_tokens: 0,
            output_tokens: 0,
            latency_ms: 0,
            status: CallStatus::Success,
            error_code: None,
            caller,
            timestamp: Utc::now(),
        }
    }

    pub fn tokens(mut self, input: u32, output: u32) -> Self {
        self.input_tokens = input;
        self.output_tokens = output;
        self
    }

    pub fn latency(mut self, ms: u64) -> Self {
        self.latency_ms = ms;
        self
    }

    pub fn error(mut self, code: impl Into<String>) -> Self {
        self.status = CallStatus::Error;
        self.error_code = Some(code.into());
        self
    }
}

/// Trait for recording gateway attempts.
#[async_trait]
pub trait UsageSink: Send + Sync {
    /// Record one attempt. Fire-and-forget: failures are logged, not propagated.
    async fn record(&self, record: ProviderCallRecord);
}

/// No-op usage sink that discards all records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUsageSink;

#[async_trait]
impl UsageSink for NoopUsageSink {
    async fn record(&self, _record: ProviderCallRecord) {}
}

/// Usage sink that emits one `tracing` event per attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingUsageSink;

#[async_trait]
impl UsageSink for TracingUsageSink {
    async fn record(&self, record: ProviderCallRecord) {
        tracing::info!(
            target: "story4d::usage",
            provider = record.provider,
            model = %record.model,
            candidate = record.candidate_index,
            status = record.status.as_str(),
            error_code = record.error_code.as_deref().unwrap_or(""),
            tokens_in = record.input_tokens,
            tokens_out = record.output_tokens,
            latency_ms = record.latency_ms,
            caller = record.caller,
            at = %record.timestamp.to_rfc3339(),
            "provider call"
        );
    }
}
