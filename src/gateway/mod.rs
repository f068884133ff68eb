//! Completion gateway: JSON-only completions with ordered model fallback.

pub mod candidates;
pub mod error;
pub mod gemini;
pub mod openai_compat;
pub mod provider;
pub mod types;
pub mod unwrap;
pub mod usage;

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{info, warn};

use crate::config::{ProviderSettings, Settings};
use provider::preview;
use usage::{ProviderCallRecord, UsageSink as UsageSinkTrait};

pub use candidates::ModelCandidates;
pub use error::{AttemptRecord, CompletionFailure, ErrorContext, FailureKind, ProviderError};
pub use gemini::GeminiAdapter;
pub use openai_compat::OpenAiCompatAdapter;
pub use provider::ChatProvider;
pub use types::*;
pub use unwrap::{parse_completion, strip_code_fence};
pub use usage::{NoopUsageSink, TracingUsageSink, UsageSink};

/// Parsed JSON on success, last-attempt failure otherwise.
pub type CompletionOutcome = Result<Value, CompletionFailure>;

/// Structural check a stage applies to parsed JSON before accepting it.
pub type ShapeCheck = fn(&Value) -> Result<(), String>;

/// Accepts any JSON document.
pub fn any_json(_: &Value) -> Result<(), String> {
    Ok(())
}

/// One gateway call: prompt pair, fallback list and acceptance check.
#[derive(Clone)]
pub struct CompletionRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub candidates: &'a ModelCandidates,
    pub attribution: Attribution,
    pub shape: ShapeCheck,
}

impl<'a> CompletionRequest<'a> {
    pub fn new(system: &'a str, user: &'a str, candidates: &'a ModelCandidates) -> Self {
        Self {
            system,
            user,
            candidates,
            attribution: Attribution::new("gateway::complete"),
            shape: any_json,
        }
    }

    pub fn attribution(mut self, attribution: Attribution) -> Self {
        self.attribution = attribution;
        self
    }

    pub fn shape(mut self, shape: ShapeCheck) -> Self {
        self.shape = shape;
        self
    }

    fn messages(&self) -> Vec<Message> {
        vec![Message::system(self.system), Message::user(self.user)]
    }
}

#[async_trait::async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn complete_request(&self, req: CompletionRequest<'_>) -> CompletionOutcome;

    async fn complete(
        &self,
        system: &str,
        user: &str,
        candidates: &ModelCandidates,
    ) -> CompletionOutcome {
        self.complete_request(CompletionRequest::new(system, user, candidates))
            .await
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

enum Backend {
    Ready(Arc<dyn ChatProvider>),
    Unconfigured(String),
}

/// Gateway that walks the candidate list against one provider adapter.
pub struct FallbackGateway<U: UsageSinkTrait> {
    backend: Backend,
    usage_sink: Arc<U>,
    config: GatewayConfig,
}

#[async_trait::async_trait]
impl<U: UsageSinkTrait> CompletionGateway for FallbackGateway<U> {
    async fn complete_request(&self, req: CompletionRequest<'_>) -> CompletionOutcome {
        FallbackGateway::complete_request(self, req).await
    }
}

impl<U: UsageSinkTrait> FallbackGateway<U> {
    pub fn with_config(
        provider: Arc<dyn ChatProvider>,
        usage_sink: Arc<U>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            backend: Backend::Ready(provider),
            usage_sink,
            config,
        }
    }

    /// Gateway that rejects every call with `ConfigError` and never touches the network.
    pub fn unconfigured(reason: impl Into<String>, usage_sink: Arc<U>) -> Self {
        Self {
            backend: Backend::Unconfigured(reason.into()),
            usage_sink,
            config: GatewayConfig::default(),
        }
    }

    /// Build the adapter selected by `settings`.
    pub fn from_settings(settings: &Settings, usage_sink: Arc<U>) -> Result<Self, ProviderError> {
        let config = GatewayConfig {
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        };
        let provider: Arc<dyn ChatProvider> = match &settings.provider {
            ProviderSettings::Gemini { api_key, base_url } => Arc::new(
                GeminiAdapter::with_config(api_key, base_url, settings.timeout)?,
            ),
            ProviderSettings::Internal {
                url,
                api_key,
                native_json_mode,
            } => Arc::new(OpenAiCompatAdapter::with_config(
                api_key,
                url,
                settings.timeout,
                *native_json_mode,
            )?),
            ProviderSettings::Unconfigured { reason } => {
                return Ok(Self::unconfigured(reason.clone(), usage_sink));
            }
        };
        Ok(Self::with_config(provider, usage_sink, config))
    }

    pub async fn complete_request(&self, req: CompletionRequest<'_>) -> CompletionOutcome {
        let provider = match &self.backend {
            Backend::Ready(provider) => provider,
            Backend::Unconfigured(reason) => {
                warn!(
                    caller = req.attribution.caller,
                    %reason,
                    "completion rejected: gateway not configured"
                );
                return Err(CompletionFailure::config(reason.clone()));
            }
        };

        if req.candidates.is_empty() {
            return Err(CompletionFailure::config("no model candidates configured"));
        }

        let mut attempts: Vec<AttemptRecord> = Vec::with_capacity(req.candidates.len());

        for (index, model) in req.candidates.iter().enumerate() {
            info!(
                provider = provider.name(),
                model,
                candidate = index,
                caller = req.attribution.caller,
                "attempting completion"
            );

            let chat = ChatRequest::new(model, req.messages(), req.attribution)
                .temperature(self.config.temperature)
                .max_tokens(self.config.max_tokens)
                .json();

            let started = Instant::now();
            let record =
                ProviderCallRecord::new(provider.name(), model, index, req.attribution.caller);

            let attempt = match provider.chat(&chat).await {
                Ok(resp) => {
                    let record = record
                        .tokens(resp.input_tokens, resp.output_tokens)
                        .latency(resp.latency.as_millis() as u64);
                    match accept(&resp.content, req.shape) {
                        Ok(value) => {
                            info!(model, candidate = index, "completion succeeded");
                            self.usage_sink.record(record).await;
                            return Ok(value);
                        }
                        Err(detail) => {
                            self.usage_sink
                                .record(record.error(FailureKind::ParseError.code()))
                                .await;
                            let detail = match resp.finish_reason.incomplete_output_note() {
                                Some(note) => format!("{detail} ({note})"),
                                None => detail,
                            };
                            AttemptRecord::new(model, FailureKind::ParseError, detail)
                        }
                    }
                }
                Err(err) => {
                    let record = record.latency(started.elapsed().as_millis() as u64);
                    self.usage_sink.record(record.error(err.code())).await;
                    AttemptRecord::new(model, err.kind(), err.to_string()).context(err.context())
                }
            };

            warn!(
                model,
                candidate = index,
                kind = attempt.kind.code(),
                http_status = attempt.http_status,
                provider_code = attempt.provider_code.as_deref(),
                request_id = attempt.request_id.as_deref(),
                detail = %preview(&attempt.detail),
                "completion attempt failed"
            );
            attempts.push(attempt);
        }

        let failure = CompletionFailure::from_attempts(attempts);
        warn!(
            attempts = failure.attempt_count(),
            kind = failure.kind.code(),
            "all model candidates failed"
        );
        Err(failure)
    }
}

/// Unwrap, parse and shape-check one completion. Errors carry the raw text.
fn accept(raw: &str, shape: ShapeCheck) -> Result<Value, String> {
    let value = parse_completion(raw)
        .map_err(|e| format!("model did not return valid JSON ({e}); raw: {raw}"))?;
    shape(&value).map_err(|msg| format!("response shape mismatch: {msg}; raw: {raw}"))?;
    Ok(value)
}
