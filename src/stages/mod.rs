//! Story pipeline stage handlers.
//!
//! Every handler follows the same path: validate the caller's input, render the stage
//! prompt, run it through the completion gateway with the stage's shape check, and reshape
//! the parsed JSON into the typed output. Input validation happens before any network call.
//! Output types carry unknown keys through, so reshaping never drops what the model sent.

pub mod types;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::config::Settings;
use crate::gateway::{
    Attribution, CompletionFailure, CompletionGateway, CompletionRequest, FailureKind,
    FallbackGateway, ModelCandidates, ProviderError, ShapeCheck, TracingUsageSink,
};
use crate::prompts::{self, StageInput};
use types::*;

// =============================================================================
// Stage identity
// =============================================================================

/// The six pipeline stages, in the order the frontend walks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    DraftStory,
    ClarifyingQuestions,
    ChatRule,
    ConsolidateRules,
    GherkinScenarios,
    ValidateStory,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::DraftStory,
        Stage::ClarifyingQuestions,
        Stage::ChatRule,
        Stage::ConsolidateRules,
        Stage::GherkinScenarios,
        Stage::ValidateStory,
    ];

    /// Short name used by the CLI and in logs.
    pub fn slug(&self) -> &'static str {
        match self {
            Stage::DraftStory => "draft-story",
            Stage::ClarifyingQuestions => "questions",
            Stage::ChatRule => "chat-rule",
            Stage::ConsolidateRules => "consolidate-rules",
            Stage::GherkinScenarios => "gherkin",
            Stage::ValidateStory => "validate-story",
        }
    }

    /// HTTP route serving this stage.
    pub fn route(&self) -> &'static str {
        match self {
            Stage::DraftStory => "/api/generate-story",
            Stage::ClarifyingQuestions => "/api/generate-questions",
            Stage::ChatRule => "/api/chat-rules",
            Stage::ConsolidateRules => "/api/consolidate-rules",
            Stage::GherkinScenarios => "/api/generate-gherkin",
            Stage::ValidateStory => "/api/validate-story",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.slug() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Stage::ALL.iter().map(|s| s.slug()).collect();
                format!("unknown stage {s:?} (expected one of: {})", known.join(", "))
            })
    }
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum StageError {
    /// Caller input rejected before any network call.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Completion(#[from] CompletionFailure),
}

impl StageError {
    /// HTTP status for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            StageError::InvalidInput(_) => 400,
            StageError::Completion(f) => match f.kind {
                FailureKind::ParseError => 400,
                FailureKind::ConfigError => 500,
                FailureKind::ConnectionError | FailureKind::UpstreamError => 502,
            },
        }
    }

    /// Message for the `{"error": ...}` response body.
    pub fn detail(&self) -> String {
        match self {
            StageError::InvalidInput(msg) => msg.clone(),
            StageError::Completion(f) => f.detail.clone(),
        }
    }

    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            StageError::InvalidInput(_) => None,
            StageError::Completion(f) => Some(f.kind),
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// The stage handlers bound to one gateway and fallback list.
///
/// Holds no mutable state; share it behind an `Arc` across requests.
#[derive(Clone)]
pub struct StoryPipeline {
    gateway: Arc<dyn CompletionGateway>,
    candidates: ModelCandidates,
}

impl StoryPipeline {
    pub fn new(gateway: Arc<dyn CompletionGateway>, candidates: ModelCandidates) -> Self {
        Self {
            gateway,
            candidates,
        }
    }

    /// Pipeline over the provider chosen by `settings`, logging usage through `tracing`.
    pub fn from_settings(settings: &Settings) -> Result<Self, ProviderError> {
        let gateway = FallbackGateway::from_settings(settings, Arc::new(TracingUsageSink))?;
        Ok(Self::new(Arc::new(gateway), settings.models.clone()))
    }

    /// Create or refine a user story from partial input. Blank fields are allowed.
    pub async fn draft_story(&self, req: &DraftStoryRequest) -> Result<DraftStory, StageError> {
        self.run_typed(
            StageInput::DraftStory(req),
            "stages::draft_story",
            shape_of::<DraftStory>,
        )
        .await
    }

    /// Three to five questions probing gaps in the story context.
    pub async fn clarifying_questions(
        &self,
        req: &QuestionsRequest,
    ) -> Result<Vec<ClarifyingQuestion>, StageError> {
        require_text("context", &req.context)?;
        let envelope: QuestionsEnvelope = self
            .run_typed(
                StageInput::ClarifyingQuestions(req),
                "stages::clarifying_questions",
                shape_of::<QuestionsEnvelope>,
            )
            .await?;
        Ok(envelope.questions)
    }

    /// Acknowledge one manually stated rule.
    pub async fn chat_capture_rule(&self, req: &ChatRuleRequest) -> Result<ChatReply, StageError> {
        require_text("message", &req.message)?;
        self.run_typed(
            StageInput::ChatRule(req),
            "stages::chat_capture_rule",
            shape_of::<ChatReply>,
        )
        .await
    }

    /// Merge questionnaire answers and chat transcript into numbered rules.
    pub async fn consolidate_rules(
        &self,
        req: &ConsolidateRulesRequest,
    ) -> Result<Vec<Rule>, StageError> {
        let envelope: RulesEnvelope = self
            .run_typed(
                StageInput::ConsolidateRules(req),
                "stages::consolidate_rules",
                shape_of::<RulesEnvelope>,
            )
            .await?;
        Ok(envelope.rules)
    }

    /// One Gherkin scenario per rule.
    pub async fn generate_gherkin(
        &self,
        req: &GherkinRequest,
    ) -> Result<Vec<Scenario>, StageError> {
        if req.rules.is_empty() {
            return Err(StageError::InvalidInput("rules must not be empty".into()));
        }
        if let Some(pos) = req.rules.iter().position(|r| r.id.trim().is_empty()) {
            return Err(StageError::InvalidInput(format!("rules[{pos}].id is blank")));
        }
        let envelope: ScenariosEnvelope = self
            .run_typed(
                StageInput::GherkinScenarios(req),
                "stages::generate_gherkin",
                shape_of::<ScenariosEnvelope>,
            )
            .await?;
        Ok(envelope.scenarios)
    }

    /// INVEST assessment. The score is returned exactly as the model produced it.
    pub async fn validate_story(
        &self,
        req: &ValidateStoryRequest,
    ) -> Result<ValidationResult, StageError> {
        require_text("story", &req.story)?;
        self.run_typed(
            StageInput::ValidateStory(req),
            "stages::validate_story",
            shape_of::<ValidationResult>,
        )
        .await
    }

    /// Run a stage from an untyped JSON request, returning the JSON response body.
    pub async fn run(&self, stage: Stage, input: Value) -> Result<Value, StageError> {
        match stage {
            Stage::DraftStory => to_body(self.draft_story(&from_body(input)?).await?),
            Stage::ClarifyingQuestions => {
                to_body(self.clarifying_questions(&from_body(input)?).await?)
            }
            Stage::ChatRule => to_body(self.chat_capture_rule(&from_body(input)?).await?),
            Stage::ConsolidateRules => to_body(self.consolidate_rules(&from_body(input)?).await?),
            Stage::GherkinScenarios => to_body(self.generate_gherkin(&from_body(input)?).await?),
            Stage::ValidateStory => to_body(self.validate_story(&from_body(input)?).await?),
        }
    }

    #[instrument(name = "stage", skip_all, fields(stage = input.stage().slug(), caller = caller))]
    async fn run_typed<T: DeserializeOwned>(
        &self,
        input: StageInput<'_>,
        caller: &'static str,
        shape: ShapeCheck,
    ) -> Result<T, StageError> {
        let prompt = prompts::render(&input);
        debug!(
            template = prompt.template_slug,
            user_len = prompt.user.len(),
            "rendered prompt"
        );

        let request = CompletionRequest::new(prompt.system, &prompt.user, &self.candidates)
            .attribution(Attribution::new(caller))
            .shape(shape);
        let value = self.gateway.complete_request(request).await?;

        // The gateway already ran `shape`; this only fails if the two disagree.
        let out = serde_json::from_value(value).map_err(|e| {
            CompletionFailure::parse(format!("response shape mismatch: {e}"))
        })?;
        info!("stage completed");
        Ok(out)
    }
}

/// Shape check that accepts exactly what `T` deserializes from.
fn shape_of<T: DeserializeOwned>(value: &Value) -> Result<(), String> {
    serde_json::from_value::<T>(value.clone())
        .map(|_| ())
        .map_err(|e| e.to_string())
}

fn require_text(field: &str, value: &str) -> Result<(), StageError> {
    if value.trim().is_empty() {
        return Err(StageError::InvalidInput(format!("{field} must not be blank")));
    }
    Ok(())
}

fn from_body<T: DeserializeOwned>(input: Value) -> Result<T, StageError> {
    serde_json::from_value(input).map_err(|e| StageError::InvalidInput(e.to_string()))
}

fn to_body<T: Serialize>(out: T) -> Result<Value, StageError> {
    serde_json::to_value(out)
        .map_err(|e| CompletionFailure::parse(format!("cannot encode stage output: {e}")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stage_slugs_round_trip() {
        for stage in Stage::ALL {
            assert_eq!(stage.slug().parse::<Stage>().unwrap(), stage);
            assert!(stage.route().starts_with("/api/"));
        }
        assert!("nope".parse::<Stage>().unwrap_err().contains("gherkin"));
    }

    #[test]
    fn status_mapping() {
        let status = |kind| StageError::Completion(CompletionFailure::new(kind, "x")).status_code();
        assert_eq!(status(FailureKind::ParseError), 400);
        assert_eq!(status(FailureKind::ConfigError), 500);
        assert_eq!(status(FailureKind::ConnectionError), 502);
        assert_eq!(status(FailureKind::UpstreamError), 502);
        assert_eq!(StageError::InvalidInput("x".into()).status_code(), 400);
    }

    #[test]
    fn shape_of_requires_envelope_key() {
        assert!(shape_of::<QuestionsEnvelope>(&json!({"questions": []})).is_ok());
        let err = shape_of::<QuestionsEnvelope>(&json!({"items": []})).unwrap_err();
        assert!(err.contains("questions"), "{err}");
        let partial = json!({"user": "u", "action": "a", "benefit": "b"});
        assert!(shape_of::<DraftStory>(&partial).is_err());
    }

    #[test]
    fn shape_of_accepts_any_numeric_score() {
        let v = json!({"score": 71.5, "message": "m", "isLarge": false});
        assert!(shape_of::<ValidationResult>(&v).is_ok());
        let v = json!({"score": "alto", "message": "m", "isLarge": false});
        assert!(shape_of::<ValidationResult>(&v).is_err());
    }
}
