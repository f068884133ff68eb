//! Request and response types for the pipeline stages.
//!
//! Wire names are camelCase to match the frontend contract. Model-produced objects keep any
//! keys beyond the typed ones in `extra`, so responses reach the caller as the model wrote them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

// =============================================================================
// Shared entities
// =============================================================================

/// A business rule, conventionally identified as `RN-NN`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Rule {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            extra: Map::new(),
        }
    }
}

/// One clarifying question and the answer the user gave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

/// One transcript entry of the rule-capture chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// A Gherkin scenario covering one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Soft reference to `Rule::id`.
    pub rule_id: String,
    /// Scenario text with `<span class="gherkin-*">` highlighting.
    pub gherkin_text: String,
    /// `originalRule` and anything else the model added, verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftStoryRequest {
    #[serde(default)]
    pub idea: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub benefit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionsRequest {
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRuleRequest {
    pub context: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidateRulesRequest {
    pub context: String,
    pub qa_pairs: Vec<QaPair>,
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GherkinRequest {
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateStoryRequest {
    pub story: String,
    pub rules: Vec<Rule>,
    pub scenarios: Vec<Scenario>,
}

// =============================================================================
// Responses
// =============================================================================

/// Refined story in "As a [persona], I want [action], so that [value]" form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftStory {
    pub user: String,
    pub action: String,
    pub benefit: String,
    /// HTML with `<strong>` around the keywords.
    pub formatted_story: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarifyingQuestion {
    pub label: String,
    /// Placeholder: an example answer shown in the input field.
    pub ph: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplittingSuggestion {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub description: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// INVEST assessment of a story.
///
/// `score` is kept as the model's JSON number, so `85` and `85.0` both come back as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub score: Number,
    pub message: String,
    pub is_large: bool,
    #[serde(default)]
    pub splitting_suggestions: Vec<SplittingSuggestion>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// Model-side envelopes unwrapped by the handlers.

#[derive(Debug, Deserialize)]
pub(crate) struct QuestionsEnvelope {
    pub questions: Vec<ClarifyingQuestion>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RulesEnvelope {
    pub rules: Vec<Rule>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScenariosEnvelope {
    pub scenarios: Vec<Scenario>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn consolidate_request_defaults_chat_history() {
        let req: ConsolidateRulesRequest = serde_json::from_value(json!({
            "context": "c",
            "qaPairs": [{"question": "Q1", "answer": "A1"}]
        }))
        .unwrap();
        assert!(req.chat_history.is_empty());
        assert_eq!(req.qa_pairs.len(), 1);
    }

    #[test]
    fn draft_request_accepts_nulls_and_missing_fields() {
        let req: DraftStoryRequest =
            serde_json::from_value(json!({"idea": "login", "user": null})).unwrap();
        assert_eq!(req.idea.as_deref(), Some("login"));
        assert!(req.user.is_none());
        assert!(req.benefit.is_none());
    }

    #[test]
    fn scenario_round_trips_without_original_rule() {
        let raw = json!({"ruleId": "RN-01", "gherkinText": "Dado ..."});
        let s: Scenario = serde_json::from_value(raw.clone()).unwrap();
        assert!(s.extra.is_empty());
        assert_eq!(serde_json::to_value(&s).unwrap(), raw);
    }

    #[test]
    fn scenario_keeps_null_original_rule_and_unknown_keys() {
        let raw = json!({
            "ruleId": "RN-01",
            "originalRule": null,
            "gherkinText": "x",
            "title": "Login"
        });
        let s: Scenario = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(s.extra["title"], "Login");
        assert_eq!(serde_json::to_value(&s).unwrap(), raw);
    }

    #[test]
    fn validation_result_keeps_float_score_and_extra_keys() {
        let raw = json!({
            "score": 85.0,
            "message": "ok",
            "isLarge": false,
            "splittingSuggestions": [],
            "investBreakdown": {"independent": true}
        });
        let v: ValidationResult = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(v.score.as_f64(), Some(85.0));
        assert_eq!(serde_json::to_value(&v).unwrap(), raw);
    }

    #[test]
    fn rule_new_serializes_without_extra() {
        let rule = Rule::new("RN-01", "X");
        assert_eq!(serde_json::to_value(&rule).unwrap(), json!({"id": "RN-01", "text": "X"}));
    }

    #[test]
    fn validation_result_wire_names() {
        let v: ValidationResult = serde_json::from_value(json!({
            "score": 42,
            "message": "grande demais",
            "isLarge": true,
            "splittingSuggestions": [{"type": "workflow", "title": "t", "description": "d"}]
        }))
        .unwrap();
        assert_eq!(v.score.as_i64(), Some(42));
        assert_eq!(v.splitting_suggestions[0].kind, "workflow");
        let back = serde_json::to_value(&v).unwrap();
        assert_eq!(back["isLarge"], true);
        assert_eq!(back["splittingSuggestions"][0]["type"], "workflow");
    }
}
