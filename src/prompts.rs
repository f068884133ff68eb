//! Prompt templates for the story pipeline stages.
//!
//! Each stage pairs a fixed system instruction, which states the persona, the
//! transformation rules and the exact JSON shape expected back, with a pure renderer that
//! turns the stage request into the user turn. Absent optional fields render as empty
//! strings so the model sees the blank explicitly.

use crate::stages::types::*;
use crate::stages::Stage;

// =============================================================================
// Rendered prompts
// =============================================================================

/// Rendered prompt ready for the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptInstance {
    pub template_slug: &'static str,
    pub system: &'static str,
    pub user: String,
}

/// A stage's fixed system instruction.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub stage: Stage,
    pub slug: &'static str,
    pub system: &'static str,
}

/// Borrowed stage input, one variant per stage.
#[derive(Debug, Clone, Copy)]
pub enum StageInput<'a> {
    DraftStory(&'a DraftStoryRequest),
    ClarifyingQuestions(&'a QuestionsRequest),
    ChatRule(&'a ChatRuleRequest),
    ConsolidateRules(&'a ConsolidateRulesRequest),
    GherkinScenarios(&'a GherkinRequest),
    ValidateStory(&'a ValidateStoryRequest),
}

impl StageInput<'_> {
    pub fn stage(&self) -> Stage {
        match self {
            Self::DraftStory(_) => Stage::DraftStory,
            Self::ClarifyingQuestions(_) => Stage::ClarifyingQuestions,
            Self::ChatRule(_) => Stage::ChatRule,
            Self::ConsolidateRules(_) => Stage::ConsolidateRules,
            Self::GherkinScenarios(_) => Stage::GherkinScenarios,
            Self::ValidateStory(_) => Stage::ValidateStory,
        }
    }
}

/// Render the system/user pair for a stage input.
pub fn render(input: &StageInput<'_>) -> PromptInstance {
    let template = template_for(input.stage());
    let user = match input {
        StageInput::DraftStory(req) => render_draft(req),
        StageInput::ClarifyingQuestions(req) => format!("Contexto: {}", req.context),
        StageInput::ChatRule(req) => {
            format!("Contexto: {}\nUsuário disse: {}", req.context, req.message)
        }
        StageInput::ConsolidateRules(req) => render_consolidate(req),
        StageInput::GherkinScenarios(req) => format!("Regras: {}", to_json(&req.rules)),
        StageInput::ValidateStory(req) => format!(
            "Story: {}\nRules: {}\nScenarios: {}",
            req.story,
            to_json(&req.rules),
            to_json(&req.scenarios)
        ),
    };

    PromptInstance {
        template_slug: template.slug,
        system: template.system,
        user,
    }
}

fn render_draft(req: &DraftStoryRequest) -> String {
    let field = |v: &Option<String>| v.as_deref().unwrap_or("").to_string();
    format!(
        "Ideia: {}\nUsuário: {}\nAção: {}\nBenefício: {}",
        field(&req.idea),
        field(&req.user),
        field(&req.action),
        field(&req.benefit)
    )
}

fn render_consolidate(req: &ConsolidateRulesRequest) -> String {
    let qa = req
        .qa_pairs
        .iter()
        .map(|qa| format!("P: {} R: {}", qa.question, qa.answer))
        .collect::<Vec<_>>()
        .join("\n");
    let chat = req
        .chat_history
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Contexto: {}\nQuestionário:\n{}\nChat:\n{}",
        req.context, qa, chat
    )
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "[]".into())
}

// =============================================================================
// Stage templates
// =============================================================================

pub const DRAFT_STORY: PromptTemplate = PromptTemplate {
    stage: Stage::DraftStory,
    slug: "draft_story_v1",
    system: r#"You are an experienced Product Owner coach. Create or refine a user story from partial input.

Refinement rules:
- If the action verb is passive (e.g. "view", "see") make it actionable and specific.
- If the benefit is vague (e.g. "make it easier", "improve") make it concrete and value oriented.
- If a field is blank, infer the best content from the idea, applying the rules above.
- Target the canonical form: "Como um [persona], eu quero [ação], para que [valor]."
- Write every value in Brazilian Portuguese.

Output only valid JSON:
{"user": "string", "action": "string", "benefit": "string", "formattedStory": "HTML string using <strong> around Como, Quero and Para"}"#,
};

pub const CLARIFYING_QUESTIONS: PromptTemplate = PromptTemplate {
    stage: Stage::ClarifyingQuestions,
    slug: "clarifying_questions_v1",
    system: r#"You are a senior business analyst and QA specialist. Analyse the user story context and find gaps, risks and unstated rules.

Ask 3 to 5 strategic questions that harden the feature (exceptions, validation, security) and cover points the context has not mentioned. Each question has a label and a short placeholder with an example answer. Write in Brazilian Portuguese.

Output only valid JSON:
{"questions": [{"label": "Pergunta?", "ph": "Exemplo"}]}"#,
};

pub const CHAT_RULE: PromptTemplate = PromptTemplate {
    stage: Stage::ChatRule,
    slug: "chat_rule_v1",
    system: r#"You are a Product Owner coach. The user is adding business rules by hand. Acknowledge the rule they stated in one or two sentences and ask whether there are more. Be brief and answer in Brazilian Portuguese.

Output only valid JSON:
{"reply": "string"}"#,
};

pub const CONSOLIDATE_RULES: PromptTemplate = PromptTemplate {
    stage: Stage::ConsolidateRules,
    slug: "consolidate_rules_v1",
    system: r#"You are a software architect. Consolidate everything you receive (questionnaire answers and chat transcript) into formal business rules. Merge duplicates, drop chit-chat, keep one verifiable statement per rule. Number the rules RN-01, RN-02, ... in order. Write the rule text in Brazilian Portuguese.

Output only valid JSON:
{"rules": [{"id": "RN-01", "text": "string"}]}"#,
};

pub const GHERKIN_SCENARIOS: PromptTemplate = PromptTemplate {
    stage: Stage::GherkinScenarios,
    slug: "gherkin_scenarios_v1",
    system: r#"You are a BDD QA engineer. Write one Gherkin scenario per business rule, in Brazilian Portuguese (Cenário, Dado, Quando, Então, E).

Markup rules for gherkinText:
- Wrap keywords in <span class='gherkin-keyword'>...</span>.
- Wrap variables and example values in <span class='gherkin-variable'>...</span>.
- Wrap quoted strings in <span class='gherkin-string'>...</span>.
- Separate steps with <br>.

Echo the rule id in ruleId and the rule text in originalRule.

Output only valid JSON:
{"scenarios": [{"ruleId": "RN-01", "originalRule": "string", "gherkinText": "string"}]}"#,
};

pub const VALIDATE_STORY: PromptTemplate = PromptTemplate {
    stage: Stage::ValidateStory,
    slug: "validate_story_v1",
    system: r#"You are an agile coach specialised in INVEST. Assess the story together with its rules and scenarios.

1. Give an integer score from 0 to 100.
2. If the score is below 70 or the story is too complex, set isLarge to true and suggest splittings (by workflow step, business rule, data variation, interface, and so on).
3. Write message and suggestions in Brazilian Portuguese.

Output only valid JSON:
{"score": 0, "message": "string", "isLarge": false, "splittingSuggestions": [{"type": "string", "title": "string", "description": "string"}]}"#,
};

pub fn template_for(stage: Stage) -> &'static PromptTemplate {
    match stage {
        Stage::DraftStory => &DRAFT_STORY,
        Stage::ClarifyingQuestions => &CLARIFYING_QUESTIONS,
        Stage::ChatRule => &CHAT_RULE,
        Stage::ConsolidateRules => &CONSOLIDATE_RULES,
        Stage::GherkinScenarios => &GHERKIN_SCENARIOS,
        Stage::ValidateStory => &VALIDATE_STORY,
    }
}

// =============================================================================
// TESTS
// =============================================================================
