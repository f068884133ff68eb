//! Ordered model fallback lists.

use std::fmt;

/// Built-in Gemini fallback order (fast tier first).
pub const GEMINI_DEFAULT_MODELS: &[&str] =
    &["gemini-2.5-flash", "gemini-2.0-flash", "gemini-1.5-flash"];

/// Built-in model for OpenAI-compatible internal gateways.
pub const INTERNAL_DEFAULT_MODELS: &[&str] = &["gpt-3.5-turbo"];

/// Models to attempt, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCandidates(Vec<String>);

impl ModelCandidates {
    pub fn new<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for model in models {
            let model = model.into().trim().to_string();
            if !model.is_empty() && !out.contains(&model) {
                out.push(model);
            }
        }
        Self(out)
    }

    /// Parse a comma-separated override, e.g. `LLM_MODEL=gemini-2.5-pro,gemini-2.5-flash`.
    pub fn parse_list(raw: &str) -> Self {
        Self::new(raw.split(','))
    }

    pub fn gemini_default() -> Self {
        Self::new(GEMINI_DEFAULT_MODELS.iter().copied())
    }

    pub fn internal_default() -> Self {
        Self::new(INTERNAL_DEFAULT_MODELS.iter().copied())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ModelCandidates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(","))
    }
}
