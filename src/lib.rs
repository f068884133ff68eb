#![forbid(unsafe_code)]

//! # story4d
//!
//! Turns partial product input into a testable user story through six LLM-backed stages:
//! draft the story, ask clarifying questions, capture rules by chat, consolidate rules,
//! generate Gherkin scenarios and validate the result against INVEST.
//!
//! All language work is delegated to an upstream completion API through the
//! [`gateway`], which demands JSON-only output, strips Markdown fences and falls back
//! across an ordered list of models until one answers with the expected shape.

pub mod config;
pub mod gateway;
pub mod prompts;
pub mod server;
pub mod stages;

pub use config::{ConfigError, ProviderSettings, Settings};
pub use gateway::{
    Attribution, ChatProvider, CompletionFailure, CompletionGateway, CompletionRequest,
    FailureKind, FallbackGateway, ModelCandidates, UsageSink,
};
pub use server::{create_router, AppState};
pub use stages::{Stage, StageError, StoryPipeline};
