//! HTTP surface: one POST route per stage plus a health check.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Settings;
use crate::gateway::ProviderError;
use crate::stages::types::*;
use crate::stages::{Stage, StageError, StoryPipeline};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<StoryPipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<StoryPipeline>) -> Self {
        Self { pipeline }
    }
}

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to build provider: {0}")]
    Provider(#[from] ProviderError),

    #[error("server io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Creates the stage API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(Stage::DraftStory.route(), post(generate_story))
        .route(Stage::ClarifyingQuestions.route(), post(generate_questions))
        .route(Stage::ChatRule.route(), post(chat_rules))
        .route(Stage::ConsolidateRules.route(), post(consolidate_rules))
        .route(Stage::GherkinScenarios.route(), post(generate_gherkin))
        .route(Stage::ValidateStory.route(), post(validate_story))
        .layer(middleware::from_fn(request_span))
        .with_state(state)
}

/// Bind `settings.bind` and serve until ctrl-c.
pub async fn serve(settings: &Settings) -> Result<(), ServeError> {
    if !settings.is_configured() {
        warn!(
            provider = ?settings.provider,
            "no LLM provider configured; every stage call will fail with config_error"
        );
    }
    let pipeline = Arc::new(StoryPipeline::from_settings(settings)?);
    let router = create_router(AppState::new(pipeline));

    let listener = tokio::net::TcpListener::bind(settings.bind).await?;
    info!(
        addr = %listener.local_addr()?,
        provider = settings.provider.name(),
        models = %settings.models,
        "story4d listening"
    );
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}

/// Tags every request with a fresh id, both in the tracing span and the response header.
async fn request_span(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let span = info_span!(
        "request",
        id = %request_id,
        method = %req.method(),
        path = %req.uri().path()
    );
    let mut response = next.run(req).instrument(span.clone()).await;
    span.in_scope(|| info!(status = response.status().as_u16(), "request finished"));
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

async fn generate_story(
    State(state): State<AppState>,
    body: Result<Json<DraftStoryRequest>, JsonRejection>,
) -> Response {
    match unpack(body) {
        Ok(req) => respond(state.pipeline.draft_story(&req).await),
        Err(rejected) => rejected,
    }
}

async fn generate_questions(
    State(state): State<AppState>,
    body: Result<Json<QuestionsRequest>, JsonRejection>,
) -> Response {
    match unpack(body) {
        Ok(req) => respond(state.pipeline.clarifying_questions(&req).await),
        Err(rejected) => rejected,
    }
}

async fn chat_rules(
    State(state): State<AppState>,
    body: Result<Json<ChatRuleRequest>, JsonRejection>,
) -> Response {
    match unpack(body) {
        Ok(req) => respond(state.pipeline.chat_capture_rule(&req).await),
        Err(rejected) => rejected,
    }
}

async fn consolidate_rules(
    State(state): State<AppState>,
    body: Result<Json<ConsolidateRulesRequest>, JsonRejection>,
) -> Response {
    match unpack(body) {
        Ok(req) => respond(state.pipeline.consolidate_rules(&req).await),
        Err(rejected) => rejected,
    }
}

async fn generate_gherkin(
    State(state): State<AppState>,
    body: Result<Json<GherkinRequest>, JsonRejection>,
) -> Response {
    match unpack(body) {
        Ok(req) => respond(state.pipeline.generate_gherkin(&req).await),
        Err(rejected) => rejected,
    }
}

async fn validate_story(
    State(state): State<AppState>,
    body: Result<Json<ValidateStoryRequest>, JsonRejection>,
) -> Response {
    match unpack(body) {
        Ok(req) => respond(state.pipeline.validate_story(&req).await),
        Err(rejected) => rejected,
    }
}

fn unpack<T: DeserializeOwned>(body: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    match body {
        Ok(Json(req)) => Ok(req),
        Err(rejection) => {
            warn!(reason = %rejection.body_text(), "rejected request body");
            Err(error_body(StatusCode::BAD_REQUEST, rejection.body_text()))
        }
    }
}

fn respond<T: Serialize>(result: Result<T, StageError>) -> Response {
    match result {
        Ok(out) => (StatusCode::OK, Json(out)).into_response(),
        Err(err) => {
            let status = StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            warn!(
                status = status.as_u16(),
                kind = err.kind().map(|k| k.code()).unwrap_or("invalid_input"),
                "stage failed"
            );
            error_body(status, err.detail())
        }
    }
}

fn error_body(status: StatusCode, detail: String) -> Response {
    (status, Json(json!({ "error": detail }))).into_response()
}
