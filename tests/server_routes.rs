use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use story4d::gateway::{
    CompletionFailure, CompletionGateway, CompletionOutcome, CompletionRequest, FailureKind,
    ModelCandidates,
};
use story4d::server::{create_router, AppState, REQUEST_ID_HEADER};
use story4d::stages::StoryPipeline;

enum Canned {
    Value(Value),
    Failure(FailureKind),
}

struct CannedGateway(Canned);

#[async_trait]
impl CompletionGateway for CannedGateway {
    async fn complete_request(&self, req: CompletionRequest<'_>) -> CompletionOutcome {
        match &self.0 {
            Canned::Value(v) => {
                (req.shape)(v).map_err(CompletionFailure::parse)?;
                Ok(v.clone())
            }
            Canned::Failure(kind) => Err(CompletionFailure::new(*kind, format!("{kind} detail"))),
        }
    }
}

async fn spawn(canned: Canned) -> SocketAddr {
    let pipeline = StoryPipeline::new(
        Arc::new(CannedGateway(canned)),
        ModelCandidates::new(["stub"]),
    );
    let router = create_router(AppState::new(Arc::new(pipeline)));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn post(addr: SocketAddr, route: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}{route}"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn health_reports_ok() {
    let addr = spawn(Canned::Value(json!({}))).await;
    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert!(resp.headers().contains_key(REQUEST_ID_HEADER));
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn gherkin_route_returns_bare_array() {
    let scenario = json!({
        "ruleId": "RN-01",
        "gherkinText": "<span class='gherkin-keyword'>Dado</span> ..."
    });
    let addr = spawn(Canned::Value(json!({"scenarios": [scenario.clone()]}))).await;

    let (status, body) = post(
        addr,
        "/api/generate-gherkin",
        json!({"rules": [{"id": "RN-01", "text": "X"}]}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body, json!([scenario]));
}

#[tokio::test]
async fn draft_route_passes_story_through() {
    let story = json!({
        "user": "cliente",
        "action": "pagar com Pix",
        "benefit": "concluir a compra na hora",
        "formattedStory": "<strong>Como</strong> cliente..."
    });
    let addr = spawn(Canned::Value(story.clone())).await;
    let (status, body) = post(addr, "/api/generate-story", json!({"idea": "pix"})).await;
    assert_eq!(status, 200);
    assert_eq!(body, story);
}

#[tokio::test]
async fn validate_route_keeps_extra_keys_and_float_score() {
    let result = json!({
        "score": 85.0,
        "message": "ok",
        "isLarge": false,
        "splittingSuggestions": [{"type": "regra", "title": "t", "description": "d", "effort": 3}],
        "investBreakdown": {"testable": true}
    });
    let addr = spawn(Canned::Value(result.clone())).await;
    let (status, body) = post(
        addr,
        "/api/validate-story",
        json!({
            "story": "Como admin...",
            "rules": [{"id": "RN-01", "text": "X", "source": "chat"}],
            "scenarios": [{"ruleId": "RN-01", "originalRule": null, "gherkinText": "g"}]
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body, result);
}

#[tokio::test]
async fn failure_kinds_map_to_statuses() {
    let cases = [
        (FailureKind::ParseError, 400),
        (FailureKind::ConfigError, 500),
        (FailureKind::ConnectionError, 502),
        (FailureKind::UpstreamError, 502),
    ];
    for (kind, expected) in cases {
        let addr = spawn(Canned::Failure(kind)).await;
        let (status, body) = post(
            addr,
            "/api/chat-rules",
            json!({"context": "c", "message": "m"}),
        )
        .await;
        assert_eq!(status, expected, "{kind}");
        assert_eq!(body, json!({"error": format!("{kind} detail")}));
    }
}

#[tokio::test]
async fn shape_failure_is_bad_request() {
    let addr = spawn(Canned::Value(json!({"notRules": []}))).await;
    let (status, body) = post(
        addr,
        "/api/consolidate-rules",
        json!({"context": "c", "qaPairs": [], "chatHistory": []}),
    )
    .await;
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("rules"));
}

#[tokio::test]
async fn malformed_and_invalid_bodies_are_rejected() {
    let addr = spawn(Canned::Value(json!({}))).await;

    let (status, body) = post(addr, "/api/validate-story", json!({"story": 5})).await;
    assert_eq!(status, 400);
    assert!(body["error"].is_string());

    let (status, body) = post(addr, "/api/generate-gherkin", json!({"rules": []})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "rules must not be empty");

    let (status, _) = post(addr, "/api/generate-questions", json!({"context": ""})).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn stage_routes_are_post_only() {
    let addr = spawn(Canned::Value(json!({}))).await;
    let resp = reqwest::get(format!("http://{addr}/api/generate-story"))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 405);
}
