//! End-to-end tests that hit real LLM APIs and reference sources.
//! Run with: cargo test -p mindmap-server --test e2e_tests -- --ignored

use axum::body::Body;
use axum::http::{Request, header};
use http_body_util::BodyExt;
use tower::ServiceExt;

use mindmap_server::config::ServerConfig;
use mindmap_server::state::AppState;

/// Create the full app router from the process environment.
fn app() -> axum::Router {
    let config = ServerConfig::from_env().expect("valid server configuration");
    mindmap_server::app_router(AppState::new(config).expect("app state"))
}

fn parse_sse_events(body: &[u8]) -> Vec<serde_json::Value> {
    let text = String::from_utf8_lossy(body);
    text.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str(data.trim()).ok())
        .collect()
}

fn generate_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
#[ignore]
async fn e2e_generate_grok() {
    std::env::var("XAI_API_KEY").expect("XAI_API_KEY must be set");
    let body = serde_json::json!({
        "topic": "Photosynthesis",
        "model": "grok-3-mini",
        "depth": 3
    });

    let resp = app()
        .oneshot(generate_request("/generate-mindmap", body))
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let result: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let markdown = result["markdown"].as_str().unwrap();
    assert!(markdown.starts_with("# "), "Expected a title heading");
    assert!(!markdown.lines().any(|l| l.starts_with("#####")));
    assert!(result["usage"]["total_tokens"].as_u64().unwrap() > 0);
}

#[tokio::test]
#[ignore]
async fn e2e_stream_claude_with_enrichment() {
    std::env::var("ANTHROPIC_API_KEY").expect("ANTHROPIC_API_KEY must be set");
    let body = serde_json::json!({
        "topic": "JavaScript closures",
        "model": "claude-3-5-haiku-20241022",
        "depth": 2,
        "web_enrichment": true
    });

    let resp = app()
        .oneshot(generate_request("/generate-mindmap/stream", body))
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let events = parse_sse_events(&bytes);
    assert!(!events.is_empty(), "Expected SSE events");

    let has_text = events.iter().any(|e| e["event"] == "text");
    assert!(has_text, "Expected streamed markdown");
    assert_eq!(events.last().unwrap()["event"], "done");
}
