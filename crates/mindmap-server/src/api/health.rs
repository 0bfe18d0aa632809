use axum::{Json, Router, extract::State, routing::get};

use crate::state::AppState;
use crate::types::HealthResponse;

pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(health))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let config = &state.config;
    Json(HealthResponse {
        status: "ok".into(),
        message: "Mindmap Backend API is running".into(),
        api_key_configured: config.default_model_key_configured(),
        model: config.default_model.clone(),
        environment: config.environment.to_string(),
    })
}
