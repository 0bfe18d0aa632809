use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use mindmap_core::model::ChatModel;
use mindmap_llm::provider::Provider;
use mindmap_pipeline::event::PipelineEvent;
use mindmap_pipeline::orchestrator::Pipeline;

use crate::error::AppError;
use crate::sse::{sse_event, sse_response};
use crate::state::AppState;
use crate::types::{GenerateParams, GenerateRequest, GenerateResponse};

const EVENT_BUFFER: usize = 32;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/generate-mindmap", post(generate_mindmap))
        .route("/generate-mindmap/stream", post(generate_mindmap_stream))
}

async fn generate_mindmap(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Response {
    let environment = state.config.environment;
    let result = async {
        let (pipeline, params) = prepare(&state, payload)?;
        let output = pipeline.run(&params.topic, &params.options).await?;
        Ok::<_, AppError>(GenerateResponse::from(output))
    }
    .await;

    match result {
        Ok(body) => Json(body).into_response(),
        Err(err) => err.into_response_for(environment),
    }
}

/// Validation failures are answered with a plain JSON error before the
/// stream opens; later failures arrive as an `error` event.
async fn generate_mindmap_stream(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Response {
    let (pipeline, params) = match prepare(&state, payload) {
        Ok(prepared) => prepared,
        Err(err) => return err.into_response_for(state.config.environment),
    };

    let (tx, rx) = mpsc::channel::<PipelineEvent>(EVENT_BUFFER);
    tokio::spawn(async move {
        pipeline
            .run_streaming(&params.topic, &params.options, tx)
            .await;
    });

    let stream = ReceiverStream::new(rx).map(|event| sse_event(&event));
    sse_response(stream).into_response()
}

/// Validate the body and build a pipeline bound to the requested model.
fn prepare(
    state: &AppState,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<(Pipeline, GenerateParams), AppError> {
    let Json(req) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    let params = req.into_params(&state.config.default_model)?;

    let provider = Provider::for_model(&params.model).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Unsupported model '{}': expected a grok-* or claude-* model",
            params.model
        ))
    })?;
    let api_key = state.config.api_key_for(provider).ok_or_else(|| {
        AppError::BadRequest(format!("No API key configured for {provider}"))
    })?;

    tracing::info!(topic = %params.topic, model = %params.model, "mindmap requested");
    let model: Arc<dyn ChatModel> = Arc::from((state.model_factory)(
        &provider,
        api_key.to_string(),
        params.model.clone(),
    ));
    let pipeline = Pipeline::new(model, state.enricher.clone())
        .with_enrichment_budget(state.config.enrichment_budget);
    Ok((pipeline, params))
}
