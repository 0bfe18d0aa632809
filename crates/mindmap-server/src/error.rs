use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use mindmap_core::error::{MindmapError, ModelError, PipelineError};

use crate::config::Environment;

pub const RATE_LIMIT_MESSAGE: &str = "Too many requests, please try again after 15 minutes";

/// Application error type that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    RateLimited,
    Forbidden(String),
    Mindmap(MindmapError),
}

impl From<MindmapError> for AppError {
    fn from(err: MindmapError) -> Self {
        AppError::Mindmap(err)
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Invalid request", msg.clone()),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests",
                RATE_LIMIT_MESSAGE.into(),
            ),
            AppError::Forbidden(origin) => (
                StatusCode::FORBIDDEN,
                "Forbidden",
                format!("Origin {origin} is not allowed"),
            ),
            AppError::Mindmap(MindmapError::Pipeline(
                err @ (PipelineError::InvalidTopic(_) | PipelineError::InvalidOption(_)),
            )) => (StatusCode::BAD_REQUEST, "Invalid request", err.to_string()),
            AppError::Mindmap(MindmapError::Model(ModelError::Auth(msg))) => (
                StatusCode::BAD_GATEWAY,
                "Model provider rejected the credentials",
                msg.clone(),
            ),
            AppError::Mindmap(MindmapError::Model(err @ ModelError::RateLimited { .. })) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Model provider is busy",
                err.to_string(),
            ),
            AppError::Mindmap(MindmapError::Model(err)) => (
                StatusCode::BAD_GATEWAY,
                "Model provider error",
                err.to_string(),
            ),
            AppError::Mindmap(MindmapError::Pipeline(
                err @ PipelineError::Render(_),
            )) => (
                StatusCode::BAD_GATEWAY,
                "Failed to generate mindmap",
                err.to_string(),
            ),
            AppError::Mindmap(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to generate mindmap",
                err.to_string(),
            ),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.parts().0
    }

    /// Render the error; outside production the body also carries `details`.
    pub fn into_response_for(self, environment: Environment) -> Response {
        let (status, error, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(%status, error = ?self, "request failed");
        }
        let body = if environment.is_production() {
            json!({ "error": error, "message": message })
        } else {
            json!({ "error": error, "message": message, "details": format!("{self:?}") })
        };
        (status, axum::Json(body)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.into_response_for(Environment::Production)
    }
}
