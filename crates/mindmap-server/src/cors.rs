//! Browser-facing CORS: headers via `tower_http`, plus a hard 403 for
//! origins outside the allow-list and 204 for every preflight.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::AllowedOrigins;
use crate::error::AppError;
use crate::state::AppState;

pub fn cors_layer(origins: &AllowedOrigins) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    match origins {
        AllowedOrigins::Any => layer.allow_origin(Any),
        AllowedOrigins::List(list) => {
            let values: Vec<HeaderValue> = list
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok())
                .collect();
            layer.allow_origin(AllowOrigin::list(values))
        }
    }
}

/// Reject requests whose `Origin` is not allowed. Requests without one pass.
pub async fn enforce_origin(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .map(|v| v.to_str().unwrap_or_default().to_string());
    if let Some(origin) = origin {
        if !state.config.allowed_origins.allows(&origin) {
            tracing::warn!(%origin, path = %req.uri().path(), "origin rejected by CORS policy");
            return AppError::Forbidden(origin).into_response();
        }
    }
    next.run(req).await
}

/// Answer `OPTIONS` with an empty 204, keeping whatever CORS headers the inner layers set.
pub async fn preflight_no_content(req: Request, next: Next) -> Response {
    if req.method() != Method::OPTIONS {
        return next.run(req).await;
    }
    let response = next.run(req).await;
    if response.status() == StatusCode::FORBIDDEN {
        return response;
    }
    let (mut parts, _) = response.into_parts();
    parts.status = StatusCode::NO_CONTENT;
    parts.headers.remove(header::CONTENT_TYPE);
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::empty())
}
