pub mod api;
pub mod config;
pub mod cors;
pub mod error;
pub mod rate_limit;
pub mod sse;
pub mod state;
pub mod types;

use axum::{Router, middleware};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app_router(state: AppState) -> Router {
    let cors = cors::cors_layer(&state.config.allowed_origins);

    api::api_routes(state.clone())
        .layer(cors)
        .layer(middleware::from_fn_with_state(state, cors::enforce_origin))
        .layer(middleware::from_fn(cors::preflight_no_content))
        .layer(TraceLayer::new_for_http())
}
