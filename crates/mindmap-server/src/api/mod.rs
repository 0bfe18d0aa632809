pub mod health;
pub mod mindmap;

use axum::{Router, middleware};

use crate::rate_limit::rate_limit;
use crate::state::AppState;

pub fn api_routes(state: AppState) -> Router {
    let limited = mindmap::routes()
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));
    Router::new()
        .merge(health::routes())
        .merge(limited)
        .with_state(state)
}
