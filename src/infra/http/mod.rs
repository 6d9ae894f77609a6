mod middleware;
mod render;

pub use render::{RenderState, pdf_gateway};

use axum::{
    Router,
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    routing::get,
};

use middleware::{log_responses, set_request_context};

/// Assemble the service router: the rendering gateway wraps a minimal inner
/// surface (health probe plus the default 404 fallback), with response
/// logging and request ids outermost.
pub fn build_router(state: RenderState) -> Router {
    Router::new()
        .route("/_health", get(health))
        .layer(from_fn_with_state(state, pdf_gateway))
        .layer(from_fn(log_responses))
        .layer(from_fn(set_request_context))
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}
