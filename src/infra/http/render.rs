use std::{io, sync::Arc};

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, header::CONTENT_TYPE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::BodyExt;
use serde::Deserialize;

use crate::{
    application::{engine::RenderEngine, error::EngineError},
    domain::{Document, Orientation},
};

#[derive(Clone)]
pub struct RenderState {
    pub engine: Arc<RenderEngine>,
    pub endpoint: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RenderRequest {
    content: String,
    engine: Option<String>,
    document: DocumentOptions,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct DocumentOptions {
    orientation: Option<String>,
    encoding: Option<String>,
}

/// The rendering gateway. `POST` on the configured endpoint is handled here;
/// every other request passes through unmodified to the next handler.
pub async fn pdf_gateway(
    State(state): State<RenderState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() != Method::POST || request.uri().path() != state.endpoint {
        return next.run(request).await;
    }

    match render_response(&state, request).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn render_response(
    state: &RenderState,
    request: Request<Body>,
) -> Result<Response, EngineError> {
    // Fully buffered in and out; this surface does not stream.
    let body = request
        .into_body()
        .collect()
        .await
        .map_err(|err| EngineError::Io(io::Error::other(err)))?
        .to_bytes();

    let parsed: RenderRequest = if body.is_empty() {
        RenderRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| EngineError::render(format!("invalid request body: {err}")))?
    };

    let mut document = Document::new(parsed.content);
    if let Some(orientation) = parsed.document.orientation.as_deref() {
        document.set_orientation(Orientation::parse(orientation));
    }
    if let Some(encoding) = parsed.document.encoding {
        document.set_encoding(encoding);
    }

    let engine = parsed
        .engine
        .unwrap_or_else(|| state.engine.default_engine().to_string());
    let pdf = state.engine.generate(&engine, &document).await?;

    Ok(([(CONTENT_TYPE, "application/pdf")], pdf).into_response())
}
