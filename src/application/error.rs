use std::{error::Error as StdError, io};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{application::engine::ProcessError, infra::error::InfraError};

/// Diagnostic chain attached to failed responses so the logging middleware
/// can report the full cause without leaking it past the process boundary.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Failure taxonomy of the rendering pipeline. None of these are retried;
/// all of them surface as 500 with the Display text as the response body.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("render failed: {0}")]
    Render(String),
    #[error("i/o error during render: {0}")]
    Io(#[from] io::Error),
}

impl EngineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn render(message: impl Into<String>) -> Self {
        Self::Render(message.into())
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        // The renderer's diagnostic text goes through verbatim; this is an
        // internal-tool surface and the text is what aids debugging.
        let mut response = (status, self.to_string()).into_response();
        ErrorReport::from_error("application::error::EngineError", status, &self)
            .attach(&mut response);
        response
    }
}

/// Top-level bootstrap error for the binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
