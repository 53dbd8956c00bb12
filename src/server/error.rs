use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::error::WardenError;
use crate::protocol::JsonRpcResponse;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind HTTP listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// A runtime error rendered as an HTTP status with a JSON-RPC error body.
#[derive(Debug)]
pub struct ApiError(pub WardenError);

impl From<WardenError> for ApiError {
    fn from(err: WardenError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            err if err.is_not_found() => StatusCode::NOT_FOUND,
            WardenError::InvalidState(_) | WardenError::TaskAlreadyRunning(_) => StatusCode::CONFLICT,
            WardenError::InvalidParams(_) | WardenError::Serialization(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = JsonRpcResponse::error(None, (&self.0).into());
        (status, Json(body)).into_response()
    }
}
