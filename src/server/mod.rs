//! HTTP surface for the task manager.

mod error;
pub mod routes;
mod sse;

use std::net::SocketAddr;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::{ApiError, ServerError};
pub use sse::{sse_body_stream, sse_response};

use crate::protocol::TaskManager;

/// Build the router over `manager`.
pub fn router(manager: TaskManager) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", post(routes::rpc))
        .route("/.well-known/agent.json", get(routes::agent_card))
        .route("/message", post(routes::send_message))
        .route("/message/stream", post(routes::stream_message))
        .route("/task/{id}", get(routes::get_task))
        .route("/task/{id}/cancel", post(routes::cancel_task))
        .route("/tasks", get(routes::list_tasks))
        .route("/approvals", get(routes::list_approvals))
        .route("/approvals/{id}", post(routes::respond_approval))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(manager)
}

/// Serve on an already-bound listener until the connection loop ends.
pub async fn serve(listener: TcpListener, manager: TaskManager) -> Result<(), ServerError> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "A2A server ready to accept connections");
    }
    axum::serve(listener, router(manager).into_make_service())
        .await
        .map_err(ServerError::Serve)
}

/// Bind `addr` and serve.
pub async fn bind_and_serve(addr: SocketAddr, manager: TaskManager) -> Result<(), ServerError> {
    info!(%addr, "Binding A2A server");
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    serve(listener, manager).await
}
