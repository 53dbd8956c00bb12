//! HTTP handlers. JSON-RPC bodies go through the protocol dispatcher; the
//! resource-style routes answer with plain JSON.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::error::ApiError;
use super::sse::{sse_body_stream, sse_response};
use crate::approval::{ApprovalRequest, ApprovalResponse};
use crate::protocol::dispatch::{METHOD_SEND, METHOD_STREAM};
use crate::protocol::{
    dispatch, AgentCard, JsonRpcRequest, JsonRpcResponse, ProtocolTask, RpcReply, TaskManager,
};

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub history_length: Option<usize>,
}

pub async fn agent_card(State(manager): State<TaskManager>) -> Json<AgentCard> {
    Json(manager.agent_card().clone())
}

/// `POST /`: any JSON-RPC method.
pub async fn rpc(State(manager): State<TaskManager>, body: Bytes) -> Response {
    handle_rpc(&manager, &body, None).await
}

/// `POST /message`: JSON-RPC wrapping a non-streaming send.
pub async fn send_message(State(manager): State<TaskManager>, body: Bytes) -> Response {
    handle_rpc(&manager, &body, Some(METHOD_SEND)).await
}

/// `POST /message/stream`: JSON-RPC wrapping a streaming send.
pub async fn stream_message(State(manager): State<TaskManager>, body: Bytes) -> Response {
    handle_rpc(&manager, &body, Some(METHOD_STREAM)).await
}

async fn handle_rpc(manager: &TaskManager, body: &[u8], method: Option<&str>) -> Response {
    let mut request = match JsonRpcRequest::parse(body) {
        Ok(request) => request,
        Err((id, error)) => {
            tracing::debug!(code = error.code, "rejected rpc body");
            return (StatusCode::BAD_REQUEST, Json(JsonRpcResponse::error(id, error)))
                .into_response();
        }
    };
    if let Some(method) = method {
        request.method = method.to_string();
    }
    match dispatch(manager, request).await {
        RpcReply::Single(response) => Json(response).into_response(),
        RpcReply::Stream(responses) => sse_response(sse_body_stream(responses)),
    }
}

pub async fn get_task(
    State(manager): State<TaskManager>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ProtocolTask>, ApiError> {
    Ok(Json(manager.get_task(&id, query.history_length)?))
}

pub async fn list_tasks(State(manager): State<TaskManager>) -> Json<Vec<ProtocolTask>> {
    Json(manager.list_tasks())
}

pub async fn cancel_task(
    State(manager): State<TaskManager>,
    Path(id): Path<String>,
) -> Result<Json<ProtocolTask>, ApiError> {
    Ok(Json(manager.cancel_task(&id)?))
}

pub async fn list_approvals(State(manager): State<TaskManager>) -> Json<Vec<ApprovalRequest>> {
    Json(manager.pending_approvals())
}

pub async fn respond_approval(
    State(manager): State<TaskManager>,
    Path(id): Path<String>,
    Json(response): Json<ApprovalResponse>,
) -> Result<Json<serde_json::Value>, ApiError> {
    manager.respond_approval(&id, response)?;
    Ok(Json(json!({ "id": id })))
}
