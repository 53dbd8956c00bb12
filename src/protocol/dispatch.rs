//! JSON-RPC method dispatch over a [`TaskManager`].

use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::json;

use super::jsonrpc::{JsonRpcError, JsonRpcId, JsonRpcRequest, JsonRpcResponse};
use super::task_manager::{TaskManager, UpdateStream};
use super::types::{ApprovalRespondParams, MessageSendParams, TaskIdParams, TaskQueryParams};

pub const METHOD_SEND: &str = "message/send";
pub const METHOD_STREAM: &str = "message/stream";
pub const METHOD_GET: &str = "tasks/get";
pub const METHOD_LIST: &str = "tasks/list";
pub const METHOD_CANCEL: &str = "tasks/cancel";
pub const METHOD_APPROVALS_LIST: &str = "approvals/list";
pub const METHOD_APPROVALS_RESPOND: &str = "approvals/respond";

/// A dispatched call: one response, or a stream of responses.
pub enum RpcReply {
    Single(JsonRpcResponse),
    Stream(BoxStream<'static, JsonRpcResponse>),
}

impl std::fmt::Debug for RpcReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(response) => f.debug_tuple("Single").field(response).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Wrap each streamed update in a success response carrying the request id.
pub fn wrap_updates(id: Option<JsonRpcId>, updates: UpdateStream) -> BoxStream<'static, JsonRpcResponse> {
    updates
        .map(move |update| JsonRpcResponse::from_result(id.clone(), &update))
        .boxed()
}

pub async fn dispatch(manager: &TaskManager, request: JsonRpcRequest) -> RpcReply {
    let id = request.id.clone();
    tracing::debug!(method = %request.method, id = ?id, "rpc call");
    let outcome = match request.method.as_str() {
        METHOD_SEND => match request.params::<MessageSendParams>() {
            Ok(params) => manager
                .send_message(params)
                .await
                .map(|task| JsonRpcResponse::from_result(id.clone(), &task))
                .map_err(JsonRpcError::from),
            Err(err) => Err(err),
        },
        METHOD_STREAM => {
            let started = request
                .params::<MessageSendParams>()
                .and_then(|params| manager.send_message_streaming(params).map_err(JsonRpcError::from));
            return match started {
                Ok(updates) => RpcReply::Stream(wrap_updates(id, updates)),
                Err(err) => RpcReply::Single(JsonRpcResponse::error(id, err)),
            };
        }
        METHOD_GET => request.params::<TaskQueryParams>().and_then(|params| {
            manager
                .get_task(&params.id, params.history_length)
                .map(|task| JsonRpcResponse::from_result(id.clone(), &task))
                .map_err(JsonRpcError::from)
        }),
        METHOD_LIST => Ok(JsonRpcResponse::from_result(id.clone(), &manager.list_tasks())),
        METHOD_CANCEL => request.params::<TaskIdParams>().and_then(|params| {
            manager
                .cancel_task(&params.id)
                .map(|task| JsonRpcResponse::from_result(id.clone(), &task))
                .map_err(JsonRpcError::from)
        }),
        METHOD_APPROVALS_LIST => Ok(JsonRpcResponse::from_result(
            id.clone(),
            &manager.pending_approvals(),
        )),
        METHOD_APPROVALS_RESPOND => request.params::<ApprovalRespondParams>().and_then(|params| {
            manager
                .respond_approval(&params.id, params.response)
                .map(|()| JsonRpcResponse::success(id.clone(), json!({ "id": params.id })))
                .map_err(JsonRpcError::from)
        }),
        other => Err(JsonRpcError::method_not_found(other)),
    };
    RpcReply::Single(outcome.unwrap_or_else(|err| JsonRpcResponse::error(id, err)))
}
