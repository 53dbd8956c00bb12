//! Agent-to-agent protocol: JSON-RPC envelopes, SSE framing, and the task
//! manager that projects loop-engine executions onto protocol tasks.

pub mod dispatch;
pub mod jsonrpc;
pub mod mapping;
pub mod sse;
pub mod task_manager;
pub mod types;

pub use dispatch::{dispatch, RpcReply};
pub use jsonrpc::{JsonRpcError, JsonRpcId, JsonRpcPayload, JsonRpcRequest, JsonRpcResponse};
pub use sse::{frame, SseDecoder};
pub use task_manager::{AgentFactory, TaskManager, UpdateStream};
pub use types::*;
