//! Error classification shared by the loop engine and the protocol layer.

use serde::{Deserialize, Serialize};

/// Broad error category for routing error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Task lookup or task lifecycle problems.
    Task,
    /// A human or policy decision stopped the execution.
    Approval,
    ToolExecution,
    Provider,
    Limits,
    Configuration,
    Protocol,
    Serialization,
    Io,
}

/// Standard JSON-RPC 2.0 and A2A error codes.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    pub const TASK_NOT_FOUND: i64 = -32001;
    pub const TASK_NOT_CANCELABLE: i64 = -32002;
    pub const UNSUPPORTED_OPERATION: i64 = -32004;
}
