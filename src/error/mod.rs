//! Error types for Warden.

pub mod unified;

pub use unified::{codes, ErrorCategory};

use thiserror::Error;

/// Primary error type for all Warden operations.
#[derive(Error, Debug)]
pub enum WardenError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task already running: {0}")]
    TaskAlreadyRunning(String),

    #[error("Task cancelled")]
    TaskCancelled,

    #[error("Execution of task {0} panicked")]
    ExecutionPanicked(String),

    #[error("Approval denied for tool '{tool}'{}", reason_suffix(.reason))]
    ApprovalDenied {
        tool: String,
        reason: Option<String>,
    },

    #[error("Approval timed out for tool '{tool}'")]
    ApprovalTimeout { tool: String },

    #[error("Approval request cancelled: {0}")]
    ApprovalCancelled(String),

    #[error("Approval request not found: {0}")]
    ApprovalNotFound(String),

    #[error("Tool execution error: {tool}: {message}")]
    ToolExecutionFailed { tool: String, message: String },

    #[error("Completion provider error: {0}")]
    CompletionProvider(String),

    #[error("Context overflow: {used} estimated tokens exceed the {limit} token window")]
    ContextOverflow { used: usize, limit: usize },

    #[error("Maximum iterations exceeded ({max})")]
    MaxIterationsExceeded { max: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WardenError {
    /// Create a tool execution error.
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecutionFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::TaskNotFound(_)
            | Self::TaskAlreadyRunning(_)
            | Self::TaskCancelled
            | Self::ExecutionPanicked(_)
            | Self::InvalidState(_) => ErrorCategory::Task,
            Self::ApprovalDenied { .. }
            | Self::ApprovalTimeout { .. }
            | Self::ApprovalCancelled(_)
            | Self::ApprovalNotFound(_) => ErrorCategory::Approval,
            Self::ToolExecutionFailed { .. } => ErrorCategory::ToolExecution,
            Self::CompletionProvider(_) => ErrorCategory::Provider,
            Self::ContextOverflow { .. } | Self::MaxIterationsExceeded { .. } => {
                ErrorCategory::Limits
            }
            Self::InvalidConfiguration(_) => ErrorCategory::Configuration,
            Self::InvalidParams(_) => ErrorCategory::Protocol,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Io(_) => ErrorCategory::Io,
        }
    }

    /// JSON-RPC error code used when this error crosses the wire.
    pub fn rpc_code(&self) -> i64 {
        match self {
            Self::TaskNotFound(_) | Self::ApprovalNotFound(_) => codes::TASK_NOT_FOUND,
            Self::InvalidState(_) => codes::TASK_NOT_CANCELABLE,
            Self::TaskAlreadyRunning(_) => codes::UNSUPPORTED_OPERATION,
            Self::InvalidParams(_) | Self::Serialization(_) => codes::INVALID_PARAMS,
            _ => codes::INTERNAL_ERROR,
        }
    }

    /// Whether this error means the caller referenced something unknown.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TaskNotFound(_) | Self::ApprovalNotFound(_))
    }
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(": {r}"))
        .unwrap_or_default()
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, WardenError>;
