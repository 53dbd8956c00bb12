//! Convenience re-exports for common use.

pub use crate::agent_loop::{AgentConfig, AgentEvent, AgentLoop, LoopState, ToolGateway};
pub use crate::approval::{
    ApprovalCoordinator, ApprovalPolicy, ApprovalRequest, ApprovalResponse, RiskLevel,
};
pub use crate::config::RuntimeConfig;
pub use crate::error::{Result, WardenError};
pub use crate::protocol::{AgentCard, AgentFactory, ProtocolMessage, ProtocolTask, TaskManager};
pub use crate::provider::{CompletionEvent, CompletionProvider, CompletionRequest, CompletionStream};
pub use crate::tools::{AgentTool, AgentToolParameters, Tool, ToolArguments, ToolOutput, ToolSet};
pub use crate::types::{Message, Role, Task, TaskConfig, TaskState, ToolCall, Usage};
