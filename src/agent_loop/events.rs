//! Events emitted by one task execution.

use std::sync::Arc;

use futures::stream::BoxStream;

use crate::approval::ApprovalRequest;
use crate::error::WardenError;
use crate::types::{Message, TaskState, ToolCall, ToolResult, Usage};

/// Ordered event stream for one execution.
pub type EventStream = BoxStream<'static, AgentEvent>;

/// Everything an execution reports, in the order it happens.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    TaskSubmitted {
        task_id: String,
    },
    Working {
        iteration: usize,
        description: Option<String>,
    },
    InputRequired {
        request: ApprovalRequest,
    },
    Message {
        message: Message,
    },
    ToolCall {
        call: ToolCall,
    },
    ToolResult {
        result: ToolResult,
    },
    TextDelta {
        text: String,
    },
    Completed {
        result: Message,
        duration_ms: u64,
        usage: Usage,
    },
    Failed {
        error: Arc<WardenError>,
    },
    Cancelled,
    StateChanged {
        state: TaskState,
    },
}

impl AgentEvent {
    /// Whether the event ends the externally visible run
    /// (input-required pauses it for the caller).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::InputRequired { .. } | Self::Cancelled
        )
    }
}
