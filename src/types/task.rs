//! Tasks and the task state machine shared by the loop engine and the protocol layer.

use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use super::message::Message;
use crate::approval::ApprovalPolicy;

/// One unit of requested work.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub context_id: String,
    pub message: Message,
    pub config: TaskConfig,
}

impl Task {
    /// Create a task with generated task and context ids.
    pub fn new(message: Message) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            context_id: Uuid::new_v4().to_string(),
            message,
            config: TaskConfig::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_context_id(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = context_id.into();
        self
    }

    pub fn with_config(mut self, config: TaskConfig) -> Self {
        self.config = config;
        self
    }
}

/// Per-task execution configuration.
#[derive(Debug, Clone, Default, Builder)]
pub struct TaskConfig {
    /// Whether a non-streaming caller waits for the task to settle.
    #[builder(default)]
    pub blocking: bool,
    /// Overrides the approval wait limit for this task.
    pub approval_timeout: Option<Duration>,
    /// Overrides the agent's approval policy for this task.
    pub approval_policy: Option<ApprovalPolicy>,
}

/// Task lifecycle state.
///
/// `SUBMITTED → WORKING → {INPUT_REQUIRED, AUTH_REQUIRED} ↔ WORKING →
/// {COMPLETED, FAILED, CANCELLED, REJECTED}`; the final four are absorbing.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    AuthRequired,
    Completed,
    Failed,
    #[serde(rename = "canceled")]
    #[strum(serialize = "canceled")]
    Cancelled,
    Rejected,
}

impl TaskState {
    /// Whether no further transition is permitted.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Rejected
        )
    }

    /// Whether the task is blocked on a caller decision.
    pub fn is_interrupted(self) -> bool {
        matches!(self, Self::InputRequired | Self::AuthRequired)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Re-entering the same non-terminal state is allowed so that status
    /// messages can be refreshed while working.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        if self.is_terminal() {
            return false;
        }
        if self == next {
            return true;
        }
        match self {
            Submitted => matches!(next, Working | Failed | Cancelled | Rejected),
            Working => true,
            InputRequired | AuthRequired => {
                matches!(next, Working | Failed | Cancelled | Rejected)
            }
            Completed | Failed | Cancelled | Rejected => false,
        }
    }
}
