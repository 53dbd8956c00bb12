//! Approval request, response, and policy types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::tools::Tool;

/// Risk classification for a tool or an action.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

/// One step of a plan submitted for bulk review.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanStep {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default)]
    pub risk_level: RiskLevel,
}

/// What is being asked of the approver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalKind {
    /// A single risky tool call.
    Action {
        tool: String,
        tool_call_id: String,
        input: serde_json::Value,
    },
    /// Ordered steps needing bulk review.
    Plan { steps: Vec<PlanStep> },
    /// The agent needs more information.
    Input { prompt: String },
    /// A yes/no question.
    Confirmation { question: String },
}

/// A pending decision owned by one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalRequest {
    pub id: String,
    pub task_id: String,
    pub description: String,
    pub risk_level: RiskLevel,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: ApprovalKind,
}

impl ApprovalRequest {
    /// Create a request with a generated id.
    pub fn new(
        task_id: impl Into<String>,
        description: impl Into<String>,
        risk_level: RiskLevel,
        kind: ApprovalKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            description: description.into(),
            risk_level,
            created_at: Utc::now(),
            kind,
        }
    }

    /// Action request for one tool call.
    pub fn action(
        task_id: impl Into<String>,
        tool: impl Into<String>,
        tool_call_id: impl Into<String>,
        input: serde_json::Value,
        description: impl Into<String>,
        risk_level: RiskLevel,
    ) -> Self {
        Self::new(
            task_id,
            description,
            risk_level,
            ApprovalKind::Action {
                tool: tool.into(),
                tool_call_id: tool_call_id.into(),
                input,
            },
        )
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// The single decision that resolves a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalResponse {
    Approved,
    Denied {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Approve, but run with replacement input.
    Modified { input: serde_json::Value },
    Timeout,
}

impl ApprovalResponse {
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::Denied {
            reason: Some(reason.into()),
        }
    }
}

/// Which tool calls are routed through the coordinator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", content = "min_risk", rename_all = "snake_case")]
pub enum ApprovalPolicy {
    /// Ask when the tool declares `requires_approval`.
    #[default]
    Ask,
    /// Never ask; every call runs.
    AutoApprove,
    /// Ask for every call.
    AlwaysAsk,
    /// Ask when the tool's risk is at least the given level.
    RiskAtLeast(RiskLevel),
}

impl ApprovalPolicy {
    pub fn requires_approval(&self, tool: &dyn Tool) -> bool {
        match self {
            Self::Ask => tool.requires_approval(),
            Self::AutoApprove => false,
            Self::AlwaysAsk => true,
            Self::RiskAtLeast(min) => tool.risk_level() >= *min,
        }
    }
}

/// Broadcast to coordinator observers.
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalNotice {
    Requested(ApprovalRequest),
    Resolved {
        id: String,
        response: ApprovalResponse,
    },
    Cancelled {
        id: String,
    },
}
