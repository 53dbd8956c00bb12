//! Tool trait and closure-based tool wrapper.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use super::arguments::ToolArguments;
use super::types::{AgentToolParameters, ToolOutput};
use crate::approval::RiskLevel;
use crate::error::WardenError;

/// Context available during tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolExecutionContext {
    /// Task that owns this invocation.
    pub task_id: String,
    /// Tool call id from the model.
    pub tool_call_id: String,
    /// Working directory handed over by the session collaborator.
    pub working_directory: PathBuf,
}

/// A capability agents can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match what the model calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema parameters.
    fn parameters(&self) -> &AgentToolParameters;

    /// Whether a call must be approved before it runs.
    fn requires_approval(&self) -> bool {
        false
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Low
    }

    /// Describe one specific call for the person approving it.
    fn describe_action(&self, args: &ToolArguments) -> String {
        format!("Run {} with {}", self.name(), args.raw())
    }

    /// Execute the tool with parsed arguments.
    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<ToolOutput, WardenError>;
}

type ToolHandler = dyn Fn(
        ToolArguments,
        ToolExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, WardenError>> + Send>>
    + Send
    + Sync;

type DescribeFn = dyn Fn(&ToolArguments) -> String + Send + Sync;

/// Closure-based tool for quick tool creation.
pub struct AgentTool {
    name: String,
    description: String,
    parameters: AgentToolParameters,
    requires_approval: bool,
    risk_level: RiskLevel,
    describe: Option<Arc<DescribeFn>>,
    handler: Arc<ToolHandler>,
}

impl AgentTool {
    /// Create a tool from a closure.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: AgentToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments, ToolExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, WardenError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            requires_approval: false,
            risk_level: RiskLevel::Low,
            describe: None,
            handler: Arc::new(move |args, ctx| Box::pin(handler(args, ctx))),
        }
    }

    /// Gate calls behind approval at the given risk level.
    pub fn with_approval(mut self, risk_level: RiskLevel) -> Self {
        self.requires_approval = true;
        self.risk_level = risk_level;
        self
    }

    pub fn with_risk_level(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = risk_level;
        self
    }

    pub fn with_describer(
        mut self,
        describe: impl Fn(&ToolArguments) -> String + Send + Sync + 'static,
    ) -> Self {
        self.describe = Some(Arc::new(describe));
        self
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &AgentToolParameters {
        &self.parameters
    }

    fn requires_approval(&self) -> bool {
        self.requires_approval
    }

    fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    fn describe_action(&self, args: &ToolArguments) -> String {
        match &self.describe {
            Some(describe) => describe(args),
            None => format!("Run {} with {}", self.name, args.raw()),
        }
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<ToolOutput, WardenError> {
        (self.handler)(args.clone(), ctx.clone()).await
    }
}

impl std::fmt::Debug for AgentTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTool")
            .field("name", &self.name)
            .field("requires_approval", &self.requires_approval)
            .field("risk_level", &self.risk_level)
            .finish()
    }
}
