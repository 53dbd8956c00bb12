//! Tool execution gateway: approval gating, hooks, then the tool itself.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::control::EventEmitter;
use super::events::AgentEvent;
use crate::approval::{ApprovalCoordinator, ApprovalPolicy, ApprovalRequest, ApprovalResponse};
use crate::error::{Result, WardenError};
use crate::tools::{Tool, ToolArguments, ToolExecutionContext, ToolOutput, ToolSet};
use crate::types::{TaskState, ToolCall};

/// Runs before a tool executes; an `Err` vetoes the call.
pub type BeforeToolHook = Arc<
    dyn Fn(ToolCall, ToolExecutionContext) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>
        + Send
        + Sync,
>;

/// Runs after a tool executes, detached from the owning task.
pub type AfterToolHook = Arc<
    dyn Fn(ToolCall, ToolOutput) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>
        + Send
        + Sync,
>;

/// Per-call inputs owned by the running execution.
pub(crate) struct InvocationContext<'a> {
    pub task_id: &'a str,
    pub tools: &'a ToolSet,
    pub policy: ApprovalPolicy,
    pub approval_timeout: Option<Duration>,
    pub working_directory: &'a PathBuf,
    pub emitter: &'a EventEmitter,
    pub token: &'a CancellationToken,
}

/// Resolves, gates and executes tool calls for an agent.
pub struct ToolGateway {
    coordinator: Arc<ApprovalCoordinator>,
    before_hooks: Vec<BeforeToolHook>,
    after_hooks: Vec<AfterToolHook>,
    tracker: TaskTracker,
}

impl ToolGateway {
    pub fn new(coordinator: Arc<ApprovalCoordinator>) -> Self {
        Self {
            coordinator,
            before_hooks: Vec::new(),
            after_hooks: Vec::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Register a hook that runs before each tool call; an `Err` vetoes it.
    pub fn with_before_hook<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(ToolCall, ToolExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.before_hooks
            .push(Arc::new(move |call, ctx| Box::pin(hook(call, ctx))));
        self
    }

    /// Register a hook that runs detached after each successful tool call.
    pub fn with_after_hook<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(ToolCall, ToolOutput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.after_hooks
            .push(Arc::new(move |call, output| Box::pin(hook(call, output))));
        self
    }

    pub fn coordinator(&self) -> &Arc<ApprovalCoordinator> {
        &self.coordinator
    }

    /// Wait for detached after-hooks to finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Run one tool call.
    ///
    /// An unknown tool yields an error-flagged output; approval outcomes
    /// other than approval surface as errors.
    pub(crate) async fn invoke(
        &self,
        call: &ToolCall,
        ctx: &InvocationContext<'_>,
    ) -> Result<ToolOutput> {
        let Some(tool) = ctx.tools.get(&call.name) else {
            tracing::warn!(task_id = ctx.task_id, tool = %call.name, "unknown tool requested");
            return Ok(ToolOutput::error(format!("Unknown tool: {}", call.name)));
        };
        let tool = Arc::clone(tool);
        let exec_ctx = ToolExecutionContext {
            task_id: ctx.task_id.to_string(),
            tool_call_id: call.id.clone(),
            working_directory: ctx.working_directory.clone(),
        };
        let args = ToolArguments::new(call.input.clone());

        if ctx.policy.requires_approval(tool.as_ref()) {
            let request = ApprovalRequest::action(
                ctx.task_id,
                &call.name,
                &call.id,
                call.input.clone(),
                tool.describe_action(&args),
                tool.risk_level(),
            );
            // Registered before it is announced so observers can answer at once.
            let decision = self.coordinator.register(request.clone())?;
            ctx.emitter.emit(AgentEvent::InputRequired { request });
            ctx.emitter.emit(AgentEvent::StateChanged {
                state: TaskState::InputRequired,
            });

            // Losing the race drops `decision`, which withdraws the request.
            let response = tokio::select! {
                biased;
                _ = ctx.token.cancelled() => {
                    tracing::debug!(task_id = ctx.task_id, tool = %call.name, "approval wait cancelled");
                    return Err(WardenError::TaskCancelled);
                }
                response = decision.wait(ctx.approval_timeout) => response?,
            };
            tracing::debug!(task_id = ctx.task_id, tool = %call.name, ?response, "approval resolved");

            match response {
                ApprovalResponse::Approved => {
                    ctx.emitter.emit(AgentEvent::StateChanged {
                        state: TaskState::Working,
                    });
                }
                ApprovalResponse::Denied { reason } => {
                    return Err(WardenError::ApprovalDenied {
                        tool: call.name.clone(),
                        reason,
                    });
                }
                ApprovalResponse::Modified { input } => {
                    ctx.emitter.emit(AgentEvent::StateChanged {
                        state: TaskState::Working,
                    });
                    return run_tool(tool.as_ref(), &ToolArguments::new(input), &exec_ctx).await;
                }
                ApprovalResponse::Timeout => {
                    return Err(WardenError::ApprovalTimeout {
                        tool: call.name.clone(),
                    });
                }
            }
        }

        for hook in &self.before_hooks {
            if let Err(err) = hook(call.clone(), exec_ctx.clone()).await {
                tracing::info!(task_id = ctx.task_id, tool = %call.name, error = %err, "tool call vetoed");
                return Err(WardenError::tool(
                    &call.name,
                    format!("vetoed by before hook: {err}"),
                ));
            }
        }

        let output = run_tool(tool.as_ref(), &args, &exec_ctx).await?;
        self.spawn_after_hooks(call, &output);
        Ok(output)
    }

    fn spawn_after_hooks(&self, call: &ToolCall, output: &ToolOutput) {
        for hook in &self.after_hooks {
            let fut = hook(call.clone(), output.clone());
            let tool = call.name.clone();
            self.tracker.spawn(async move {
                if let Err(err) = fut.await {
                    tracing::warn!(tool = %tool, error = %err, "after hook failed");
                }
            });
        }
    }
}

impl std::fmt::Debug for ToolGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolGateway")
            .field("before_hooks", &self.before_hooks.len())
            .field("after_hooks", &self.after_hooks.len())
            .finish()
    }
}

async fn run_tool(
    tool: &dyn Tool,
    args: &ToolArguments,
    ctx: &ToolExecutionContext,
) -> Result<ToolOutput> {
    tool.execute(args, ctx).await.map_err(|err| match err {
        WardenError::ToolExecutionFailed { .. } => err,
        other => WardenError::tool(tool.name(), other.to_string()),
    })
}
