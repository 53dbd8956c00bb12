//! The loop engine: observe, think, act until the model stops calling tools.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bon::Builder;
use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use super::control::{EventEmitter, ExecutionControl, LoopState};
use super::events::{AgentEvent, EventStream};
use super::gateway::{InvocationContext, ToolGateway};
use super::limits::estimate_context_tokens;
use crate::approval::{ApprovalCoordinator, ApprovalPolicy};
use crate::error::{Result, WardenError};
use crate::provider::{
    CompletionEvent, CompletionOptions, CompletionProvider, CompletionRequest, ToolDefinition,
};
use crate::tools::ToolSet;
use crate::types::{ContentPart, Message, Role, Task, TaskState, ToolCall, ToolResult, Usage};

/// Default cap on loop passes per execution.
pub const DEFAULT_MAX_ITERATIONS: usize = 25;

/// Static configuration for one agent.
#[derive(Debug, Clone, Builder)]
pub struct AgentConfig {
    #[builder(into)]
    pub name: String,
    /// System instructions placed ahead of the task message.
    #[builder(into, default)]
    pub instructions: String,
    #[builder(default)]
    pub tools: ToolSet,
    #[builder(default = DEFAULT_MAX_ITERATIONS)]
    pub max_iterations: usize,
    #[builder(default)]
    pub approval_policy: ApprovalPolicy,
    pub approval_timeout: Option<Duration>,
    /// Fail with `ContextOverflow` once the estimated context exceeds this.
    pub context_window_tokens: Option<usize>,
    #[builder(default = Duration::from_millis(100))]
    pub pause_poll_interval: Duration,
    #[builder(default)]
    pub working_directory: PathBuf,
    #[builder(default)]
    pub options: CompletionOptions,
}

/// Drives one task at a time for one agent.
///
/// Cloning yields another handle to the same engine.
#[derive(Clone)]
pub struct AgentLoop {
    config: Arc<AgentConfig>,
    provider: Arc<dyn CompletionProvider>,
    gateway: Arc<ToolGateway>,
    control: Arc<ExecutionControl>,
}

struct Turn {
    message: Message,
    tool_calls: Vec<ToolCall>,
    usage: Usage,
}

impl AgentLoop {
    pub fn new(
        config: AgentConfig,
        provider: Arc<dyn CompletionProvider>,
        coordinator: Arc<ApprovalCoordinator>,
    ) -> Self {
        Self::with_gateway(config, provider, ToolGateway::new(coordinator))
    }

    /// Build an engine around a gateway that already carries hooks.
    pub fn with_gateway(
        config: AgentConfig,
        provider: Arc<dyn CompletionProvider>,
        gateway: ToolGateway,
    ) -> Self {
        Self {
            config: Arc::new(config),
            provider,
            gateway: Arc::new(gateway),
            control: Arc::new(ExecutionControl::new()),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn gateway(&self) -> &ToolGateway {
        &self.gateway
    }

    pub fn state(&self) -> LoopState {
        self.control.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<LoopState> {
        self.control.watch()
    }

    pub fn is_idle(&self) -> bool {
        self.state() == LoopState::Idle
    }

    /// Id of the task currently executing, if any.
    pub fn current_task(&self) -> Option<String> {
        self.control.current_task()
    }

    /// Start executing `task` and return its event stream.
    ///
    /// Fails with [`WardenError::TaskAlreadyRunning`] while another task owns
    /// the engine.
    pub fn execute(&self, task: Task) -> Result<EventStream> {
        let token = self.control.begin(&task.id)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let emitter = EventEmitter::new(tx);
        let task_id = task.id.clone();
        let run = tokio::spawn(self.clone().run(task, token, emitter.clone()));
        let control = Arc::clone(&self.control);
        tokio::spawn(async move {
            let Err(err) = run.await else { return };
            if !err.is_panic() {
                return;
            }
            // A crashed run never reached `finish`; report it as a failure.
            tracing::error!(task_id = %task_id, "execution panicked");
            control.finish(LoopState::Failed);
            emitter.emit(AgentEvent::Failed {
                error: Arc::new(WardenError::ExecutionPanicked(task_id)),
            });
            emitter.emit(AgentEvent::StateChanged {
                state: TaskState::Failed,
            });
        });
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    /// Pause at the next checkpoint. No-op unless running.
    pub fn pause(&self) -> bool {
        let paused = self.control.pause();
        if paused {
            tracing::debug!(agent = %self.config.name, "execution paused");
        }
        paused
    }

    /// No-op unless paused.
    pub fn resume(&self) -> bool {
        let resumed = self.control.resume();
        if resumed {
            tracing::debug!(agent = %self.config.name, "execution resumed");
        }
        resumed
    }

    /// Request cancellation and release any approval the task waits on.
    pub fn cancel(&self) -> bool {
        let task_id = self.control.current_task();
        let cancelled = self.control.cancel();
        if cancelled {
            if let Some(task_id) = task_id {
                let released = self.gateway.coordinator().cancel_task(&task_id);
                tracing::info!(task_id = %task_id, released, "execution cancel requested");
            }
        }
        cancelled
    }

    async fn run(self, task: Task, token: CancellationToken, emitter: EventEmitter) {
        let started = Instant::now();
        tracing::info!(agent = %self.config.name, task_id = %task.id, "execution started");
        emitter.emit(AgentEvent::TaskSubmitted {
            task_id: task.id.clone(),
        });
        emitter.emit(AgentEvent::StateChanged {
            state: TaskState::Working,
        });

        let outcome = self.drive(&task, &token, &emitter).await;
        match outcome {
            Ok((result, usage)) => {
                let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                tracing::info!(task_id = %task.id, duration_ms, "execution completed");
                self.control.finish(LoopState::Completed);
                emitter.emit(AgentEvent::Completed {
                    result,
                    duration_ms,
                    usage,
                });
                emitter.emit(AgentEvent::StateChanged {
                    state: TaskState::Completed,
                });
            }
            Err(err) if token.is_cancelled() && is_cancellation(&err) => {
                tracing::info!(task_id = %task.id, "execution cancelled");
                self.control.finish(LoopState::Cancelled);
                emitter.emit(AgentEvent::Cancelled);
                emitter.emit(AgentEvent::StateChanged {
                    state: TaskState::Cancelled,
                });
            }
            Err(err) => {
                tracing::warn!(task_id = %task.id, error = %err, "execution failed");
                self.control.finish(LoopState::Failed);
                emitter.emit(AgentEvent::Failed {
                    error: Arc::new(err),
                });
                emitter.emit(AgentEvent::StateChanged {
                    state: TaskState::Failed,
                });
            }
        }
    }

    async fn drive(
        &self,
        task: &Task,
        token: &CancellationToken,
        emitter: &EventEmitter,
    ) -> Result<(Message, Usage)> {
        let config = &self.config;
        let mut messages = Vec::with_capacity(2);
        if !config.instructions.is_empty() {
            messages.push(Message::system(config.instructions.clone()));
        }
        messages.push(task.message.clone());

        let definitions = config.tools.definitions();
        let invocation = InvocationContext {
            task_id: &task.id,
            tools: &config.tools,
            policy: task.config.approval_policy.unwrap_or(config.approval_policy),
            approval_timeout: task.config.approval_timeout.or(config.approval_timeout),
            working_directory: &config.working_directory,
            emitter,
            token,
        };
        let mut usage = Usage::default();
        let mut iteration = 0usize;

        loop {
            if token.is_cancelled() {
                return Err(WardenError::TaskCancelled);
            }
            iteration += 1;
            if iteration > config.max_iterations {
                return Err(WardenError::MaxIterationsExceeded {
                    max: config.max_iterations,
                });
            }
            emitter.emit(AgentEvent::Working {
                iteration,
                description: None,
            });

            if let Some(limit) = config.context_window_tokens {
                let used = estimate_context_tokens(&messages);
                if used > limit {
                    return Err(WardenError::ContextOverflow { used, limit });
                }
            }

            let turn = self
                .complete_turn(&messages, &definitions, token, emitter)
                .await?;
            usage.merge(&turn.usage);
            tracing::debug!(
                task_id = %task.id,
                iteration,
                tool_calls = turn.tool_calls.len(),
                "iteration complete"
            );

            messages.push(turn.message.clone());
            emitter.emit(AgentEvent::Message {
                message: turn.message.clone(),
            });
            if turn.tool_calls.is_empty() {
                return Ok((turn.message, usage));
            }

            for call in &turn.tool_calls {
                if token.is_cancelled() {
                    return Err(WardenError::TaskCancelled);
                }
                let output = self.gateway.invoke(call, &invocation).await?;
                let result = ToolResult {
                    tool_call_id: call.id.clone(),
                    content: output.content,
                    is_error: output.is_error,
                };
                messages.push(Message::tool_result(result.clone()));
                emitter.emit(AgentEvent::ToolResult { result });
            }

            self.control
                .wait_while_paused(token, config.pause_poll_interval)
                .await?;
            if token.is_cancelled() {
                return Err(WardenError::TaskCancelled);
            }
        }
    }

    /// One provider call: stream text and tool calls into an assistant message.
    async fn complete_turn(
        &self,
        messages: &[Message],
        definitions: &[ToolDefinition],
        token: &CancellationToken,
        emitter: &EventEmitter,
    ) -> Result<Turn> {
        let request = CompletionRequest {
            messages: messages.to_vec(),
            tools: definitions.to_vec(),
            options: self.config.options.clone(),
        };
        let mut stream = self
            .provider
            .complete(request)
            .await
            .map_err(provider_error)?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let mut usage = Usage::default();
        loop {
            let event = tokio::select! {
                _ = token.cancelled() => return Err(WardenError::TaskCancelled),
                event = stream.next() => event,
            };
            let Some(event) = event else { break };
            match event.map_err(provider_error)? {
                CompletionEvent::Text(fragment) | CompletionEvent::TextDelta(fragment) => {
                    if !fragment.is_empty() {
                        text.push_str(&fragment);
                        emitter.emit(AgentEvent::TextDelta { text: fragment });
                    }
                }
                CompletionEvent::ToolCall(call) => {
                    emitter.emit(AgentEvent::ToolCall { call: call.clone() });
                    tool_calls.push(call);
                }
                CompletionEvent::Usage(reported) => usage.merge(&reported),
                CompletionEvent::Error(message) => {
                    return Err(WardenError::CompletionProvider(message));
                }
                CompletionEvent::Done => break,
            }
        }

        let mut content = Vec::with_capacity(tool_calls.len() + 1);
        if !text.is_empty() {
            content.push(ContentPart::Text { text });
        }
        content.extend(tool_calls.iter().cloned().map(ContentPart::ToolUse));
        Ok(Turn {
            message: Message::new(Role::Assistant, content),
            tool_calls,
            usage,
        })
    }
}

impl std::fmt::Debug for AgentLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentLoop")
            .field("agent", &self.config.name)
            .field("provider", &self.provider.name())
            .field("state", &self.state())
            .finish()
    }
}

fn provider_error(err: WardenError) -> WardenError {
    match err {
        WardenError::CompletionProvider(_) => err,
        other => WardenError::CompletionProvider(other.to_string()),
    }
}

fn is_cancellation(err: &WardenError) -> bool {
    matches!(
        err,
        WardenError::TaskCancelled | WardenError::ApprovalCancelled(_)
    )
}
