//! Shared test helpers: a scripted completion provider and mock tools.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use warden::agent_loop::{AgentConfig, AgentEvent, AgentLoop, EventStream};
use warden::approval::{ApprovalCoordinator, RiskLevel};
use warden::error::WardenError;
use warden::provider::{CompletionEvent, CompletionProvider, CompletionRequest, CompletionStream};
use warden::tools::{AgentTool, AgentToolParameters, Tool, ToolOutput, ToolSet};
use warden::types::{ToolCall, Usage};

/// A provider that replays queued turns, then a fallback turn forever.
pub struct ScriptedProvider {
    turns: Mutex<VecDeque<Vec<CompletionEvent>>>,
    fallback: Vec<CompletionEvent>,
    requests: Mutex<Vec<CompletionRequest>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            turns: Mutex::new(VecDeque::new()),
            fallback: text_turn("Mock response"),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer every call with `turn` once the queue is empty.
    pub fn repeating(turn: Vec<CompletionEvent>) -> Self {
        Self {
            fallback: turn,
            ..Self::new()
        }
    }

    pub fn queue(self, turn: Vec<CompletionEvent>) -> Self {
        self.turns.lock().unwrap().push_back(turn);
        self
    }

    pub fn queue_text(self, text: &str) -> Self {
        self.queue(text_turn(text))
    }

    pub fn queue_tool_call(self, id: &str, name: &str, input: serde_json::Value) -> Self {
        self.queue(tool_turn(id, name, input))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionStream, WardenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        Ok(futures::stream::iter(turn.into_iter().map(Ok)).boxed())
    }
}

/// A provider whose stream never yields.
pub struct HangingProvider;

#[async_trait]
impl CompletionProvider for HangingProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionStream, WardenError> {
        Ok(futures::stream::pending().boxed())
    }
}

pub fn text_turn(text: &str) -> Vec<CompletionEvent> {
    vec![
        CompletionEvent::TextDelta(text.to_string()),
        CompletionEvent::Usage(Usage {
            input_tokens: 10,
            output_tokens: 20,
            total_tokens: 30,
        }),
        CompletionEvent::Done,
    ]
}

pub fn tool_turn(id: &str, name: &str, input: serde_json::Value) -> Vec<CompletionEvent> {
    vec![
        CompletionEvent::ToolCall(ToolCall::new(id, name, input)),
        CompletionEvent::Usage(Usage {
            input_tokens: 10,
            output_tokens: 5,
            total_tokens: 15,
        }),
        CompletionEvent::Done,
    ]
}

/// Echoes its `text` argument.
pub fn echo_tool() -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "echo",
        "Echo the input text",
        AgentToolParameters::object()
            .string("text", "Text to echo", true)
            .build(),
        |args, _ctx| async move {
            let text = args.get_str("text")?;
            Ok(ToolOutput::success(text))
        },
    ))
}

/// A high-risk tool that requires approval and reports the input it ran with.
pub fn risky_tool(name: &str) -> Arc<dyn Tool> {
    let label = name.to_string();
    Arc::new(
        AgentTool::new(
            name,
            "Destructive operation",
            AgentToolParameters::object()
                .string("path", "Target path", true)
                .build(),
            move |args, _ctx| {
                let label = label.clone();
                async move { Ok(ToolOutput::success(format!("{label}: {}", args.raw()))) }
            },
        )
        .with_approval(RiskLevel::High)
        .with_describer(|args| format!("Delete {}", args.get_str_opt("path").unwrap_or("?"))),
    )
}

/// A tool whose execution always fails.
pub fn failing_tool() -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "explode",
        "Always fails",
        AgentToolParameters::empty(),
        |_args, _ctx| async { Err(WardenError::tool("explode", "boom")) },
    ))
}

/// A tool that sleeps before answering and ignores cancellation while it does.
pub fn slow_tool(delay: Duration) -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "slow",
        "Takes a while",
        AgentToolParameters::empty(),
        move |_args, _ctx| async move {
            tokio::time::sleep(delay).await;
            Ok(ToolOutput::success("slow done"))
        },
    ))
}

/// A tool whose handler panics.
pub fn crashing_tool() -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "crash",
        "Panics when called",
        AgentToolParameters::empty(),
        |args, _ctx| async move {
            if args.raw().is_object() {
                panic!("crash tool blew up");
            }
            Ok(ToolOutput::success("unreachable"))
        },
    ))
}

pub fn tool_set(tools: Vec<Arc<dyn Tool>>) -> ToolSet {
    ToolSet::new(tools).unwrap()
}

pub fn agent_config(tools: Vec<Arc<dyn Tool>>) -> AgentConfig {
    AgentConfig::builder()
        .name("test-agent")
        .instructions("You are a test agent.")
        .tools(tool_set(tools))
        .pause_poll_interval(Duration::from_millis(10))
        .build()
}

pub fn agent(
    provider: Arc<dyn CompletionProvider>,
    tools: Vec<Arc<dyn Tool>>,
    coordinator: Arc<ApprovalCoordinator>,
) -> AgentLoop {
    AgentLoop::new(agent_config(tools), provider, coordinator)
}

/// Drain an event stream, bounded by a timeout.
pub async fn collect(stream: EventStream) -> Vec<AgentEvent> {
    tokio::time::timeout(Duration::from_secs(5), stream.collect::<Vec<_>>())
        .await
        .expect("event stream should end")
}

/// Read events until `pred` matches, returning everything seen.
pub async fn read_until(
    stream: &mut EventStream,
    pred: impl Fn(&AgentEvent) -> bool,
) -> Vec<AgentEvent> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("event should arrive")
            .expect("stream ended early");
        let done = pred(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

/// Wait until `check` holds, polling briefly.
pub async fn eventually(check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

/// Compact labels for asserting event order.
pub fn labels(events: &[AgentEvent]) -> Vec<String> {
    events
        .iter()
        .map(|event| match event {
            AgentEvent::TaskSubmitted { .. } => "submitted".to_string(),
            AgentEvent::Working { iteration, .. } => format!("working:{iteration}"),
            AgentEvent::InputRequired { .. } => "input-required".to_string(),
            AgentEvent::Message { .. } => "message".to_string(),
            AgentEvent::ToolCall { call } => format!("tool-call:{}", call.name),
            AgentEvent::ToolResult { .. } => "tool-result".to_string(),
            AgentEvent::TextDelta { .. } => "delta".to_string(),
            AgentEvent::Completed { .. } => "completed".to_string(),
            AgentEvent::Failed { .. } => "failed".to_string(),
            AgentEvent::Cancelled => "cancelled".to_string(),
            AgentEvent::StateChanged { state } => format!("state:{state}"),
        })
        .collect()
}
