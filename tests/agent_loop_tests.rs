//! Loop engine behaviour: iteration, tool calls, approvals, and control signals.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::*;
use warden::agent_loop::{AgentConfig, AgentEvent, AgentLoop, LoopState};
use warden::approval::{ApprovalCoordinator, ApprovalPolicy, ApprovalResponse};
use warden::error::WardenError;
use warden::provider::CompletionEvent;
use warden::types::{ContentPart, Message, Role, Task, TaskConfig, ToolCall};

fn failure(events: &[AgentEvent]) -> Arc<WardenError> {
    events
        .iter()
        .find_map(|event| match event {
            AgentEvent::Failed { error } => Some(error.clone()),
            _ => None,
        })
        .expect("execution should fail")
}

fn tool_results(events: &[AgentEvent]) -> Vec<warden::types::ToolResult> {
    events
        .iter()
        .filter_map(|event| match event {
            AgentEvent::ToolResult { result } => Some(result.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn no_tool_calls_completes_after_one_iteration() {
    let provider = Arc::new(ScriptedProvider::new().queue_text("All done."));
    let coordinator = Arc::new(ApprovalCoordinator::default());
    let agent = agent(provider.clone(), vec![], coordinator);

    let events = collect(agent.execute(Task::new(Message::user("hello"))).unwrap()).await;

    assert_eq!(
        labels(&events),
        vec![
            "submitted",
            "state:working",
            "working:1",
            "delta",
            "message",
            "completed",
            "state:completed",
        ]
    );
    match &events[5] {
        AgentEvent::Completed { result, usage, .. } => {
            assert_eq!(result.role, Role::Assistant);
            assert_eq!(result.text(), "All done.");
            assert_eq!(usage.total_tokens, 30);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(provider.calls(), 1);
    assert!(agent.is_idle());
}

#[tokio::test]
async fn instructions_lead_the_context() {
    let provider = Arc::new(ScriptedProvider::new());
    let coordinator = Arc::new(ApprovalCoordinator::default());
    let agent = agent(provider.clone(), vec![echo_tool()], coordinator);

    collect(agent.execute(Task::new(Message::user("hello"))).unwrap()).await;

    let request = &provider.requests()[0];
    assert_eq!(request.messages.len(), 2);
    assert_eq!(request.messages[0].role, Role::System);
    assert_eq!(request.messages[0].text(), "You are a test agent.");
    assert_eq!(request.messages[1].text(), "hello");
    assert_eq!(request.tools.len(), 1);
    assert_eq!(request.tools[0].name, "echo");
}

#[tokio::test]
async fn tool_call_result_feeds_the_next_iteration() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .queue_tool_call("call-1", "echo", json!({"text": "ping"}))
            .queue_text("pong received"),
    );
    let coordinator = Arc::new(ApprovalCoordinator::default());
    let agent = agent(provider.clone(), vec![echo_tool()], coordinator);

    let events = collect(agent.execute(Task::new(Message::user("go"))).unwrap()).await;

    assert_eq!(
        labels(&events),
        vec![
            "submitted",
            "state:working",
            "working:1",
            "tool-call:echo",
            "message",
            "tool-result",
            "working:2",
            "delta",
            "message",
            "completed",
            "state:completed",
        ]
    );
    let results = tool_results(&events);
    assert_eq!(results[0].content, "ping");
    assert!(!results[0].is_error);

    let second = &provider.requests()[1];
    let last = second.messages.last().unwrap();
    assert!(matches!(
        &last.content[0],
        ContentPart::ToolResult(result) if result.tool_call_id == "call-1" && result.content == "ping"
    ));
    let assistant = &second.messages[second.messages.len() - 2];
    assert_eq!(assistant.tool_calls().len(), 1);
}

#[tokio::test]
async fn unknown_tool_yields_error_output_and_task_continues() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .queue_tool_call("call-1", "frobnicate", json!({}))
            .queue_text("recovered"),
    );
    let coordinator = Arc::new(ApprovalCoordinator::default());
    let agent = agent(provider, vec![echo_tool()], coordinator);

    let events = collect(agent.execute(Task::new(Message::user("go"))).unwrap()).await;

    let results = tool_results(&events);
    assert!(results[0].is_error);
    assert!(results[0].content.contains("frobnicate"));
    assert!(matches!(events.last(), Some(AgentEvent::StateChanged { .. })));
    assert!(events
        .iter()
        .any(|event| matches!(event, AgentEvent::Completed { result, .. } if result.text() == "recovered")));
}

#[tokio::test]
async fn exceeding_max_iterations_fails() {
    let provider = Arc::new(ScriptedProvider::repeating(tool_turn(
        "loop",
        "echo",
        json!({"text": "again"}),
    )));
    let coordinator = Arc::new(ApprovalCoordinator::default());
    let config = AgentConfig {
        max_iterations: 3,
        ..agent_config(vec![echo_tool()])
    };
    let agent = AgentLoop::new(config, provider.clone(), coordinator);

    let events = collect(agent.execute(Task::new(Message::user("go"))).unwrap()).await;

    let iterations: Vec<usize> = events
        .iter()
        .filter_map(|event| match event {
            AgentEvent::Working { iteration, .. } => Some(*iteration),
            _ => None,
        })
        .collect();
    assert_eq!(iterations, vec![1, 2, 3]);
    assert!(matches!(
        failure(&events).as_ref(),
        WardenError::MaxIterationsExceeded { max: 3 }
    ));
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn tool_execution_failure_fails_the_task() {
    let provider = Arc::new(ScriptedProvider::new().queue_tool_call("c1", "explode", json!({})));
    let coordinator = Arc::new(ApprovalCoordinator::default());
    let agent = agent(provider, vec![failing_tool()], coordinator);

    let events = collect(agent.execute(Task::new(Message::user("go"))).unwrap()).await;

    match failure(&events).as_ref() {
        WardenError::ToolExecutionFailed { tool, message } => {
            assert_eq!(tool, "explode");
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn provider_error_event_fails_the_task() {
    let provider = Arc::new(ScriptedProvider::new().queue(vec![
        CompletionEvent::TextDelta("partial".into()),
        CompletionEvent::Error("rate limited".into()),
    ]));
    let coordinator = Arc::new(ApprovalCoordinator::default());
    let agent = agent(provider, vec![], coordinator);

    let events = collect(agent.execute(Task::new(Message::user("go"))).unwrap()).await;

    assert!(matches!(
        failure(&events).as_ref(),
        WardenError::CompletionProvider(message) if message == "rate limited"
    ));
    assert_eq!(agent.state(), LoopState::Idle);
}

#[tokio::test]
async fn context_window_guard_fails_before_calling_the_provider() {
    let provider = Arc::new(ScriptedProvider::new());
    let coordinator = Arc::new(ApprovalCoordinator::default());
    let config = AgentConfig {
        context_window_tokens: Some(5),
        ..agent_config(vec![])
    };
    let agent = AgentLoop::new(config, provider.clone(), coordinator);

    let events = collect(
        agent
            .execute(Task::new(Message::user("a fairly long request body")))
            .unwrap(),
    )
    .await;

    assert!(matches!(
        failure(&events).as_ref(),
        WardenError::ContextOverflow { limit: 5, .. }
    ));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn approved_call_runs_and_returns_to_working() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .queue_tool_call("c1", "rm", json!({"path": "/tmp/x"}))
            .queue_text("deleted"),
    );
    let coordinator = Arc::new(ApprovalCoordinator::default());
    let agent = agent(provider, vec![risky_tool("rm")], coordinator.clone());

    let mut stream = agent.execute(Task::new(Message::user("clean up"))).unwrap();
    let seen = read_until(&mut stream, |event| {
        matches!(event, AgentEvent::InputRequired { .. })
    })
    .await;
    let request = match seen.last() {
        Some(AgentEvent::InputRequired { request }) => request.clone(),
        other => panic!("unexpected event {other:?}"),
    };
    assert_eq!(request.description, "Delete /tmp/x");
    assert_eq!(request.risk_level, warden::approval::RiskLevel::High);

    // The request is registered before it is announced.
    assert!(coordinator.is_pending(&request.id));
    coordinator
        .respond(&request.id, ApprovalResponse::Approved)
        .unwrap();

    let rest = collect(stream).await;
    let rest_labels = labels(&rest);
    assert_eq!(rest_labels[0], "state:input-required");
    assert_eq!(rest_labels[1], "state:working");
    assert_eq!(rest_labels[2], "tool-result");
    assert!(rest_labels.contains(&"completed".to_string()));
}

#[tokio::test]
async fn denied_call_fails_with_reason() {
    let provider = Arc::new(ScriptedProvider::new().queue_tool_call("c1", "X", json!({"path": "/"})));
    let coordinator = Arc::new(ApprovalCoordinator::default());
    let agent = agent(provider, vec![risky_tool("X")], coordinator.clone());

    let mut stream = agent.execute(Task::new(Message::user("go"))).unwrap();
    read_until(&mut stream, |event| matches!(event, AgentEvent::InputRequired { .. })).await;
    assert_eq!(coordinator.pending().len(), 1);
    let id = coordinator.pending()[0].id.clone();
    coordinator
        .respond(&id, ApprovalResponse::denied("not allowed"))
        .unwrap();

    let rest = collect(stream).await;
    match failure(&rest).as_ref() {
        WardenError::ApprovalDenied { tool, reason } => {
            assert_eq!(tool, "X");
            assert_eq!(reason.as_deref(), Some("not allowed"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn modified_call_runs_with_replacement_input() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .queue_tool_call("c1", "rm", json!({"path": "/"}))
            .queue_text("ok"),
    );
    let coordinator = Arc::new(ApprovalCoordinator::default());
    let agent = agent(provider, vec![risky_tool("rm")], coordinator.clone());

    let mut stream = agent.execute(Task::new(Message::user("go"))).unwrap();
    read_until(&mut stream, |event| matches!(event, AgentEvent::InputRequired { .. })).await;
    assert_eq!(coordinator.pending().len(), 1);
    let id = coordinator.pending()[0].id.clone();
    coordinator
        .respond(
            &id,
            ApprovalResponse::Modified {
                input: json!({"path": "/tmp/safe"}),
            },
        )
        .unwrap();

    let rest = collect(stream).await;
    let results = tool_results(&rest);
    assert!(results[0].content.contains("/tmp/safe"));
    assert!(!results[0].content.contains("\"/\""));
}

#[tokio::test]
async fn approval_timeout_from_task_config_fails_the_task() {
    let provider = Arc::new(ScriptedProvider::new().queue_tool_call("c1", "rm", json!({"path": "/"})));
    let coordinator = Arc::new(ApprovalCoordinator::default());
    let agent = agent(provider, vec![risky_tool("rm")], coordinator.clone());

    let config = TaskConfig::builder()
        .approval_timeout(Duration::from_millis(50))
        .build();
    let events = collect(
        agent
            .execute(Task::new(Message::user("go")).with_config(config))
            .unwrap(),
    )
    .await;

    assert!(matches!(
        failure(&events).as_ref(),
        WardenError::ApprovalTimeout { tool } if tool == "rm"
    ));
    assert!(coordinator.pending().is_empty());
}

#[tokio::test]
async fn task_policy_override_skips_approval() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .queue_tool_call("c1", "rm", json!({"path": "/tmp"}))
            .queue_text("done"),
    );
    let coordinator = Arc::new(ApprovalCoordinator::default());
    let agent = agent(provider, vec![risky_tool("rm")], coordinator);

    let config = TaskConfig::builder()
        .approval_policy(ApprovalPolicy::AutoApprove)
        .build();
    let events = collect(
        agent
            .execute(Task::new(Message::user("go")).with_config(config))
            .unwrap(),
    )
    .await;

    assert!(!labels(&events).contains(&"input-required".to_string()));
    assert_eq!(tool_results(&events).len(), 1);
}

#[tokio::test]
async fn second_execution_on_busy_agent_is_rejected() {
    let coordinator = Arc::new(ApprovalCoordinator::default());
    let agent = agent(Arc::new(HangingProvider), vec![], coordinator);

    let stream = agent.execute(Task::new(Message::user("one")).with_id("t1")).unwrap();
    let err = agent
        .execute(Task::new(Message::user("two")).with_id("t2"))
        .err().unwrap();
    assert!(matches!(err, WardenError::TaskAlreadyRunning(ref id) if id == "t1"));

    assert!(agent.cancel());
    let events = collect(stream).await;
    assert_eq!(
        labels(&events[events.len() - 2..]),
        vec!["cancelled", "state:canceled"]
    );
    assert_eq!(agent.state(), LoopState::Idle);

    let again = agent.execute(Task::new(Message::user("three")));
    assert!(again.is_ok());
    agent.cancel();
}

#[tokio::test]
async fn cancel_releases_a_pending_approval() {
    let provider = Arc::new(ScriptedProvider::new().queue_tool_call("c1", "rm", json!({"path": "/"})));
    let coordinator = Arc::new(ApprovalCoordinator::default());
    let agent = agent(provider, vec![risky_tool("rm")], coordinator.clone());

    let mut stream = agent.execute(Task::new(Message::user("go"))).unwrap();
    read_until(&mut stream, |event| matches!(event, AgentEvent::InputRequired { .. })).await;
    assert_eq!(coordinator.pending().len(), 1);

    assert!(agent.cancel());
    let rest = collect(stream).await;

    assert!(rest.iter().any(|event| matches!(event, AgentEvent::Cancelled)));
    assert!(!rest.iter().any(|event| matches!(event, AgentEvent::Failed { .. })));
    assert!(coordinator.pending().is_empty());
}

#[tokio::test]
async fn cancel_during_a_tool_call_skips_the_remaining_calls() {
    let provider = Arc::new(ScriptedProvider::new().queue(vec![
        CompletionEvent::ToolCall(ToolCall::new("c1", "slow", json!({}))),
        CompletionEvent::ToolCall(ToolCall::new("c2", "rm", json!({"path": "/x"}))),
        CompletionEvent::Done,
    ]));
    let coordinator = Arc::new(ApprovalCoordinator::default());
    let agent = agent(
        provider,
        vec![slow_tool(Duration::from_millis(200)), risky_tool("rm")],
        coordinator.clone(),
    );

    let stream = agent.execute(Task::new(Message::user("go"))).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(agent.cancel());
    let events = collect(stream).await;

    assert!(events.iter().any(|event| matches!(event, AgentEvent::Cancelled)));
    assert!(!events
        .iter()
        .any(|event| matches!(event, AgentEvent::InputRequired { .. })));
    assert_eq!(tool_results(&events).len(), 1);
    assert!(coordinator.pending().is_empty());
    assert!(agent.is_idle());
    assert!(agent.execute(Task::new(Message::user("again"))).is_ok());
}

#[tokio::test]
async fn panicking_tool_fails_the_task_and_frees_the_agent() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .queue_tool_call("c1", "crash", json!({}))
            .queue_text("unreachable"),
    );
    let coordinator = Arc::new(ApprovalCoordinator::default());
    let agent = agent(provider, vec![crashing_tool()], coordinator);

    let events = collect(agent.execute(Task::new(Message::user("go"))).unwrap()).await;

    let error = failure(&events);
    assert!(matches!(*error, WardenError::ExecutionPanicked(_)));
    assert_eq!(
        labels(&events[events.len() - 2..]),
        vec!["failed", "state:failed"]
    );
    assert!(!events
        .iter()
        .any(|event| matches!(event, AgentEvent::Completed { .. })));
    assert!(agent.is_idle());
    assert!(agent.execute(Task::new(Message::user("again"))).is_ok());
}

#[tokio::test]
async fn pause_holds_at_the_checkpoint_until_resumed() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .queue_tool_call("c1", "echo", json!({"text": "x"}))
            .queue_text("finished"),
    );
    let coordinator = Arc::new(ApprovalCoordinator::default());
    let agent = agent(provider.clone(), vec![echo_tool()], coordinator);

    let mut stream = agent.execute(Task::new(Message::user("go"))).unwrap();
    assert!(agent.pause());
    assert!(!agent.pause());
    read_until(&mut stream, |event| matches!(event, AgentEvent::ToolResult { .. })).await;

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(provider.calls(), 1);
    assert_eq!(agent.state(), LoopState::Paused);

    assert!(agent.resume());
    let rest = collect(stream).await;
    assert_eq!(labels(&rest)[0], "working:2");
    assert!(rest.iter().any(|event| matches!(event, AgentEvent::Completed { .. })));
}

#[tokio::test]
async fn cancel_while_paused_is_observed() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .queue_tool_call("c1", "echo", json!({"text": "x"}))
            .queue_text("never reached"),
    );
    let coordinator = Arc::new(ApprovalCoordinator::default());
    let agent = agent(provider.clone(), vec![echo_tool()], coordinator);

    let mut stream = agent.execute(Task::new(Message::user("go"))).unwrap();
    agent.pause();
    read_until(&mut stream, |event| matches!(event, AgentEvent::ToolResult { .. })).await;

    assert!(agent.cancel());
    let rest = collect(stream).await;
    assert_eq!(labels(&rest), vec!["cancelled", "state:canceled"]);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn pause_and_resume_are_noops_when_idle() {
    let coordinator = Arc::new(ApprovalCoordinator::default());
    let agent = agent(Arc::new(ScriptedProvider::new()), vec![], coordinator);
    assert!(!agent.pause());
    assert!(!agent.resume());
    assert!(!agent.cancel());
    assert_eq!(agent.state(), LoopState::Idle);
}
