//! Conversions between loop-engine values and protocol values.

use uuid::Uuid;

use super::types::{Artifact, MessageRole, Part, ProtocolMessage};
use crate::agent_loop::AgentEvent;
use crate::approval::ApprovalRequest;
use crate::types::{ContentPart, Message, Role, TaskState};

pub const RESULT_ARTIFACT_NAME: &str = "result";

/// Internal task message built from the text parts of a protocol message.
pub fn to_task_message(message: &ProtocolMessage) -> Message {
    Message::user(message.text())
}

/// Project an internal message onto the wire.
pub fn from_message(message: &Message) -> ProtocolMessage {
    let role = match message.role {
        Role::User => MessageRole::User,
        Role::System | Role::Assistant => MessageRole::Agent,
    };
    let parts = message
        .content
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => Part::text(text.clone()),
            ContentPart::File(file) => Part::File { file: file.clone() },
            ContentPart::Data { data } => Part::Data { data: data.clone() },
            other => Part::Data {
                data: serde_json::to_value(other).unwrap_or_default(),
            },
        })
        .collect();
    ProtocolMessage::new(role, parts)
}

/// Agent message describing a pending approval; the request rides along as data.
pub fn approval_message(request: &ApprovalRequest) -> ProtocolMessage {
    let mut parts = vec![Part::text(request.description.clone())];
    if let Ok(data) = serde_json::to_value(request) {
        parts.push(Part::Data { data });
    }
    ProtocolMessage::new(MessageRole::Agent, parts)
}

pub fn result_artifact(result: &Message) -> Artifact {
    Artifact {
        artifact_id: Uuid::new_v4().to_string(),
        name: Some(RESULT_ARTIFACT_NAME.to_string()),
        description: None,
        parts: vec![Part::text(result.text())],
    }
}

/// Status change implied by an event, if any.
pub fn status_change(event: &AgentEvent) -> Option<(TaskState, Option<ProtocolMessage>)> {
    match event {
        AgentEvent::Completed { result, .. } => {
            Some((TaskState::Completed, Some(from_message(result))))
        }
        AgentEvent::Failed { error } => Some((
            TaskState::Failed,
            Some(ProtocolMessage::agent_text(error.to_string())),
        )),
        AgentEvent::InputRequired { request } => {
            Some((TaskState::InputRequired, Some(approval_message(request))))
        }
        AgentEvent::Cancelled => Some((TaskState::Cancelled, None)),
        AgentEvent::StateChanged {
            state: TaskState::Working,
        } => Some((TaskState::Working, None)),
        _ => None,
    }
}

/// Agent message for a non-final working update, if the event warrants one.
pub fn progress_message(event: &AgentEvent) -> Option<Option<ProtocolMessage>> {
    match event {
        AgentEvent::Working { description, .. } => {
            Some(description.as_ref().map(ProtocolMessage::agent_text))
        }
        AgentEvent::ToolCall { call } => Some(Some(ProtocolMessage::agent_text(format!(
            "Using tool: {}",
            call.name
        )))),
        _ => None,
    }
}
