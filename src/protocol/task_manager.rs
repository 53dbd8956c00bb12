//! Maps protocol message exchanges onto loop-engine executions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use super::mapping;
use super::types::{
    AgentCard, MessageSendParams, ProtocolMessage, ProtocolTask, StreamResponse, TaskArtifactUpdateEvent,
    TaskStatus, TaskStatusUpdateEvent,
};
use crate::agent_loop::{AgentEvent, AgentLoop, EventStream};
use crate::approval::{ApprovalCoordinator, ApprovalRequest, ApprovalResponse};
use crate::error::{Result, WardenError};
use crate::types::{Task, TaskConfig, TaskState};

/// Builds the agent bound to a new protocol task.
pub trait AgentFactory: Send + Sync {
    fn create_agent(&self, task_id: &str) -> Result<AgentLoop>;
}

impl<F> AgentFactory for F
where
    F: Fn(&str) -> Result<AgentLoop> + Send + Sync,
{
    fn create_agent(&self, task_id: &str) -> Result<AgentLoop> {
        self(task_id)
    }
}

/// Stream of updates for one streaming send.
pub type UpdateStream = BoxStream<'static, StreamResponse>;

struct TaskRecord {
    seq: u64,
    task: ProtocolTask,
    agent: Option<AgentLoop>,
}

#[derive(Default)]
struct TaskTable {
    next_seq: u64,
    records: HashMap<String, TaskRecord>,
}

/// Owns the task table and the agents bound to it.
#[derive(Clone)]
pub struct TaskManager {
    factory: Arc<dyn AgentFactory>,
    coordinator: Arc<ApprovalCoordinator>,
    table: Arc<Mutex<TaskTable>>,
    card: Arc<AgentCard>,
}

/// Where a running execution's updates go besides the task table.
struct Sinks {
    updates: Option<mpsc::UnboundedSender<StreamResponse>>,
    settled: Option<oneshot::Sender<()>>,
}

impl TaskManager {
    pub fn new(
        factory: Arc<dyn AgentFactory>,
        coordinator: Arc<ApprovalCoordinator>,
        card: AgentCard,
    ) -> Self {
        Self {
            factory,
            coordinator,
            table: Arc::new(Mutex::new(TaskTable::default())),
            card: Arc::new(card),
        }
    }

    pub fn agent_card(&self) -> &AgentCard {
        &self.card
    }

    pub fn coordinator(&self) -> &Arc<ApprovalCoordinator> {
        &self.coordinator
    }

    fn lock(&self) -> MutexGuard<'_, TaskTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Non-streaming send.
    ///
    /// Returns as soon as execution starts, or once the task settles when the
    /// request asks for blocking.
    pub async fn send_message(&self, params: MessageSendParams) -> Result<ProtocolTask> {
        let configuration = params.configuration.clone().unwrap_or_default();
        let (snapshot, events) = self.start(params)?;
        let (settled_tx, settled_rx) = oneshot::channel();
        let sinks = Sinks {
            updates: None,
            settled: configuration.blocking.then_some(settled_tx),
        };
        tokio::spawn(self.clone().pump(snapshot.id.clone(), events, sinks));

        let mut task = if configuration.blocking {
            let _ = settled_rx.await;
            self.get_task(&snapshot.id, None)?
        } else {
            snapshot
        };
        if let Some(length) = configuration.history_length {
            task.truncate_history(length);
        }
        Ok(task)
    }

    /// Streaming send: an initial task update, progress, then exactly one
    /// final status update.
    pub fn send_message_streaming(&self, params: MessageSendParams) -> Result<UpdateStream> {
        let (snapshot, events) = self.start(params)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let task_id = snapshot.id.clone();
        let _ = tx.send(StreamResponse::Task(snapshot));
        let sinks = Sinks {
            updates: Some(tx),
            settled: None,
        };
        tokio::spawn(self.clone().pump(task_id, events, sinks));
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    pub fn get_task(&self, id: &str, history_length: Option<usize>) -> Result<ProtocolTask> {
        let mut task = self
            .lock()
            .records
            .get(id)
            .map(|record| record.task.clone())
            .ok_or_else(|| WardenError::TaskNotFound(id.to_string()))?;
        if let Some(length) = history_length {
            task.truncate_history(length);
        }
        Ok(task)
    }

    /// All known tasks in creation order.
    pub fn list_tasks(&self) -> Vec<ProtocolTask> {
        let table = self.lock();
        let mut records: Vec<&TaskRecord> = table.records.values().collect();
        records.sort_by_key(|record| record.seq);
        records.into_iter().map(|record| record.task.clone()).collect()
    }

    /// Cancel a task's execution and mark it CANCELLED.
    pub fn cancel_task(&self, id: &str) -> Result<ProtocolTask> {
        let agent = {
            let mut table = self.lock();
            let record = table
                .records
                .get_mut(id)
                .ok_or_else(|| WardenError::TaskNotFound(id.to_string()))?;
            let state = record.task.status.state;
            if state.is_terminal() {
                return Err(WardenError::InvalidState(format!(
                    "task {id} is already {state}"
                )));
            }
            record.task.status = TaskStatus::new(TaskState::Cancelled);
            record.agent.take()
        };
        if let Some(agent) = agent {
            agent.cancel();
        }
        let released = self.coordinator.cancel_task(id);
        tracing::info!(task_id = %id, released, "task cancelled");
        self.get_task(id, None)
    }

    pub fn pending_approvals(&self) -> Vec<ApprovalRequest> {
        self.coordinator.pending()
    }

    pub fn respond_approval(&self, id: &str, response: ApprovalResponse) -> Result<()> {
        self.coordinator.respond(id, response)
    }

    /// Create or continue the task and start its execution.
    fn start(&self, params: MessageSendParams) -> Result<(ProtocolTask, EventStream)> {
        let mut message = params.message;
        let configuration = params.configuration.unwrap_or_default();
        let mut table = self.lock();

        let existing = message
            .task_id
            .as_ref()
            .and_then(|id| table.records.get(id))
            .map(|record| {
                (
                    record.task.context_id.clone(),
                    record.task.status.state,
                    record.agent.clone(),
                )
            });
        let task_id = message
            .task_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let (context_id, agent) = match existing {
            Some((_, state, _)) if state.is_terminal() => {
                return Err(WardenError::InvalidParams(format!(
                    "task {task_id} is {state} and accepts no further messages"
                )));
            }
            Some((context_id, _, Some(agent))) => (context_id, agent),
            Some((context_id, _, None)) => (context_id, self.factory.create_agent(&task_id)?),
            None => {
                let context_id = message
                    .context_id
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                (context_id, self.factory.create_agent(&task_id)?)
            }
        };
        message.task_id = Some(task_id.clone());
        message.context_id = Some(context_id.clone());

        let task = Task::new(mapping::to_task_message(&message))
            .with_id(task_id.clone())
            .with_context_id(context_id.clone())
            .with_config(TaskConfig::builder().blocking(configuration.blocking).build());
        let events = agent.execute(task)?;

        if !table.records.contains_key(&task_id) {
            let seq = table.next_seq;
            table.next_seq += 1;
            table.records.insert(
                task_id.clone(),
                TaskRecord {
                    seq,
                    task: ProtocolTask::new(task_id.clone(), context_id),
                    agent: None,
                },
            );
        }
        let record = table
            .records
            .get_mut(&task_id)
            .ok_or_else(|| WardenError::TaskNotFound(task_id.clone()))?;
        record.agent = Some(agent);
        record.task.history.push(message);
        apply_status(&mut record.task, TaskState::Working, None);
        tracing::debug!(task_id = %task_id, "task execution started");
        Ok((record.task.clone(), events))
    }

    /// Drain an execution's events into the task table and the sinks.
    async fn pump(self, task_id: String, mut events: EventStream, mut sinks: Sinks) {
        while let Some(event) = events.next().await {
            let updates = self.apply_event(&task_id, &event);
            if let Some(tx) = &sinks.updates {
                for update in updates {
                    let _ = tx.send(update);
                }
            }
            if event.is_terminal() {
                self.settle(&task_id, &mut sinks);
            }
        }
        if sinks.updates.is_some() || sinks.settled.is_some() {
            tracing::debug!(task_id = %task_id, "event source ended without a terminal event");
            self.mark_completed(&task_id);
            self.settle(&task_id, &mut sinks);
        }
    }

    fn mark_completed(&self, task_id: &str) {
        let mut table = self.lock();
        if let Some(record) = table.records.get_mut(task_id) {
            apply_status(&mut record.task, TaskState::Completed, None);
            record.agent = None;
        }
    }

    /// Send the one final update and release a blocking caller.
    fn settle(&self, task_id: &str, sinks: &mut Sinks) {
        if let Some(tx) = sinks.updates.take() {
            if let Ok(task) = self.get_task(task_id, Some(0)) {
                let _ = tx.send(StreamResponse::StatusUpdate(TaskStatusUpdateEvent {
                    task_id: task.id,
                    context_id: task.context_id,
                    status: task.status,
                    is_final: true,
                }));
            }
        }
        if let Some(settled) = sinks.settled.take() {
            let _ = settled.send(());
        }
    }

    /// Record one event and return the non-final updates it produces.
    fn apply_event(&self, task_id: &str, event: &AgentEvent) -> Vec<StreamResponse> {
        let mut table = self.lock();
        let Some(record) = table.records.get_mut(task_id) else {
            return Vec::new();
        };
        let task = &mut record.task;
        let mut updates = Vec::new();

        if let AgentEvent::Message { message } = event {
            let projected = mapping::from_message(message).with_task(&task.id, &task.context_id);
            task.history.push(projected.clone());
            updates.push(StreamResponse::Message(projected));
        }

        if let Some(message) = mapping::progress_message(event) {
            if !task.status.state.is_terminal() {
                let mut status = TaskStatus::new(TaskState::Working);
                status.message = message.map(|m| m.with_task(&task.id, &task.context_id));
                updates.push(status_update(task, status, false));
            }
        }

        if let Some((state, message)) = mapping::status_change(event) {
            let message = message.map(|m| m.with_task(&task.id, &task.context_id));
            let changed = apply_status(task, state, message);
            if changed && state == TaskState::Completed {
                if let AgentEvent::Completed { result, .. } = event {
                    let artifact = mapping::result_artifact(result);
                    task.artifacts.push(artifact.clone());
                    updates.push(StreamResponse::ArtifactUpdate(TaskArtifactUpdateEvent {
                        task_id: task.id.clone(),
                        context_id: task.context_id.clone(),
                        artifact,
                        append: false,
                        last_chunk: true,
                    }));
                }
            }
            if changed && !event.is_terminal() {
                updates.push(status_update(task, task.status.clone(), false));
            }
        }

        if matches!(
            event,
            AgentEvent::Completed { .. } | AgentEvent::Failed { .. } | AgentEvent::Cancelled
        ) {
            record.agent = None;
        }
        updates
    }
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("agent", &self.card.name)
            .field("tasks", &self.lock().records.len())
            .finish()
    }
}

fn status_update(task: &ProtocolTask, status: TaskStatus, is_final: bool) -> StreamResponse {
    StreamResponse::StatusUpdate(TaskStatusUpdateEvent {
        task_id: task.id.clone(),
        context_id: task.context_id.clone(),
        status,
        is_final,
    })
}

/// Move `task` to `state` if the state machine allows it.
fn apply_status(
    task: &mut ProtocolTask,
    state: TaskState,
    message: Option<ProtocolMessage>,
) -> bool {
    let current = task.status.state;
    if current == state && message.is_none() {
        return false;
    }
    if !current.can_transition_to(state) {
        tracing::debug!(task_id = %task.id, from = %current, to = %state, "ignored status transition");
        return false;
    }
    let mut status = TaskStatus::new(state);
    status.message = message;
    task.status = status;
    true
}
