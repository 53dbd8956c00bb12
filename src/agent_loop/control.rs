//! Execution state and the external pause/resume/cancel signals.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::events::AgentEvent;
use crate::error::{Result, WardenError};

/// Loop engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Paused,
    Cancelled,
    Completed,
    Failed,
}

/// Shared control block for one agent's executions.
///
/// State changes go through `watch::Sender::send_if_modified` so that each
/// conditional transition is atomic with respect to concurrent signals.
pub(crate) struct ExecutionControl {
    state: watch::Sender<LoopState>,
    cancel: Mutex<CancellationToken>,
    task_id: Mutex<Option<String>>,
}

impl ExecutionControl {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(LoopState::Idle);
        Self {
            state,
            cancel: Mutex::new(CancellationToken::new()),
            task_id: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    pub(crate) fn current_task(&self) -> Option<String> {
        self.task_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Claim the engine for `task_id`; fails if another execution owns it.
    pub(crate) fn begin(&self, task_id: &str) -> Result<CancellationToken> {
        let claimed = self.state.send_if_modified(|state| {
            if *state == LoopState::Idle {
                *state = LoopState::Running;
                true
            } else {
                false
            }
        });
        if !claimed {
            let owner = self.current_task().unwrap_or_default();
            return Err(WardenError::TaskAlreadyRunning(owner));
        }
        *self.task_id.lock().unwrap_or_else(PoisonError::into_inner) = Some(task_id.to_string());
        let token = CancellationToken::new();
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();
        Ok(token)
    }

    /// Record how the execution ended, then release the engine.
    pub(crate) fn finish(&self, outcome: LoopState) {
        self.state.send_replace(outcome);
        self.task_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.state.send_replace(LoopState::Idle);
    }

    fn transition(&self, from: &[LoopState], to: LoopState) -> bool {
        self.state.send_if_modified(|state| {
            if from.contains(state) {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn pause(&self) -> bool {
        self.transition(&[LoopState::Running], LoopState::Paused)
    }

    pub(crate) fn resume(&self) -> bool {
        self.transition(&[LoopState::Paused], LoopState::Running)
    }

    pub(crate) fn cancel(&self) -> bool {
        let requested = self.transition(&[LoopState::Running, LoopState::Paused], LoopState::Cancelled);
        if requested {
            self.cancel
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .cancel();
        }
        requested
    }

    /// Park while paused, re-checking at least every `poll`.
    pub(crate) async fn wait_while_paused(
        &self,
        token: &CancellationToken,
        poll: Duration,
    ) -> Result<()> {
        let mut state = self.state.subscribe();
        loop {
            if token.is_cancelled() {
                return Err(WardenError::TaskCancelled);
            }
            if *state.borrow_and_update() != LoopState::Paused {
                return Ok(());
            }
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::timeout(poll, state.changed()) => {}
            }
        }
    }
}

/// Sequential event sink for one execution.
#[derive(Clone)]
pub(crate) struct EventEmitter {
    tx: mpsc::UnboundedSender<AgentEvent>,
}

impl EventEmitter {
    pub(crate) fn new(tx: mpsc::UnboundedSender<AgentEvent>) -> Self {
        Self { tx }
    }

    /// Emit an event; a consumer that went away is not an error.
    pub(crate) fn emit(&self, event: AgentEvent) {
        let _ = self.tx.send(event);
    }
}
