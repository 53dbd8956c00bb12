//! Pending-approval bookkeeping.
//!
//! The coordinator is the single owner of the pending-request map. Callers
//! that need a decision park on [`ApprovalCoordinator::request_approval`],
//! or split the two steps with [`ApprovalCoordinator::register`] and
//! [`PendingDecision::wait`]. Whichever of `respond`, the timeout, or `cancel` removes the entry first
//! resolves the waiter, and the others find nothing to do.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, oneshot};

use super::types::{ApprovalNotice, ApprovalRequest, ApprovalResponse};
use crate::error::{Result, WardenError};

const NOTICE_CAPACITY: usize = 64;

struct PendingApproval {
    request: ApprovalRequest,
    responder: oneshot::Sender<Result<ApprovalResponse>>,
}

/// Tracks outstanding approval requests and routes decisions to their waiters.
pub struct ApprovalCoordinator {
    pending: Mutex<HashMap<String, PendingApproval>>,
    notices: broadcast::Sender<ApprovalNotice>,
    default_timeout: Option<Duration>,
}

impl Default for ApprovalCoordinator {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ApprovalCoordinator {
    /// Create a coordinator; `default_timeout` applies when a request has none.
    pub fn new(default_timeout: Option<Duration>) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            pending: Mutex::new(HashMap::new()),
            notices,
            default_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingApproval>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Observe requests as they are created and resolved.
    pub fn subscribe(&self) -> broadcast::Receiver<ApprovalNotice> {
        self.notices.subscribe()
    }

    /// Register `request` without waiting on it.
    ///
    /// The entry is visible to `respond`, `pending` and `is_pending` as soon
    /// as this returns. Dropping the returned handle before a decision
    /// arrives cancels the request.
    pub fn register(&self, request: ApprovalRequest) -> Result<PendingDecision<'_>> {
        let id = request.id.clone();
        let (responder, receiver) = oneshot::channel();
        {
            let mut pending = self.lock();
            if pending.contains_key(&id) {
                return Err(WardenError::InvalidState(format!(
                    "approval request {id} is already pending"
                )));
            }
            pending.insert(
                id.clone(),
                PendingApproval {
                    request: request.clone(),
                    responder,
                },
            );
        }

        tracing::debug!(
            approval_id = %id,
            task_id = %request.task_id,
            risk = %request.risk_level,
            "approval requested"
        );
        let _ = self.notices.send(ApprovalNotice::Requested(request));

        Ok(PendingDecision {
            coordinator: self,
            id,
            receiver,
        })
    }

    /// Register `request` and wait for its decision.
    ///
    /// Resolves with the caller's response, with [`ApprovalResponse::Timeout`]
    /// once the limit elapses, or fails with
    /// [`WardenError::ApprovalCancelled`] if the request is cancelled.
    pub async fn request_approval(
        &self,
        request: ApprovalRequest,
        timeout: Option<Duration>,
    ) -> Result<ApprovalResponse> {
        self.register(request)?.wait(timeout).await
    }

    /// Deliver a decision to whoever is waiting on `id`.
    ///
    /// An unknown or already-resolved id changes nothing and reports
    /// [`WardenError::ApprovalNotFound`].
    pub fn respond(&self, id: &str, response: ApprovalResponse) -> Result<()> {
        let entry = self
            .lock()
            .remove(id)
            .ok_or_else(|| WardenError::ApprovalNotFound(id.to_string()))?;
        tracing::debug!(approval_id = %id, ?response, "approval resolved");
        let _ = entry.responder.send(Ok(response.clone()));
        let _ = self.notices.send(ApprovalNotice::Resolved {
            id: id.to_string(),
            response,
        });
        Ok(())
    }

    /// Fail the waiter on `id` with a cancellation error.
    pub fn cancel(&self, id: &str) -> Result<()> {
        let entry = self
            .lock()
            .remove(id)
            .ok_or_else(|| WardenError::ApprovalNotFound(id.to_string()))?;
        Self::fail_cancelled(&self.notices, entry);
        Ok(())
    }

    /// Cancel every request owned by `task_id`; returns how many were pending.
    pub fn cancel_task(&self, task_id: &str) -> usize {
        let cancelled: Vec<PendingApproval> = {
            let mut pending = self.lock();
            let ids: Vec<String> = pending
                .values()
                .filter(|entry| entry.request.task_id == task_id)
                .map(|entry| entry.request.id.clone())
                .collect();
            ids.iter().filter_map(|id| pending.remove(id)).collect()
        };
        let count = cancelled.len();
        for entry in cancelled {
            Self::fail_cancelled(&self.notices, entry);
        }
        count
    }

    fn fail_cancelled(notices: &broadcast::Sender<ApprovalNotice>, entry: PendingApproval) {
        let id = entry.request.id;
        tracing::debug!(approval_id = %id, "approval cancelled");
        let _ = entry
            .responder
            .send(Err(WardenError::ApprovalCancelled(id.clone())));
        let _ = notices.send(ApprovalNotice::Cancelled { id });
    }

    /// Outstanding requests, oldest first.
    pub fn pending(&self) -> Vec<ApprovalRequest> {
        let mut requests: Vec<ApprovalRequest> = self
            .lock()
            .values()
            .map(|entry| entry.request.clone())
            .collect();
        requests.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        requests
    }

    pub fn pending_for_task(&self, task_id: &str) -> Vec<ApprovalRequest> {
        self.pending()
            .into_iter()
            .filter(|request| request.task_id == task_id)
            .collect()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }
}

/// A registered request awaiting its decision.
pub struct PendingDecision<'a> {
    coordinator: &'a ApprovalCoordinator,
    id: String,
    receiver: oneshot::Receiver<Result<ApprovalResponse>>,
}

impl PendingDecision<'_> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the decision; `timeout` falls back to the coordinator default.
    pub async fn wait(mut self, timeout: Option<Duration>) -> Result<ApprovalResponse> {
        let coordinator = self.coordinator;
        let outcome = match timeout.or(coordinator.default_timeout) {
            None => (&mut self.receiver).await,
            Some(limit) => match tokio::time::timeout(limit, &mut self.receiver).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let expired = coordinator.lock().remove(&self.id).is_some();
                    if expired {
                        tracing::info!(approval_id = %self.id, ?limit, "approval timed out");
                        let _ = coordinator.notices.send(ApprovalNotice::Resolved {
                            id: self.id.clone(),
                            response: ApprovalResponse::Timeout,
                        });
                        return Ok(ApprovalResponse::Timeout);
                    }
                    // Resolved between the deadline and taking the lock.
                    (&mut self.receiver).await
                }
            },
        };

        match outcome {
            Ok(result) => result,
            Err(_) => Err(WardenError::ApprovalCancelled(self.id.clone())),
        }
    }
}

impl Drop for PendingDecision<'_> {
    fn drop(&mut self) {
        let abandoned = self.coordinator.lock().remove(&self.id);
        if let Some(entry) = abandoned {
            ApprovalCoordinator::fail_cancelled(&self.coordinator.notices, entry);
        }
    }
}
