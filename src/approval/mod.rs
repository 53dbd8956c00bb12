//! Human-approval workflow: request types, policies, and the coordinator.

pub mod coordinator;
pub mod types;

pub use coordinator::{ApprovalCoordinator, PendingDecision};
pub use types::*;
