//! Warden: an agent runtime with approval-gated tools.
//!
//! An [`AgentLoop`](agent_loop::AgentLoop) drives a completion provider
//! through tool calls. Risky calls suspend on the
//! [`ApprovalCoordinator`](approval::ApprovalCoordinator) until someone
//! decides. The [`TaskManager`](protocol::TaskManager) exposes executions as
//! agent-to-agent protocol tasks over JSON-RPC and Server-Sent Events.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use warden::prelude::*;
//!
//! # async fn example(provider: Arc<dyn CompletionProvider>) -> warden::error::Result<()> {
//! let coordinator = Arc::new(ApprovalCoordinator::default());
//! let config = RuntimeConfig::from_env()?;
//!
//! let factory_config = config.clone();
//! let factory_coordinator = coordinator.clone();
//! let factory = move |_task_id: &str| -> warden::error::Result<AgentLoop> {
//!     let agent = factory_config.agent_config("helper", "Be brief.", ToolSet::default());
//!     Ok(AgentLoop::new(agent, provider.clone(), factory_coordinator.clone()))
//! };
//!
//! let manager = TaskManager::new(Arc::new(factory), coordinator, config.agent_card());
//! warden::server::bind_and_serve(config.bind_addr, manager)
//!     .await
//!     .map_err(|err| WardenError::InvalidConfiguration(err.to_string()))?;
//! # Ok(())
//! # }
//! ```

pub mod agent_loop;
pub mod approval;
pub mod config;
pub mod error;
pub mod prelude;
pub mod protocol;
pub mod provider;
pub mod server;
pub mod tools;
pub mod types;
