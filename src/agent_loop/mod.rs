//! Agent loop engine, tool gateway and execution control.

mod control;
pub mod events;
pub mod gateway;
pub mod limits;
pub mod runner;

pub use control::LoopState;
pub use events::{AgentEvent, EventStream};
pub use gateway::{AfterToolHook, BeforeToolHook, ToolGateway};
pub use runner::{AgentConfig, AgentLoop, DEFAULT_MAX_ITERATIONS};
