//! Tool system: the capabilities agents can invoke by name.

pub mod arguments;
pub mod set;
pub mod tool;
pub mod types;

pub use arguments::ToolArguments;
pub use set::ToolSet;
pub use tool::{AgentTool, Tool, ToolExecutionContext};
pub use types::{AgentToolParameters, ParameterBuilder, ToolOutput};
