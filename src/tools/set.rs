//! Name-indexed tool collection configured per agent.

use std::fmt;
use std::sync::Arc;

use super::tool::Tool;
use crate::error::WardenError;
use crate::provider::ToolDefinition;

/// The tools one agent may call.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    /// Build a set, rejecting duplicate names.
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Result<Self, WardenError> {
        let mut set = Self::default();
        for tool in tools {
            set.insert(tool)?;
        }
        Ok(set)
    }

    pub fn insert(&mut self, tool: Arc<dyn Tool>) -> Result<(), WardenError> {
        if self.get(tool.name()).is_some() {
            return Err(WardenError::InvalidConfiguration(format!(
                "duplicate tool name '{}'",
                tool.name()
            )));
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    /// Definitions advertised to the completion provider.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters().schema.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.tools.iter().map(|tool| tool.name()))
            .finish()
    }
}
