//! Runtime configuration (layered: defaults < TOML file < environment).

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent_loop::{AgentConfig, DEFAULT_MAX_ITERATIONS};
use crate::error::{Result, WardenError};
use crate::protocol::AgentCard;
use crate::tools::ToolSet;

const DEFAULT_APPROVAL_TIMEOUT_MS: u64 = 300_000;
const DEFAULT_PAUSE_POLL_INTERVAL_MS: u64 = 100;

/// Settings shared by every agent the runtime serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub max_iterations: usize,
    /// `None` waits for approvals indefinitely.
    pub approval_timeout_ms: Option<u64>,
    pub pause_poll_interval_ms: u64,
    pub context_window_tokens: Option<usize>,
    pub bind_addr: SocketAddr,
    pub agent_card: AgentCardConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentCardConfig {
    pub name: String,
    pub description: String,
    pub version: String,
    /// Public URL; derived from the bind address when unset.
    pub url: Option<String>,
}

impl Default for AgentCardConfig {
    fn default() -> Self {
        Self {
            name: "warden".to_string(),
            description: "Agent runtime with approval-gated tools".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            url: None,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            approval_timeout_ms: Some(DEFAULT_APPROVAL_TIMEOUT_MS),
            pause_poll_interval_ms: DEFAULT_PAUSE_POLL_INTERVAL_MS,
            context_window_tokens: None,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            agent_card: AgentCardConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|err| WardenError::InvalidConfiguration(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Defaults overridden by `WARDEN_*` variables (a `.env` file is loaded first).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Optional file, then environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from variables resolved through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(raw) = lookup("WARDEN_MAX_ITERATIONS") {
            self.max_iterations = parse_var("WARDEN_MAX_ITERATIONS", &raw)?;
        }
        if let Some(raw) = lookup("WARDEN_APPROVAL_TIMEOUT_MS") {
            self.approval_timeout_ms = match raw.trim() {
                "" | "none" => None,
                value => Some(parse_var("WARDEN_APPROVAL_TIMEOUT_MS", value)?),
            };
        }
        if let Some(raw) = lookup("WARDEN_PAUSE_POLL_INTERVAL_MS") {
            self.pause_poll_interval_ms = parse_var("WARDEN_PAUSE_POLL_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = lookup("WARDEN_CONTEXT_WINDOW_TOKENS") {
            self.context_window_tokens = Some(parse_var("WARDEN_CONTEXT_WINDOW_TOKENS", &raw)?);
        }
        if let Some(raw) = lookup("WARDEN_BIND_ADDR") {
            self.bind_addr = parse_var("WARDEN_BIND_ADDR", &raw)?;
        }
        if let Some(name) = lookup("WARDEN_AGENT_NAME") {
            self.agent_card.name = name;
        }
        if let Some(url) = lookup("WARDEN_AGENT_URL") {
            self.agent_card.url = Some(url);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(WardenError::InvalidConfiguration(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.pause_poll_interval_ms == 0 {
            return Err(WardenError::InvalidConfiguration(
                "pause_poll_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn approval_timeout(&self) -> Option<Duration> {
        self.approval_timeout_ms.map(Duration::from_millis)
    }

    pub fn pause_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pause_poll_interval_ms)
    }

    /// Agent configuration carrying these runtime limits.
    pub fn agent_config(
        &self,
        name: impl Into<String>,
        instructions: impl Into<String>,
        tools: ToolSet,
    ) -> AgentConfig {
        AgentConfig::builder()
            .name(name)
            .instructions(instructions)
            .tools(tools)
            .max_iterations(self.max_iterations)
            .maybe_approval_timeout(self.approval_timeout())
            .maybe_context_window_tokens(self.context_window_tokens)
            .pause_poll_interval(self.pause_poll_interval())
            .build()
    }

    pub fn agent_card(&self) -> AgentCard {
        let card = &self.agent_card;
        let url = card
            .url
            .clone()
            .unwrap_or_else(|| format!("http://{}/", self.bind_addr));
        AgentCard::new(&card.name, &card.description, url, &card.version)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|err| WardenError::InvalidConfiguration(format!("{key}: {err}")))
}
