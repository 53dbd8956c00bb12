//! Completion provider seam.
//!
//! The language model itself lives outside this crate. The loop engine talks
//! to it through [`CompletionProvider`], which returns a stream of
//! [`CompletionEvent`]s. A well-behaved stream ends with
//! [`CompletionEvent::Done`] or an error; consecutive `Text`/`TextDelta`
//! events concatenate into one logical text block.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::WardenError;
use crate::types::{Message, ToolCall, Usage};

/// Stream of provider events for one completion call.
pub type CompletionStream = BoxStream<'static, Result<CompletionEvent, WardenError>>;

/// A request sent to the completion provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub options: CompletionOptions,
}

/// Tool definition advertised to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Sampling options forwarded untouched to the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// One event from a completion stream.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionEvent {
    /// A complete text block.
    Text(String),
    /// An incremental text fragment.
    TextDelta(String),
    /// A fully-formed tool call request.
    ToolCall(ToolCall),
    Usage(Usage),
    Error(String),
    Done,
}

/// Core trait implemented by completion backends.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name used in logs.
    fn name(&self) -> &str {
        "provider"
    }

    /// Start a streaming completion over the full message list.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionStream, WardenError>;
}
