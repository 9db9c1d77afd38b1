//! Model provider boundary.
//!
//! The engine does not talk to any model API itself.  A [`Provider`] turns a
//! [`ProviderRequest`] into a stream of [`ProviderChunk`]s: zero or more
//! partial-content deltas followed by exactly one
//! [`ProviderChunk::Completed`] carrying the final content, token counts and
//! stop reason.  Retries, rate limiting and authentication are the
//! provider's business.

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::message::{ContentBlock, Message};
use crate::usage::UsageRecord;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A tool (or nested agent) advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,

    /// Human-readable description of what the tool does.
    pub description: String,

    /// JSON Schema describing the tool's input.
    pub input_schema: Value,
}

/// A full request for one model call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderRequest {
    /// The conversation history.
    pub messages: Vec<Message>,

    /// Agent instructions, sent as the system prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Tools the model may invoke.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Whether the caller wants partial content.
    pub stream: bool,
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    /// The model wants tool results before continuing.
    ToolUse,
    /// The response hit the token limit.
    MaxTokens,
    /// A configured stop sequence was generated.
    StopSequence,
    /// The model finished its turn.
    EndTurn,
}

/// A partial content update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "kebab-case")]
pub enum ContentDelta {
    /// A chunk of answer text.
    Text(String),
    /// A chunk of reasoning text.
    Thinking(String),
}

/// The final result of one model call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    /// Content of the assistant message.
    pub content: Vec<ContentBlock>,

    /// Token counts, one record per billed model call.
    pub tokens: Vec<UsageRecord>,

    /// Why generation stopped.
    pub stop_reason: StopReason,
}

/// One item of a provider stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderChunk {
    /// Partial content.
    Delta(ContentDelta),
    /// The finished response.  Must be the last chunk.
    Completed(ProviderResponse),
}

/// Stream returned by [`Provider::generate`].
pub type ProviderStream<'a> = BoxStream<'a, Result<ProviderChunk>>;

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

/// A model backend.
pub trait Provider: Send + Sync {
    /// Human-readable provider name, used in logs.
    fn name(&self) -> &str;

    /// Generate one response.
    ///
    /// Implementations that do not stream can return
    /// [`completed_stream`] around their final response.
    fn generate(&self, request: ProviderRequest) -> ProviderStream<'_>;
}

/// A stream holding only the final response.
pub fn completed_stream(response: ProviderResponse) -> ProviderStream<'static> {
    stream::once(async move { Ok(ProviderChunk::Completed(response)) }).boxed()
}
