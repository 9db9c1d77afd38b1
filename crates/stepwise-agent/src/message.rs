//! Conversation messages and content blocks.
//!
//! These types model the data flowing between the engine, model providers and
//! tools.  They are provider-agnostic; provider adapters translate them into
//! their own wire formats.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// The role of a participant in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Input from the human user, and tool results fed back to the model.
    User,
    /// Output from the model.
    Assistant,
    /// System-level instructions that shape model behavior.
    System,
}

/// A single message in a conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who produced this message.
    pub role: Role,

    /// Ordered content blocks.
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

impl Message {
    /// Create a message from raw parts.
    pub fn new(role: Role, content: Vec<ContentBlock>) -> Self {
        Self { role, content }
    }

    /// Create a user text message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentBlock::text(text)])
    }

    /// Create an assistant text message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentBlock::text(text)])
    }

    /// Create a system text message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![ContentBlock::text(text)])
    }

    /// Create the user message that carries tool results back to the model.
    pub fn tool_results(results: Vec<ToolResultBlock>) -> Self {
        Self::new(
            Role::User,
            results.into_iter().map(ContentBlock::ToolResult).collect(),
        )
    }

    /// Iterate over the tool-use blocks in this message, in order.
    pub fn tool_uses(&self) -> impl Iterator<Item = &ToolUseBlock> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolUse(tool_use) => Some(tool_use),
            _ => None,
        })
    }

    /// Iterate over the tool-result blocks in this message, in order.
    pub fn tool_result_blocks(&self) -> impl Iterator<Item = &ToolResultBlock> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolResult(result) => Some(result),
            _ => None,
        })
    }

    /// Whether the message requests at least one tool invocation.
    pub fn has_tool_use(&self) -> bool {
        self.tool_uses().next().is_some()
    }

    /// Concatenate all text blocks of the message.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("")
    }
}

// ---------------------------------------------------------------------------
// Content blocks
// ---------------------------------------------------------------------------

/// A single piece of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ContentBlock {
    /// Plain text.
    Text { text: String },

    /// An inline image.
    Image { source: ImageSource },

    /// A model-emitted request to invoke a tool or nested agent.
    ToolUse(ToolUseBlock),

    /// The outcome of a tool-use block.
    ToolResult(ToolResultBlock),

    /// Reasoning output from thinking-capable models.
    Thinking {
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
}

impl ContentBlock {
    /// Create a text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Return the text of a text block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Base64-encoded image payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    /// MIME type, e.g. `"image/png"`.
    pub media_type: String,
    /// Base64 data.
    pub data: String,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseBlock {
    /// Identifier assigned by the model for correlating results.
    pub id: String,

    /// Name of the tool or nested agent to invoke.
    pub name: String,

    /// Arguments as a JSON value.  The structure depends on the tool's schema.
    #[serde(default)]
    pub input: Value,
}

impl ToolUseBlock {
    /// Create a tool-use block.
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// The outcome of executing a tool-use block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultBlock {
    /// The [`ToolUseBlock::id`] this result answers.
    pub tool_use_id: String,

    /// The [`ToolUseBlock::name`] this result answers.
    pub tool_name: String,

    /// Result content shown to the model.
    #[serde(default)]
    pub content: Vec<ContentBlock>,

    /// Whether the invocation failed.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResultBlock {
    /// Build a result answering `tool_use`.
    pub fn for_tool_use(tool_use: &ToolUseBlock, content: Vec<ContentBlock>, is_error: bool) -> Self {
        Self {
            tool_use_id: tool_use.id.clone(),
            tool_name: tool_use.name.clone(),
            content,
            is_error,
        }
    }

    /// Build an error result with a text message.
    pub fn error(tool_use: &ToolUseBlock, message: impl Into<String>) -> Self {
        Self::for_tool_use(tool_use, vec![ContentBlock::text(message)], true)
    }

    /// Concatenated text of the result content.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
