//! Tool boundary.
//!
//! Leaf tools implement [`Tool`] so the dispatcher can invoke them uniformly.
//! Input validation against [`Tool::input_schema`] is the tool's own
//! responsibility.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::message::ContentBlock;
use crate::provider::ToolDefinition;
use crate::usage::UsageRecord;

// ---------------------------------------------------------------------------
// Tool trait
// ---------------------------------------------------------------------------

/// A leaf tool the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name.  Must match the name the model uses.
    fn name(&self) -> &str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema of the accepted input.
    fn input_schema(&self) -> Value;

    /// The definition advertised to the model.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_owned(),
            description: self.description().to_owned(),
            input_schema: self.input_schema(),
        }
    }

    /// Execute the tool.
    ///
    /// Returning `Err` or an output with `is_error = true` does not fail the
    /// run; the dispatcher reports the failure to the model instead.
    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutput>;
}

// ---------------------------------------------------------------------------
// Context and output
// ---------------------------------------------------------------------------

/// Everything a tool can see about the invocation.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Opaque caller-supplied bag from the run options.
    pub context: Value,

    /// Agent that requested the call.
    pub agent_name: String,

    /// Agent names from the root run down to the requesting agent.
    pub execution_path: Vec<String>,

    /// The run that requested the call.
    pub run_id: Uuid,

    /// Id of the tool-use block being answered.
    pub tool_use_id: String,
}

/// What a tool produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Whether the tool reports a failure.
    #[serde(default)]
    pub is_error: bool,

    /// Result payload.  Strings are passed to the model as-is, anything else
    /// as serialized JSON.
    #[serde(default)]
    pub data: Value,

    /// Model usage incurred by the tool itself.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub token_usage: Vec<UsageRecord>,
}

impl ToolOutput {
    /// A successful output.
    pub fn success(data: impl Into<Value>) -> Self {
        Self {
            is_error: false,
            data: data.into(),
            token_usage: Vec::new(),
        }
    }

    /// A failed output with a message for the model.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            data: Value::String(message.into()),
            token_usage: Vec::new(),
        }
    }

    /// Attach model usage incurred by the tool.
    pub fn with_token_usage(mut self, records: Vec<UsageRecord>) -> Self {
        self.token_usage = records;
        self
    }

    /// Render the payload as tool-result content.
    pub fn content(&self) -> Vec<ContentBlock> {
        let text = match &self.data {
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        vec![ContentBlock::text(text)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_data_is_passed_verbatim() {
        let output = ToolOutput::success("42");
        assert_eq!(output.content(), vec![ContentBlock::text("42")]);
    }

    #[test]
    fn structured_data_is_serialized() {
        let output = ToolOutput::success(serde_json::json!({"sum": 3}));
        assert_eq!(output.content(), vec![ContentBlock::text(r#"{"sum":3}"#)]);
    }

    #[test]
    fn error_output_is_flagged() {
        let output = ToolOutput::error("division by zero");
        assert!(output.is_error);
        assert_eq!(output.data, "division by zero");
    }
}
