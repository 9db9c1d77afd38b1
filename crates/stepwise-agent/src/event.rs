//! Execution events.
//!
//! A run is observed as a stream of [`ExecutionEvent`]s.  Each event carries
//! the name of the agent that produced it and the execution path from the
//! root run, so consumers can attribute events forwarded out of nested
//! agents without tracking delegation themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{Message, ToolResultBlock, ToolUseBlock};
use crate::provider::{ContentDelta, StopReason};
use crate::tool::ToolOutput;

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Identity of one run within a (possibly nested) delegation tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventScope {
    /// Unique id of the run.
    pub run_id: Uuid,

    /// Id of the run that delegated to this one.  Provenance only.
    pub parent_run_id: Option<Uuid>,

    /// Name of the agent being run.
    pub agent_name: String,

    /// Agent names from the root run down to this one.
    pub execution_path: Vec<String>,
}

impl EventScope {
    /// Scope of a top-level run.
    pub fn root(agent_name: impl Into<String>) -> Self {
        let agent_name = agent_name.into();
        Self {
            run_id: Uuid::now_v7(),
            parent_run_id: None,
            execution_path: vec![agent_name.clone()],
            agent_name,
        }
    }

    /// Scope of a nested run delegated from this one.
    pub fn child(&self, agent_name: impl Into<String>) -> Self {
        let agent_name = agent_name.into();
        let mut execution_path = self.execution_path.clone();
        execution_path.push(agent_name.clone());
        Self {
            run_id: Uuid::now_v7(),
            parent_run_id: Some(self.run_id),
            agent_name,
            execution_path,
        }
    }

    /// Delegation depth; zero for a top-level run.
    pub fn depth(&self) -> usize {
        self.execution_path.len().saturating_sub(1)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EventKind {
    /// The run started.
    Start,

    /// Partial model output.  Only emitted for streaming runs.
    LlmStreaming { delta: ContentDelta },

    /// The fully resolved prompt, just before the model call.
    LlmInput {
        system_prompt: Option<String>,
        messages: Vec<Message>,
        tools: Vec<String>,
    },

    /// Tool-use blocks about to be executed.  The consumer may answer this
    /// event with [`ExternalToolResults`] to skip internal execution.
    ToolCallParams {
        tool_uses: Vec<ToolUseBlock>,
        has_agent_calls: bool,
    },

    /// The outcome of one tool-use block.
    ToolResult { result: ToolResultBlock },

    /// The run finished.
    Stop {
        /// Stop reason of the last model call, if any.
        stop_reason: Option<StopReason>,
        /// Whether the run ended before the model reached a natural end.
        halted_early: bool,
    },
}

impl EventKind {
    /// Wire name of the event type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::LlmStreaming { .. } => "llm-streaming",
            Self::LlmInput { .. } => "llm-input",
            Self::ToolCallParams { .. } => "tool-call-params",
            Self::ToolResult { .. } => "tool-result",
            Self::Stop { .. } => "stop",
        }
    }
}

/// An event yielded to the consumer of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionEvent {
    /// What happened.
    #[serde(flatten)]
    pub kind: EventKind,

    /// Agent that produced the event.
    pub agent_name: String,

    /// Agent names from the root run down to the producer.
    pub execution_path: Vec<String>,

    /// When the event was produced.
    pub timestamp: DateTime<Utc>,

    /// Scope of the producing run, stamped by the context-injection
    /// middleware.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<EventScope>,
}

impl ExecutionEvent {
    /// Create an unstamped event for `scope`.
    pub fn new(kind: EventKind, scope: &EventScope) -> Self {
        Self {
            kind,
            agent_name: scope.agent_name.clone(),
            execution_path: scope.execution_path.clone(),
            timestamp: Utc::now(),
            scope: None,
        }
    }

    /// Wire name of the event type.
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Delegation depth of the producer.
    pub fn depth(&self) -> usize {
        self.execution_path.len().saturating_sub(1)
    }
}

// ---------------------------------------------------------------------------
// Injected results
// ---------------------------------------------------------------------------

/// A result computed outside the engine for one tool-use block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalToolResult {
    /// The block being answered.
    pub tool_use: ToolUseBlock,

    /// Its outcome.
    pub result: ToolOutput,
}

impl ExternalToolResult {
    /// Pair a tool-use block with its outcome.
    pub fn new(tool_use: ToolUseBlock, result: ToolOutput) -> Self {
        Self { tool_use, result }
    }
}

/// Value a consumer sends back into a suspended `tool-call-params` event.
pub type ExternalToolResults = Vec<ExternalToolResult>;
