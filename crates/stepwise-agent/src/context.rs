//! Per-run execution context.
//!
//! An [`ExecutionContext`] is created once per run (top-level or nested),
//! threaded by reference through every step, and mutated only by the engine
//! between steps.  It is dropped when the run completes or is abandoned.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::{Agent, RunOutput};
use crate::event::{EventKind, EventScope, ExecutionEvent};
use crate::message::{Role, ToolUseBlock};
use crate::provider::{Provider, StopReason, ToolDefinition};
use crate::state::{AgentState, StatePatch};
use crate::tool::ToolContext;
use crate::usage::TokenUsage;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// How early a run may halt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopCondition {
    /// Stop only when the model reaches a natural end.
    #[default]
    Terminal,
    /// Stop right after the tool-call step, before any tool runs.
    ToolUse,
    /// Stop right after tool results are merged, before the next model call.
    ToolResult,
}

/// Per-run options supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Emit `llm-streaming` events.  Defaults to the agent's setting.
    pub stream: Option<bool>,

    /// Opaque bag handed to tools and inherited by nested agents.
    pub context: Value,

    /// Emit `llm-input` events.  Defaults to the agent's setting.
    pub emit_llm_input: Option<bool>,
}

impl RunOptions {
    /// Options using the agent defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override streaming.
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Set the caller context bag.
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    /// Override `llm-input` emission.
    pub fn with_llm_input(mut self, emit: bool) -> Self {
        self.emit_llm_input = Some(emit);
        self
    }
}

// ---------------------------------------------------------------------------
// Execution context
// ---------------------------------------------------------------------------

/// Mutable state of one run.
pub struct ExecutionContext {
    /// Accumulated agent state.
    pub state: AgentState,

    /// Opaque caller-supplied bag.
    pub context: Value,

    /// The agent being run.  Shared, never mutated.
    pub agent: Arc<Agent>,

    /// Identity of this run.
    pub scope: EventScope,

    /// Scope of the delegating run, for provenance only.
    pub parent: Option<EventScope>,

    /// Model backend for this run.
    pub provider: Arc<dyn Provider>,

    /// System prompt for model calls.
    pub instructions: Option<String>,

    /// Whether `llm-streaming` events are emitted.
    pub stream: bool,

    /// Whether `llm-input` events are emitted.
    pub emit_llm_input: bool,

    /// How early the run may halt.
    pub stop_condition: StopCondition,

    /// Usage accumulated so far.
    pub token_usage: TokenUsage,

    /// Stop reason of the most recent model call.
    pub last_stop_reason: Option<StopReason>,

    /// Number of steps completed.
    pub steps_taken: u32,
}

impl ExecutionContext {
    /// Create the context for a run of `agent`.
    pub fn new(agent: Arc<Agent>, scope: EventScope, parent: Option<EventScope>, options: RunOptions) -> Self {
        Self {
            state: AgentState::default(),
            context: options.context,
            provider: Arc::clone(agent.provider()),
            instructions: agent.instructions().map(str::to_owned),
            stream: options.stream.unwrap_or(agent.stream()),
            emit_llm_input: options.emit_llm_input.unwrap_or(agent.emit_llm_input()),
            stop_condition: agent.stop_condition(),
            token_usage: TokenUsage::new(),
            last_stop_reason: None,
            steps_taken: 0,
            agent,
            scope,
            parent,
        }
    }

    /// Build an event attributed to this run.
    pub fn event(&self, kind: EventKind) -> ExecutionEvent {
        ExecutionEvent::new(kind, &self.scope)
    }

    /// Tool-use blocks of the last message, if it came from the assistant.
    pub fn pending_tool_uses(&self) -> Vec<ToolUseBlock> {
        match self.state.last_message() {
            Some(message) if message.role == Role::Assistant => message.tool_uses().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Definitions of every tool and nested agent the model may call.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.agent.tool_definitions()
    }

    /// Context handed to a leaf tool answering `tool_use`.
    pub fn tool_context(&self, tool_use: &ToolUseBlock) -> ToolContext {
        ToolContext {
            context: self.context.clone(),
            agent_name: self.scope.agent_name.clone(),
            execution_path: self.scope.execution_path.clone(),
            run_id: self.scope.run_id,
            tool_use_id: tool_use.id.clone(),
        }
    }

    /// Merge a state patch through the agent's reducer.
    pub fn apply_patch(&mut self, patch: StatePatch) {
        self.agent.reducer().apply(&mut self.state, patch);
    }

    /// Consume the context into the run's final value.
    pub fn into_output(self) -> RunOutput {
        RunOutput {
            messages: self.state.messages,
            state: self.state.fields,
            token_usage: self.token_usage,
        }
    }
}
