//! Steps: the units of work the engine drives.
//!
//! A step has a three-phase contract:
//!
//! 1. [`Step::before_execute`] derives step-local [`StepParams`] from the
//!    shared context.
//! 2. [`Step::execute`] does the work, yielding events through the
//!    [`EventSink`] and returning a [`StepResult`] naming the next step plus
//!    state and usage patches.
//! 3. [`Step::after_execute`] post-processes the result.
//!
//! Steps are stateless and shared across runs.  An agent's [`StepTable`]
//! maps names to steps; callers may replace entries or the whole table.
//!
//! Default wiring:
//!
//! ```text
//!  llm-call ──tool use──> tool-call ──injected──────────────> llm-call
//!     │                      ├──nested agent──> agent-call ─> llm-call
//!     └──otherwise──> end    └──tools only───> tool-result ─> llm-call
//! ```

mod agent_call;
mod llm_call;
mod tool_call;
mod tool_result;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::{ExecutionContext, StopCondition};
use crate::coroutine::EventSink;
use crate::error::Result;
use crate::message::{Message, ToolUseBlock};
use crate::provider::StopReason;
use crate::state::StatePatch;
use crate::usage::TokenUsage;

pub use agent_call::AgentCall;
pub use llm_call::LlmCall;
pub use tool_call::ToolCall;
pub use tool_result::ToolResultStep;

// ---------------------------------------------------------------------------
// Step names
// ---------------------------------------------------------------------------

/// Calls the model.
pub const LLM_CALL: &str = "llm-call";
/// Announces pending tool-use blocks and routes them.
pub const TOOL_CALL: &str = "tool-call";
/// Executes leaf tools.
pub const TOOL_RESULT: &str = "tool-result";
/// Executes tool-use blocks that include nested agents.
pub const AGENT_CALL: &str = "agent-call";
/// Terminal pseudo-step.
pub const END: &str = "end";

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Step-local parameters derived from the context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepParams {
    /// Conversation history as the step should see it.
    pub messages: Vec<Message>,

    /// Tool-use blocks pending in the last assistant message.
    pub tool_uses: Vec<ToolUseBlock>,

    /// Free-form parameters for custom steps.
    pub extra: Value,
}

/// What a step hands back to the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepResult {
    /// Name of the next step, or [`END`].
    pub next: String,

    /// State update to merge.
    pub state_patch: StatePatch,

    /// Usage to merge into the run's tracker.
    pub token_usage_patch: TokenUsage,

    /// Stop reason reported by a model call made in this step.
    pub stop_reason: Option<StopReason>,
}

impl StepResult {
    /// Transition to `next` with no patches.
    pub fn next(next: impl Into<String>) -> Self {
        Self {
            next: next.into(),
            ..Self::default()
        }
    }

    /// Finish the run.
    pub fn end() -> Self {
        Self::next(END)
    }

    /// Attach a state patch.
    pub fn with_patch(mut self, patch: StatePatch) -> Self {
        self.state_patch = patch;
        self
    }

    /// Attach a usage patch.
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.token_usage_patch = usage;
        self
    }

    /// Whether this result finishes the run.
    pub fn is_end(&self) -> bool {
        self.next == END
    }
}

/// A named unit of the execution loop.
#[async_trait]
pub trait Step: Send + Sync {
    /// Derive parameters from the shared context.
    async fn before_execute(&self, ctx: &ExecutionContext) -> Result<StepParams> {
        Ok(StepParams {
            messages: ctx.state.messages.clone(),
            tool_uses: ctx.pending_tool_uses(),
            extra: Value::Null,
        })
    }

    /// Do the work.
    async fn execute(&self, params: StepParams, ctx: &ExecutionContext, sink: &EventSink) -> Result<StepResult>;

    /// Post-process the result.
    async fn after_execute(&self, result: StepResult, _ctx: &ExecutionContext) -> Result<StepResult> {
        Ok(result)
    }
}

/// Mapping from step name to step.
pub type StepTable = BTreeMap<String, Arc<dyn Step>>;

/// The built-in step table.
pub fn default_steps() -> StepTable {
    let mut table: StepTable = BTreeMap::new();
    table.insert(LLM_CALL.to_owned(), Arc::new(LlmCall));
    table.insert(TOOL_CALL.to_owned(), Arc::new(ToolCall));
    table.insert(TOOL_RESULT.to_owned(), Arc::new(ToolResultStep));
    table.insert(AGENT_CALL.to_owned(), Arc::new(AgentCall));
    table
}

/// Where to go once tool results have been merged.
pub(crate) fn after_results(ctx: &ExecutionContext) -> &'static str {
    match ctx.stop_condition {
        StopCondition::ToolResult => END,
        StopCondition::Terminal | StopCondition::ToolUse => LLM_CALL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_holds_builtin_steps() {
        let table = default_steps();
        let names: Vec<_> = table.keys().map(String::as_str).collect();
        assert_eq!(names, vec![AGENT_CALL, LLM_CALL, TOOL_CALL, TOOL_RESULT]);
        assert!(!table.contains_key(END));
    }

    #[test]
    fn step_result_builders() {
        let result = StepResult::next(TOOL_CALL)
            .with_patch(StatePatch::messages(vec![Message::assistant("hi")]));
        assert_eq!(result.next, TOOL_CALL);
        assert!(!result.is_end());
        assert!(StepResult::end().is_end());
    }
}
