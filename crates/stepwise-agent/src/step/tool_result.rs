//! The tool-result step.

use async_trait::async_trait;

use super::{Step, StepParams, StepResult, after_results};
use crate::context::ExecutionContext;
use crate::coroutine::EventSink;
use crate::dispatch::Dispatcher;
use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::state::StatePatch;

/// Executes the pending leaf tools in order and appends their results as a
/// single user message.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolResultStep;

#[async_trait]
impl Step for ToolResultStep {
    async fn execute(&self, params: StepParams, ctx: &ExecutionContext, sink: &EventSink) -> Result<StepResult> {
        if ctx.state.messages.is_empty() {
            return Err(AgentError::MissingLastMessage);
        }

        let outcome = Dispatcher::new(ctx, sink).dispatch(&params.tool_uses).await?;

        Ok(StepResult::next(after_results(ctx))
            .with_patch(StatePatch::messages(vec![Message::tool_results(outcome.results)]))
            .with_usage(outcome.token_usage))
    }
}
