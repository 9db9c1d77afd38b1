//! The agent-call step.

use async_trait::async_trait;
use tracing::info;

use super::{Step, StepParams, StepResult, after_results};
use crate::context::ExecutionContext;
use crate::coroutine::EventSink;
use crate::dispatch::Dispatcher;
use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::state::StatePatch;

/// Executes pending tool-use blocks when at least one targets a nested
/// agent.
///
/// Every block is still handled in its original order, so leaf tools
/// requested alongside an agent keep their position in the result message.
/// Nested runs are driven to completion inside this step and every event
/// they yield is forwarded to the consumer.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentCall;

#[async_trait]
impl Step for AgentCall {
    async fn execute(&self, params: StepParams, ctx: &ExecutionContext, sink: &EventSink) -> Result<StepResult> {
        if ctx.state.messages.is_empty() {
            return Err(AgentError::MissingLastMessage);
        }

        let agents: Vec<_> = params
            .tool_uses
            .iter()
            .filter(|tool_use| ctx.agent.find_agent(&tool_use.name).is_some())
            .map(|tool_use| tool_use.name.as_str())
            .collect();
        info!(
            agent = %ctx.scope.agent_name,
            delegates = ?agents,
            "delegating to nested agents"
        );

        let outcome = Dispatcher::new(ctx, sink).dispatch(&params.tool_uses).await?;

        Ok(StepResult::next(after_results(ctx))
            .with_patch(StatePatch::messages(vec![Message::tool_results(outcome.results)]))
            .with_usage(outcome.token_usage))
    }
}
