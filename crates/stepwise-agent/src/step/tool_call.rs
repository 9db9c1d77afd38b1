//! The tool-call step: the human-in-the-loop suspension point.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::debug;

use super::{AGENT_CALL, END, Step, StepParams, StepResult, TOOL_RESULT, after_results};
use crate::context::{ExecutionContext, StopCondition};
use crate::coroutine::EventSink;
use crate::error::{AgentError, Result};
use crate::event::{EventKind, ExternalToolResults};
use crate::message::{Message, ToolResultBlock, ToolUseBlock};
use crate::state::StatePatch;
use crate::usage::TokenUsage;

/// Yields the pending tool-use blocks as a `tool-call-params` event and
/// routes on the consumer's answer.
///
/// - Results sent back into the event are merged in the order of the
///   pending blocks and the run continues with the next model call.  They
///   must answer every pending block exactly once.
/// - Under [`StopCondition::ToolUse`] the run ends without executing
///   anything.
/// - Otherwise execution moves to `agent-call` when any block targets a
///   nested agent, and to `tool-result` when all target leaf tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolCall;

#[async_trait]
impl Step for ToolCall {
    async fn execute(&self, params: StepParams, ctx: &ExecutionContext, sink: &EventSink) -> Result<StepResult> {
        if ctx.state.messages.is_empty() {
            return Err(AgentError::MissingLastMessage);
        }
        if params.tool_uses.is_empty() {
            debug!(agent = %ctx.scope.agent_name, "no pending tool-use blocks; ending run");
            return Ok(StepResult::end());
        }

        let has_agent_calls = params
            .tool_uses
            .iter()
            .any(|tool_use| ctx.agent.find_agent(&tool_use.name).is_some());

        let pending = params.tool_uses.clone();
        let injected = sink
            .yield_(ctx.event(EventKind::ToolCallParams {
                tool_uses: params.tool_uses,
                has_agent_calls,
            }))
            .await;

        if let Some(results) = injected {
            debug!(
                agent = %ctx.scope.agent_name,
                results = results.len(),
                "merging externally supplied tool results"
            );
            let next = match ctx.stop_condition {
                StopCondition::ToolUse => END,
                _ => after_results(ctx),
            };
            let (patch, usage) = merge_injected(&pending, results)?;
            return Ok(StepResult::next(next).with_patch(patch).with_usage(usage));
        }

        let next = match ctx.stop_condition {
            StopCondition::ToolUse => END,
            _ if has_agent_calls => AGENT_CALL,
            _ => TOOL_RESULT,
        };
        Ok(StepResult::next(next))
    }
}

/// Turn injected results into the tool-result message and usage patch.
///
/// Blocks come out in the order of `pending`, whatever order the results
/// arrived in.
fn merge_injected(pending: &[ToolUseBlock], results: ExternalToolResults) -> Result<(StatePatch, TokenUsage)> {
    let mut by_id = BTreeMap::new();
    for external in results {
        let id = external.tool_use.id.clone();
        if by_id.insert(id.clone(), external).is_some() {
            return Err(AgentError::InvalidToolResults {
                reason: format!("duplicate result for tool use `{id}`"),
            });
        }
    }

    let mut usage = TokenUsage::new();
    let mut blocks = Vec::with_capacity(pending.len());
    for tool_use in pending {
        let external = by_id.remove(&tool_use.id).ok_or_else(|| AgentError::InvalidToolResults {
            reason: format!("no result for tool use `{}`", tool_use.id),
        })?;
        for record in &external.result.token_usage {
            usage.add_child_usage(tool_use.name.clone(), record.clone());
        }
        blocks.push(ToolResultBlock::for_tool_use(
            tool_use,
            external.result.content(),
            external.result.is_error,
        ));
    }

    if let Some(unknown) = by_id.keys().next() {
        return Err(AgentError::InvalidToolResults {
            reason: format!("result for unknown tool use `{unknown}`"),
        });
    }

    Ok((StatePatch::messages(vec![Message::tool_results(blocks)]), usage))
}
