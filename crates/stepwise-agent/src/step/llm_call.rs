//! The model-call step.

use async_trait::async_trait;
use futures::StreamExt;
use tracing::debug;

use super::{END, Step, StepParams, StepResult, TOOL_CALL};
use crate::context::ExecutionContext;
use crate::coroutine::EventSink;
use crate::error::{AgentError, Result};
use crate::event::EventKind;
use crate::message::{Message, Role};
use crate::provider::{ProviderChunk, ProviderRequest, StopReason};
use crate::state::StatePatch;
use crate::usage::TokenUsage;

/// Sends the conversation to the provider and appends its reply.
///
/// Transitions to `tool-call` when the model stops for tool use, otherwise
/// ends the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct LlmCall;

#[async_trait]
impl Step for LlmCall {
    async fn execute(&self, params: StepParams, ctx: &ExecutionContext, sink: &EventSink) -> Result<StepResult> {
        let request = ProviderRequest {
            messages: params.messages,
            system_prompt: ctx.instructions.clone(),
            tools: ctx.tool_definitions(),
            stream: ctx.stream,
        };

        if ctx.emit_llm_input {
            sink.yield_(ctx.event(EventKind::LlmInput {
                system_prompt: request.system_prompt.clone(),
                messages: request.messages.clone(),
                tools: request.tools.iter().map(|t| t.name.clone()).collect(),
            }))
            .await;
        }

        debug!(
            agent = %ctx.scope.agent_name,
            provider = ctx.provider.name(),
            messages = request.messages.len(),
            tools = request.tools.len(),
            "calling provider"
        );

        let mut chunks = ctx.provider.generate(request);
        let mut response = None;
        while let Some(chunk) = chunks.next().await {
            match chunk? {
                ProviderChunk::Delta(delta) => {
                    if ctx.stream {
                        sink.yield_(ctx.event(EventKind::LlmStreaming { delta })).await;
                    }
                }
                ProviderChunk::Completed(done) => response = Some(done),
            }
        }
        drop(chunks);
        let response = response.ok_or(AgentError::ProviderStreamIncomplete)?;

        let mut usage = TokenUsage::new();
        for record in response.tokens {
            usage.push_completion(record);
        }

        let next = match response.stop_reason {
            StopReason::ToolUse => TOOL_CALL,
            StopReason::EndTurn | StopReason::MaxTokens | StopReason::StopSequence => END,
        };

        debug!(
            agent = %ctx.scope.agent_name,
            stop_reason = ?response.stop_reason,
            next,
            "provider responded"
        );

        Ok(StepResult {
            next: next.to_owned(),
            state_patch: StatePatch::messages(vec![Message::new(Role::Assistant, response.content)]),
            token_usage_patch: usage,
            stop_reason: Some(response.stop_reason),
        })
    }
}
