//! The step-driving state machine.
//!
//! ```text
//!            ┌───────────────────── step table ─────────────────────┐
//!  start ──> │ before_execute ─> execute (yields events) ─> after  │ ──> next?
//!            └──────────────────────────────────────────────────────┘      │
//!                 ^            merge state patch, merge usage              │
//!                 └────────────────────────────────────────────────────────┘
//!                                                   until next == "end" ──> stop
//! ```
//!
//! Each run is a [`RunCoroutine`] wrapped in [`ContextInjection`] and then
//! in the agent's own middleware.  Nested runs go through the very same
//! entry point.

use std::sync::Arc;

use tracing::{debug, info};

use crate::agent::{Agent, RunOutput};
use crate::context::{ExecutionContext, RunOptions};
use crate::coroutine::{BoxEventStream, EventSink, RunCoroutine};
use crate::error::{AgentError, Result};
use crate::event::{EventKind, EventScope};
use crate::message::Message;
use crate::middleware::{ContextInjection, Middleware, compose};
use crate::provider::StopReason;
use crate::state::StatePatch;
use crate::step::END;

/// Create the event stream for a run of `agent`.
///
/// `parent` is the scope of the delegating run for nested runs and `None`
/// for top-level runs.
pub(crate) fn start_run(
    agent: Arc<Agent>,
    messages: Vec<Message>,
    options: RunOptions,
    parent: Option<&EventScope>,
) -> BoxEventStream {
    let scope = match parent {
        Some(parent) => parent.child(agent.name()),
        None => EventScope::root(agent.name()),
    };
    let layers = agent.middleware().to_vec();
    let ctx = ExecutionContext::new(agent, scope.clone(), parent.cloned(), options);

    let body: BoxEventStream = Box::new(RunCoroutine::new(move |sink| run(ctx, messages, sink)));
    let injected = ContextInjection.wrap(body, &scope);
    compose(&layers, injected, &scope)
}

/// Drive steps until one transitions to [`END`].
async fn run(mut ctx: ExecutionContext, messages: Vec<Message>, sink: EventSink) -> Result<RunOutput> {
    ctx.apply_patch(StatePatch::messages(messages));

    info!(
        agent = %ctx.scope.agent_name,
        run_id = %ctx.scope.run_id,
        depth = ctx.scope.depth(),
        messages = ctx.state.messages.len(),
        "run started"
    );
    sink.yield_(ctx.event(EventKind::Start)).await;

    let agent = Arc::clone(&ctx.agent);
    let max_steps = agent.max_steps();
    let mut current = agent.start_step().to_owned();

    while current != END {
        if max_steps > 0 && ctx.steps_taken >= max_steps {
            return Err(AgentError::MaxStepsExceeded {
                agent: agent.name().to_owned(),
                max_steps,
            });
        }

        let step = agent
            .step(&current)
            .cloned()
            .ok_or_else(|| AgentError::UnknownStep { name: current.clone() })?;

        debug!(agent = %ctx.scope.agent_name, step = %current, n = ctx.steps_taken, "executing step");

        let params = step.before_execute(&ctx).await?;
        let result = step.execute(params, &ctx, &sink).await?;
        let result = step.after_execute(result, &ctx).await?;

        if result.next != END && !agent.has_step(&result.next) {
            return Err(AgentError::UnknownStep { name: result.next });
        }

        ctx.apply_patch(result.state_patch);
        ctx.token_usage.merge(result.token_usage_patch);
        if result.stop_reason.is_some() {
            ctx.last_stop_reason = result.stop_reason;
        }
        ctx.steps_taken += 1;

        debug!(agent = %ctx.scope.agent_name, from = %current, to = %result.next, "step transition");
        current = result.next;
    }

    let halted_early = !matches!(ctx.last_stop_reason, Some(reason) if reason != StopReason::ToolUse);
    sink.yield_(ctx.event(EventKind::Stop {
        stop_reason: ctx.last_stop_reason,
        halted_early,
    }))
    .await;

    info!(
        agent = %ctx.scope.agent_name,
        run_id = %ctx.scope.run_id,
        steps = ctx.steps_taken,
        messages = ctx.state.messages.len(),
        total_tokens = ctx.token_usage.total_tokens(),
        halted_early,
        "run finished"
    );

    Ok(ctx.into_output())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
