//! Tool-use dispatch.
//!
//! Resolves every pending tool-use block against the agent's leaf tools and
//! nested agents, then runs them one after another in the order the model
//! requested them.  Leaf tool failures become error results so the model can
//! react to them; a nested agent failure fails the whole run.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::context::{ExecutionContext, RunOptions};
use crate::coroutine::{CoroutineState, EventSink};
use crate::engine;
use crate::error::{AgentError, Result};
use crate::event::EventKind;
use crate::message::{ContentBlock, Message, Role, ToolResultBlock, ToolUseBlock};
use crate::tool::Tool;
use crate::usage::TokenUsage;

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// What a tool-use block resolved to.
#[derive(Clone)]
pub enum Target {
    /// A leaf tool.
    Tool(Arc<dyn Tool>),
    /// A nested agent.
    Agent(Arc<Agent>),
}

impl Target {
    /// Whether this target is a nested agent.
    pub fn is_agent(&self) -> bool {
        matches!(self, Self::Agent(_))
    }
}

/// Results of a dispatch round.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// One result per tool-use block, in request order.
    pub results: Vec<ToolResultBlock>,

    /// Usage reported by tools and nested agents.
    pub token_usage: TokenUsage,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Executes tool-use blocks on behalf of one run.
pub struct Dispatcher<'a> {
    ctx: &'a ExecutionContext,
    sink: &'a EventSink,
}

impl<'a> Dispatcher<'a> {
    /// Create a dispatcher for the run described by `ctx`.
    pub fn new(ctx: &'a ExecutionContext, sink: &'a EventSink) -> Self {
        Self { ctx, sink }
    }

    /// Resolve a tool name.  Leaf tools shadow nothing: names are unique
    /// across tools and agents.
    pub fn resolve(&self, name: &str) -> Option<Target> {
        if let Some(tool) = self.ctx.agent.find_tool(name) {
            return Some(Target::Tool(Arc::clone(tool)));
        }
        self.ctx
            .agent
            .find_agent(name)
            .map(|agent| Target::Agent(Arc::clone(agent)))
    }

    /// Resolve every block up front so a bad name fails before anything runs.
    pub fn classify(&self, tool_uses: &[ToolUseBlock]) -> Result<Vec<Target>> {
        tool_uses
            .iter()
            .map(|tool_use| {
                self.resolve(&tool_use.name)
                    .ok_or_else(|| AgentError::UnresolvedTool {
                        name: tool_use.name.clone(),
                    })
            })
            .collect()
    }

    /// Execute `tool_uses` in order, yielding a `tool-result` event per block.
    pub async fn dispatch(&self, tool_uses: &[ToolUseBlock]) -> Result<DispatchOutcome> {
        let targets = self.classify(tool_uses)?;
        let mut outcome = DispatchOutcome::default();

        for (tool_use, target) in tool_uses.iter().zip(targets) {
            let block = match target {
                Target::Tool(tool) => self.run_tool(tool.as_ref(), tool_use, &mut outcome.token_usage).await,
                Target::Agent(agent) => self.run_agent(agent, tool_use, &mut outcome.token_usage).await?,
            };

            self.sink
                .yield_(self.ctx.event(EventKind::ToolResult { result: block.clone() }))
                .await;
            outcome.results.push(block);
        }

        Ok(outcome)
    }

    async fn run_tool(&self, tool: &dyn Tool, tool_use: &ToolUseBlock, usage: &mut TokenUsage) -> ToolResultBlock {
        debug!(
            agent = %self.ctx.scope.agent_name,
            tool = %tool_use.name,
            tool_use_id = %tool_use.id,
            "executing tool"
        );

        let context = self.ctx.tool_context(tool_use);
        match tool.execute(tool_use.input.clone(), &context).await {
            Ok(output) => {
                for record in &output.token_usage {
                    usage.add_child_usage(tool_use.name.clone(), record.clone());
                }
                if output.is_error {
                    warn!(tool = %tool_use.name, tool_use_id = %tool_use.id, "tool reported an error");
                }
                ToolResultBlock::for_tool_use(tool_use, output.content(), output.is_error)
            }
            Err(e) => {
                warn!(tool = %tool_use.name, tool_use_id = %tool_use.id, error = %e, "tool execution failed");
                ToolResultBlock::error(tool_use, e.to_string())
            }
        }
    }

    async fn run_agent(
        &self,
        agent: Arc<Agent>,
        tool_use: &ToolUseBlock,
        usage: &mut TokenUsage,
    ) -> Result<ToolResultBlock> {
        info!(
            agent = %self.ctx.scope.agent_name,
            delegate = %agent.name(),
            tool_use_id = %tool_use.id,
            "starting nested run"
        );

        let options = RunOptions {
            stream: Some(self.ctx.stream),
            context: self.ctx.context.clone(),
            emit_llm_input: Some(self.ctx.emit_llm_input),
        };
        let seed = seed_messages(&tool_use.input);
        let mut child = engine::start_run(agent, seed, options, Some(&self.ctx.scope));

        // Forward every nested event outward and pass answers back in.
        let mut input = None;
        let output = loop {
            match child.resume(input.take()).await? {
                CoroutineState::Yielded(event) => input = self.sink.yield_(event).await,
                CoroutineState::Complete(output) => break output,
            }
        };

        let content = output
            .last_assistant_message()
            .map(|message| message.content.clone())
            .unwrap_or_default();
        usage.add_child_details(tool_use.name.clone(), output.token_usage);

        Ok(ToolResultBlock::for_tool_use(tool_use, content, false))
    }
}

/// Derive a nested agent's initial messages from a tool-use input.
///
/// Accepts `{"messages": [...]}` verbatim, `{"prompt": "..."}` or a bare
/// string as a single user message, and anything else as its JSON text.
pub fn seed_messages(input: &Value) -> Vec<Message> {
    if let Some(messages) = input.get("messages") {
        if let Ok(messages) = serde_json::from_value::<Vec<Message>>(messages.clone()) {
            return messages;
        }
    }

    let text = match input {
        Value::String(s) => s.clone(),
        _ => match input.get("prompt").and_then(Value::as_str) {
            Some(prompt) => prompt.to_owned(),
            None => input.to_string(),
        },
    };
    vec![Message::new(Role::User, vec![ContentBlock::text(text)])]
}
