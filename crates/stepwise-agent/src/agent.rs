//! Agent configuration and the engine entry points.
//!
//! An [`Agent`] is immutable once built and shared behind an [`Arc`]: the
//! same agent may be run any number of times, concurrently, and may appear
//! as a nested agent inside other agents.  Each run owns its own
//! [`ExecutionContext`](crate::context::ExecutionContext).

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::config::AgentSettings;
use crate::context::{RunOptions, StopCondition};
use crate::coroutine::{self, BoxEventStream};
use crate::engine;
use crate::error::{AgentError, Result};
use crate::message::{Message, Role};
use crate::middleware::Middleware;
use crate::provider::{Provider, ToolDefinition};
use crate::state::StateReducer;
use crate::step::{LLM_CALL, Step, StepTable, default_steps};
use crate::tool::Tool;
use crate::usage::TokenUsage;

/// Default upper bound on steps per run.
pub const DEFAULT_MAX_STEPS: u32 = 256;

// ---------------------------------------------------------------------------
// Run output
// ---------------------------------------------------------------------------

/// Final value of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    /// Full conversation history, including the initial messages.
    pub messages: Vec<Message>,

    /// Non-message state fields.
    #[serde(default)]
    pub state: Map<String, Value>,

    /// Usage accumulated by the run and everything it delegated to.
    #[serde(default)]
    pub token_usage: TokenUsage,
}

impl RunOutput {
    /// The most recent assistant message.
    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    /// Text of the most recent assistant message.
    pub fn text(&self) -> String {
        self.last_assistant_message().map(Message::text).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// Immutable agent configuration.
pub struct Agent {
    name: String,
    description: String,
    provider: Arc<dyn Provider>,
    instructions: Option<String>,
    tools: Vec<Arc<dyn Tool>>,
    agents: Vec<Arc<Agent>>,
    reducer: StateReducer,
    steps: StepTable,
    start_step: String,
    middleware: Vec<Arc<dyn Middleware>>,
    stop_condition: StopCondition,
    stream: bool,
    emit_llm_input: bool,
    max_steps: u32,
}

impl Agent {
    /// Start configuring an agent called `name`.
    pub fn builder(name: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    /// Nested agents this agent may delegate to.
    pub fn agents(&self) -> &[Arc<Agent>] {
        &self.agents
    }

    pub fn reducer(&self) -> &StateReducer {
        &self.reducer
    }

    pub fn steps(&self) -> &StepTable {
        &self.steps
    }

    pub fn start_step(&self) -> &str {
        &self.start_step
    }

    /// User-supplied middleware, outermost first.
    pub fn middleware(&self) -> &[Arc<dyn Middleware>] {
        &self.middleware
    }

    pub fn stop_condition(&self) -> StopCondition {
        self.stop_condition
    }

    /// Whether runs emit `llm-streaming` events unless told otherwise.
    pub fn stream(&self) -> bool {
        self.stream
    }

    /// Whether runs emit `llm-input` events unless told otherwise.
    pub fn emit_llm_input(&self) -> bool {
        self.emit_llm_input
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Look up a step by name.
    pub fn step(&self, name: &str) -> Option<&Arc<dyn Step>> {
        self.steps.get(name)
    }

    pub fn has_step(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }

    /// Look up a leaf tool by name.
    pub fn find_tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    /// Look up a nested agent by name.
    pub fn find_agent(&self, name: &str) -> Option<&Arc<Agent>> {
        self.agents.iter().find(|agent| agent.name() == name)
    }

    /// How this agent is advertised to a delegating agent's model.
    pub fn as_tool_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "prompt": { "type": "string" }
                },
                "required": ["prompt"]
            }),
        }
    }

    /// Every tool and nested agent the model may call, tools first.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| tool.definition())
            .chain(self.agents.iter().map(|agent| agent.as_tool_definition()))
            .collect()
    }

    /// Start a run seeded with `messages`.
    ///
    /// Nothing happens until the returned stream is first resumed.  Dropping
    /// the stream abandons the run.
    pub fn iterate(self: &Arc<Self>, messages: Vec<Message>, options: RunOptions) -> BoxEventStream {
        engine::start_run(Arc::clone(self), messages, options, None)
    }

    /// Run to completion and return the final value.
    pub async fn execute(self: &Arc<Self>, messages: Vec<Message>, options: RunOptions) -> Result<RunOutput> {
        coroutine::drain(self.iterate(messages, options)).await
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("provider", &self.provider.name())
            .field("tools", &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>())
            .field("agents", &self.agents.iter().map(|a| a.name()).collect::<Vec<_>>())
            .field("steps", &self.steps.keys().collect::<Vec<_>>())
            .field("start_step", &self.start_step)
            .field("middleware", &self.middleware.iter().map(|m| m.name()).collect::<Vec<_>>())
            .field("stop_condition", &self.stop_condition)
            .field("max_steps", &self.max_steps)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`Agent`].
pub struct AgentBuilder {
    name: String,
    description: String,
    provider: Option<Arc<dyn Provider>>,
    instructions: Option<String>,
    tools: Vec<Arc<dyn Tool>>,
    agents: Vec<Arc<Agent>>,
    reducer: StateReducer,
    steps: StepTable,
    start_step: String,
    middleware: Vec<Arc<dyn Middleware>>,
    stop_condition: StopCondition,
    stream: bool,
    emit_llm_input: bool,
    max_steps: u32,
}

impl AgentBuilder {
    /// A builder with the default step table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            provider: None,
            instructions: None,
            tools: Vec::new(),
            agents: Vec::new(),
            reducer: StateReducer::new(),
            steps: default_steps(),
            start_step: LLM_CALL.to_owned(),
            middleware: Vec::new(),
            stop_condition: StopCondition::default(),
            stream: false,
            emit_llm_input: false,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Apply loaded settings.  The name is only replaced when set.
    pub fn settings(mut self, settings: AgentSettings) -> Self {
        if let Some(name) = settings.name {
            self.name = name;
        }
        if let Some(description) = settings.description {
            self.description = description;
        }
        if settings.instructions.is_some() {
            self.instructions = settings.instructions;
        }
        if let Some(start_step) = settings.start_step {
            self.start_step = start_step;
        }
        self.stop_condition = settings.stop_condition;
        self.stream = settings.stream;
        self.emit_llm_input = settings.emit_llm_input;
        self.max_steps = settings.max_steps;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Register a leaf tool.
    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    /// Register a nested agent.
    pub fn agent(mut self, agent: Arc<Agent>) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn reducer(mut self, reducer: StateReducer) -> Self {
        self.reducer = reducer;
        self
    }

    /// Add or replace a single step.
    pub fn step(mut self, name: impl Into<String>, step: Arc<dyn Step>) -> Self {
        self.steps.insert(name.into(), step);
        self
    }

    /// Replace the whole step table.
    pub fn steps(mut self, steps: StepTable) -> Self {
        self.steps = steps;
        self
    }

    pub fn start_step(mut self, name: impl Into<String>) -> Self {
        self.start_step = name.into();
        self
    }

    /// Append a middleware layer.  Earlier layers wrap later ones.
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn stop_condition(mut self, stop_condition: StopCondition) -> Self {
        self.stop_condition = stop_condition;
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn emit_llm_input(mut self, emit: bool) -> Self {
        self.emit_llm_input = emit;
        self
    }

    pub fn max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Validate and freeze the configuration.
    pub fn build(self) -> Result<Arc<Agent>> {
        if self.name.trim().is_empty() {
            return Err(AgentError::ConfigError {
                reason: "agent name must not be empty".into(),
            });
        }
        let provider = self.provider.ok_or_else(|| AgentError::ConfigError {
            reason: format!("agent `{}` has no provider", self.name),
        })?;

        let mut seen = BTreeSet::new();
        let names = self
            .tools
            .iter()
            .map(|tool| tool.name())
            .chain(self.agents.iter().map(|agent| agent.name()));
        for name in names {
            if !seen.insert(name) {
                return Err(AgentError::DuplicateName { name: name.to_owned() });
            }
        }

        if self.steps.keys().any(|name| name.trim().is_empty()) {
            return Err(AgentError::ConfigError {
                reason: "step names must not be empty".into(),
            });
        }
        if !self.steps.contains_key(&self.start_step) {
            return Err(AgentError::UnknownStep { name: self.start_step });
        }

        tracing::debug!(
            agent = %self.name,
            tools = self.tools.len(),
            agents = self.agents.len(),
            steps = self.steps.len(),
            "agent built"
        );

        Ok(Arc::new(Agent {
            name: self.name,
            description: self.description,
            provider,
            instructions: self.instructions,
            tools: self.tools,
            agents: self.agents,
            reducer: self.reducer,
            steps: self.steps,
            start_step: self.start_step,
            middleware: self.middleware,
            stop_condition: self.stop_condition,
            stream: self.stream,
            emit_llm_input: self.emit_llm_input,
            max_steps: self.max_steps,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
