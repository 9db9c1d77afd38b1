//! Step-driven execution engine for multi-turn LLM agents.
//!
//! An agent run is a loop of model calls, tool requests, tool execution or
//! delegation to nested agents, and results fed back to the model, until a
//! step transitions to `end`.  Runs are exposed as resumable, pull-based
//! event streams: the consumer advances the run, may answer a
//! `tool-call-params` event with externally computed results, and stops the
//! run simply by dropping the stream.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  resume(input)  ┌────────────┐    ┌─────────────────┐
//! │  Consumer  │────────────────>│ Middleware │───>│ ContextInjection│
//! │            │<────────────────│  (outer…)  │<───│                 │
//! └────────────┘     events      └────────────┘    └────────┬────────┘
//!                                                           │
//!                                            ┌──────────────┴──────────────┐
//!                                            │ Engine: step state machine  │
//!                                            │ llm-call → tool-call → ...  │
//!                                            └──────┬───────────────┬──────┘
//!                                                   │               │
//!                                            ┌──────┴─────┐  ┌──────┴──────┐
//!                                            │  Provider  │  │ Dispatcher  │
//!                                            │  (stream)  │  │ tools/agents│
//!                                            └────────────┘  └──────┬──────┘
//!                                                                   │
//!                                                      nested run (same engine)
//! ```
//!
//! ## Modules
//!
//! - [`agent`] -- Immutable agent configuration, builder, `iterate`/`execute`.
//! - [`engine`] -- The loop driving steps and merging their patches.
//! - [`step`] -- The step contract and the built-in steps.
//! - [`dispatch`] -- Resolution and sequential execution of tool-use blocks.
//! - [`middleware`] -- Layers around a run's event stream.
//! - [`coroutine`] -- Resumable generator plumbing.
//! - [`usage`] -- Hierarchical token usage accounting.
//! - [`state`] -- Agent state and the reducer that merges patches.
//! - [`config`] -- TOML-loadable agent settings.
//! - [`telemetry`] -- Tracing subscriber helpers.
//! - [`error`] -- Engine error types.

pub mod agent;
pub mod config;
pub mod context;
pub mod coroutine;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod event;
pub mod message;
pub mod middleware;
pub mod provider;
pub mod state;
pub mod step;
pub mod telemetry;
pub mod tool;
pub mod usage;

// Re-export the most commonly used types at the crate root.
pub use agent::{Agent, AgentBuilder, DEFAULT_MAX_STEPS, RunOutput};
pub use config::AgentSettings;
pub use context::{ExecutionContext, RunOptions, StopCondition};
pub use coroutine::{BoxEventStream, CoroutineState, EventSink, EventStream, collect, drain};
pub use dispatch::{DispatchOutcome, Dispatcher, Target, seed_messages};
pub use error::{AgentError, Result};
pub use event::{EventKind, EventScope, ExecutionEvent, ExternalToolResult, ExternalToolResults};
pub use message::{ContentBlock, ImageSource, Message, Role, ToolResultBlock, ToolUseBlock};
pub use middleware::{ContextInjection, EventMapper, EventObserver, LoggingMiddleware, Middleware, compose};
pub use provider::{
    ContentDelta, Provider, ProviderChunk, ProviderRequest, ProviderResponse, ProviderStream, StopReason,
    ToolDefinition, completed_stream,
};
pub use state::{AgentState, FieldReducer, StatePatch, StateReducer};
pub use step::{AGENT_CALL, END, LLM_CALL, Step, StepParams, StepResult, StepTable, TOOL_CALL, TOOL_RESULT, default_steps};
pub use telemetry::{init_tracing, init_tracing_json};
pub use tool::{Tool, ToolContext, ToolOutput};
pub use usage::{ChildUsage, TokenTotals, TokenUsage, UsageRecord};
