//! Event stream middleware.
//!
//! A middleware wraps a run's [`EventStream`] in another one.  It sees every
//! event on its way out, every value sent back in, and the final
//! [`RunOutput`], and may observe or rewrite any of them.
//!
//! An agent's middleware list is applied right to left, so the first entry
//! is the outermost layer: it sees events last and the consumer's input
//! first.  [`ContextInjection`] always sits innermost, beneath every
//! user-supplied layer.

use std::sync::Arc;

use async_trait::async_trait;

use crate::agent::RunOutput;
use crate::coroutine::{BoxEventStream, CoroutineState, EventStream};
use crate::error::Result;
use crate::event::{EventScope, ExecutionEvent, ExternalToolResults};

/// A layer around a run's event stream.
pub trait Middleware: Send + Sync {
    /// Human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Wrap `inner`, the stream of the run identified by `scope`.
    fn wrap(&self, inner: BoxEventStream, scope: &EventScope) -> BoxEventStream;
}

/// Apply `middleware` around `inner`, first entry outermost.
pub fn compose(middleware: &[Arc<dyn Middleware>], inner: BoxEventStream, scope: &EventScope) -> BoxEventStream {
    middleware.iter().rev().fold(inner, |stream, layer| {
        tracing::trace!(middleware = layer.name(), agent = %scope.agent_name, "wrapping event stream");
        layer.wrap(stream, scope)
    })
}

// ---------------------------------------------------------------------------
// Context injection
// ---------------------------------------------------------------------------

/// Stamps the run's [`EventScope`] on events that do not carry one yet.
///
/// Events forwarded from a nested run already carry the nested run's scope
/// and pass through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextInjection;

impl Middleware for ContextInjection {
    fn name(&self) -> &str {
        "context-injection"
    }

    fn wrap(&self, inner: BoxEventStream, scope: &EventScope) -> BoxEventStream {
        Box::new(Injected {
            inner,
            scope: scope.clone(),
        })
    }
}

struct Injected {
    inner: BoxEventStream,
    scope: EventScope,
}

#[async_trait]
impl EventStream for Injected {
    async fn resume(
        &mut self,
        input: Option<ExternalToolResults>,
    ) -> Result<CoroutineState<ExecutionEvent, RunOutput>> {
        match self.inner.resume(input).await? {
            CoroutineState::Yielded(mut event) => {
                if event.scope.is_none() {
                    event.scope = Some(self.scope.clone());
                }
                Ok(CoroutineState::Yielded(event))
            }
            done => Ok(done),
        }
    }
}

// ---------------------------------------------------------------------------
// Event mapper
// ---------------------------------------------------------------------------

/// Rewrites an outgoing event.
pub type EventFn = Arc<dyn Fn(ExecutionEvent, &EventScope) -> ExecutionEvent + Send + Sync>;

/// Rewrites a run's final value.
pub type OutputFn = Arc<dyn Fn(RunOutput, &EventScope) -> RunOutput + Send + Sync>;

/// Middleware built from closures.
///
/// ```ignore
/// let tagger = EventMapper::new("tagger", |mut event, _scope| {
///     event.agent_name = event.agent_name.to_uppercase();
///     event
/// });
/// ```
#[derive(Clone)]
pub struct EventMapper {
    name: String,
    on_event: EventFn,
    on_output: Option<OutputFn>,
}

impl EventMapper {
    /// Map every outgoing event through `on_event`.
    pub fn new<F>(name: impl Into<String>, on_event: F) -> Self
    where
        F: Fn(ExecutionEvent, &EventScope) -> ExecutionEvent + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            on_event: Arc::new(on_event),
            on_output: None,
        }
    }

    /// Also map the final value through `on_output`.
    pub fn with_output<F>(mut self, on_output: F) -> Self
    where
        F: Fn(RunOutput, &EventScope) -> RunOutput + Send + Sync + 'static,
    {
        self.on_output = Some(Arc::new(on_output));
        self
    }
}

impl Middleware for EventMapper {
    fn name(&self) -> &str {
        &self.name
    }

    fn wrap(&self, inner: BoxEventStream, scope: &EventScope) -> BoxEventStream {
        Box::new(Mapped {
            inner,
            scope: scope.clone(),
            on_event: Arc::clone(&self.on_event),
            on_output: self.on_output.clone(),
        })
    }
}

struct Mapped {
    inner: BoxEventStream,
    scope: EventScope,
    on_event: EventFn,
    on_output: Option<OutputFn>,
}

#[async_trait]
impl EventStream for Mapped {
    async fn resume(
        &mut self,
        input: Option<ExternalToolResults>,
    ) -> Result<CoroutineState<ExecutionEvent, RunOutput>> {
        Ok(match self.inner.resume(input).await? {
            CoroutineState::Yielded(event) => CoroutineState::Yielded((self.on_event)(event, &self.scope)),
            CoroutineState::Complete(output) => CoroutineState::Complete(match &self.on_output {
                Some(map) => map(output, &self.scope),
                None => output,
            }),
        })
    }
}

// ---------------------------------------------------------------------------
// Event observer
// ---------------------------------------------------------------------------

/// Calls a closure for every outgoing event without changing it.
#[derive(Clone)]
pub struct EventObserver {
    name: String,
    observe: Arc<dyn Fn(&ExecutionEvent) + Send + Sync>,
}

impl EventObserver {
    /// Watch events with `observe`.
    pub fn new<F>(name: impl Into<String>, observe: F) -> Self
    where
        F: Fn(&ExecutionEvent) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            observe: Arc::new(observe),
        }
    }
}

impl Middleware for EventObserver {
    fn name(&self) -> &str {
        &self.name
    }

    fn wrap(&self, inner: BoxEventStream, _scope: &EventScope) -> BoxEventStream {
        Box::new(Observed {
            inner,
            observe: Arc::clone(&self.observe),
        })
    }
}

struct Observed {
    inner: BoxEventStream,
    observe: Arc<dyn Fn(&ExecutionEvent) + Send + Sync>,
}

#[async_trait]
impl EventStream for Observed {
    async fn resume(
        &mut self,
        input: Option<ExternalToolResults>,
    ) -> Result<CoroutineState<ExecutionEvent, RunOutput>> {
        let state = self.inner.resume(input).await?;
        if let CoroutineState::Yielded(event) = &state {
            (self.observe)(event);
        }
        Ok(state)
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logs every event at debug level and the run's outcome at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    fn wrap(&self, inner: BoxEventStream, scope: &EventScope) -> BoxEventStream {
        Box::new(Logged {
            inner,
            scope: scope.clone(),
            events: 0,
        })
    }
}

struct Logged {
    inner: BoxEventStream,
    scope: EventScope,
    events: u64,
}

#[async_trait]
impl EventStream for Logged {
    async fn resume(
        &mut self,
        input: Option<ExternalToolResults>,
    ) -> Result<CoroutineState<ExecutionEvent, RunOutput>> {
        let injected = input.as_ref().map(Vec::len);
        let state = match self.inner.resume(input).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(run_id = %self.scope.run_id, agent = %self.scope.agent_name, error = %e, "run failed");
                return Err(e);
            }
        };

        match &state {
            CoroutineState::Yielded(event) => {
                self.events += 1;
                tracing::debug!(
                    run_id = %self.scope.run_id,
                    event = event.name(),
                    from = %event.agent_name,
                    depth = event.depth(),
                    injected = ?injected,
                    "event"
                );
            }
            CoroutineState::Complete(output) => {
                tracing::info!(
                    run_id = %self.scope.run_id,
                    agent = %self.scope.agent_name,
                    events = self.events,
                    messages = output.messages.len(),
                    total_tokens = output.token_usage.total_tokens(),
                    "run complete"
                );
            }
        }
        Ok(state)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
