//! Pull-based, resumable event streams.
//!
//! A run is a future that periodically hands a value to its consumer and
//! waits for an answer.  [`Coroutine`] drives such a future one suspension
//! point at a time: [`Coroutine::resume_with`] polls the body until it either
//! yields through its [`Yielder`] or completes.  The hand-off uses a
//! `tokio::sync::mpsc` channel for yielded values and a `oneshot` reply per
//! suspension point for the value sent back in, so nothing is spawned and
//! the body only makes progress while its consumer is resuming it.
//!
//! Dropping a coroutine drops its body, and with it every nested stream,
//! provider stream and tool future it is suspended in.
//!
//! [`EventStream`] is the object-safe view of a run used by the engine and
//! by middleware.

use std::future::{Future, poll_fn};
use std::task::Poll;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};

use crate::agent::RunOutput;
use crate::error::{AgentError, Result};
use crate::event::{ExecutionEvent, ExternalToolResults};

// ---------------------------------------------------------------------------
// Coroutine
// ---------------------------------------------------------------------------

/// Outcome of one resumption.
#[derive(Debug, Clone, PartialEq)]
pub enum CoroutineState<Y, R> {
    /// The body suspended with a value.
    Yielded(Y),
    /// The body finished.
    Complete(R),
}

type Handoff<Y, S> = (Y, oneshot::Sender<Option<S>>);

/// Handle a coroutine body uses to suspend itself.
pub struct Yielder<Y, S> {
    tx: mpsc::UnboundedSender<Handoff<Y, S>>,
}

impl<Y, S> Yielder<Y, S> {
    /// Hand `value` to the consumer and wait for the next resumption.
    ///
    /// Returns whatever the consumer passed to the next
    /// [`Coroutine::resume_with`] call.
    pub async fn yield_(&self, value: Y) -> Option<S> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send((value, reply_tx)).is_err() {
            return None;
        }
        reply_rx.await.ok().flatten()
    }
}

enum Progress<Y, S, R> {
    Yielded(Handoff<Y, S>, Option<Result<R>>),
    Complete(Result<R>),
}

/// A resumable body yielding `Y`, accepting `S` at each suspension point and
/// finishing with `R`.
pub struct Coroutine<Y, S, R> {
    body: Option<BoxFuture<'static, Result<R>>>,
    rx: mpsc::UnboundedReceiver<Handoff<Y, S>>,
    reply: Option<oneshot::Sender<Option<S>>>,
    finished: Option<Result<R>>,
}

impl<Y, S, R> Coroutine<Y, S, R>
where
    Y: Send + 'static,
    S: Send + 'static,
    R: Send + 'static,
{
    /// Create a coroutine.  The body does not start until the first resume.
    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(Yielder<Y, S>) -> Fut,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            body: Some(producer(Yielder { tx }).boxed()),
            rx,
            reply: None,
            finished: None,
        }
    }

    /// Whether the body has completed or failed and its outcome was taken.
    pub fn is_finished(&self) -> bool {
        self.body.is_none() && self.finished.is_none()
    }

    /// Run the body until its next suspension point or completion.
    ///
    /// `input` answers the previous suspension point; it is ignored on the
    /// first call.  Resuming a finished coroutine returns
    /// [`AgentError::RunFinished`].
    pub async fn resume_with(&mut self, input: Option<S>) -> Result<CoroutineState<Y, R>> {
        if let Some(reply) = self.reply.take() {
            // The body may already have stopped listening.
            let _ = reply.send(input);
        }
        if let Some(done) = self.finished.take() {
            return done.map(CoroutineState::Complete);
        }

        let Some(body) = self.body.as_mut() else {
            return Err(AgentError::RunFinished);
        };
        let rx = &mut self.rx;

        let progress = poll_fn(|cx| {
            let polled = body.as_mut().poll(cx);
            match rx.try_recv() {
                Ok(handoff) => {
                    let done = match polled {
                        Poll::Ready(result) => Some(result),
                        Poll::Pending => None,
                    };
                    Poll::Ready(Progress::Yielded(handoff, done))
                }
                Err(_) => polled.map(Progress::Complete),
            }
        })
        .await;

        match progress {
            Progress::Yielded((value, reply), done) => {
                self.reply = Some(reply);
                if let Some(done) = done {
                    self.body = None;
                    self.finished = Some(done);
                }
                Ok(CoroutineState::Yielded(value))
            }
            Progress::Complete(result) => {
                self.body = None;
                result.map(CoroutineState::Complete)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Event streams
// ---------------------------------------------------------------------------

/// Object-safe view of a run: a resumable stream of [`ExecutionEvent`]s
/// finishing with a [`RunOutput`].
#[async_trait]
pub trait EventStream: Send {
    /// Advance to the next event or to completion.
    ///
    /// `input` answers the previously yielded event.  Only `tool-call-params`
    /// events read it; it is ignored everywhere else.
    async fn resume(
        &mut self,
        input: Option<ExternalToolResults>,
    ) -> Result<CoroutineState<ExecutionEvent, RunOutput>>;

    /// Abandon the run.  Everything the run is suspended in is dropped.
    fn cancel(self: Box<Self>) {
        tracing::debug!("event stream cancelled");
    }
}

/// A boxed [`EventStream`].
pub type BoxEventStream = Box<dyn EventStream>;

/// Sink steps use to yield events.
pub type EventSink = Yielder<ExecutionEvent, ExternalToolResults>;

/// Coroutine type backing a run.
pub type RunCoroutine = Coroutine<ExecutionEvent, ExternalToolResults, RunOutput>;

#[async_trait]
impl EventStream for RunCoroutine {
    async fn resume(
        &mut self,
        input: Option<ExternalToolResults>,
    ) -> Result<CoroutineState<ExecutionEvent, RunOutput>> {
        self.resume_with(input).await
    }
}

/// Drive a stream to completion without answering any event.
pub async fn drain(mut stream: BoxEventStream) -> Result<RunOutput> {
    loop {
        if let CoroutineState::Complete(output) = stream.resume(None).await? {
            return Ok(output);
        }
    }
}

/// Drive a stream to completion, collecting every event.
pub async fn collect(mut stream: BoxEventStream) -> Result<(Vec<ExecutionEvent>, RunOutput)> {
    let mut events = Vec::new();
    loop {
        match stream.resume(None).await? {
            CoroutineState::Yielded(event) => events.push(event),
            CoroutineState::Complete(output) => return Ok((events, output)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
