//! Shared fixtures for integration tests: a scripted provider and a few
//! simple tools.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use serde_json::{Value, json};

use stepwise_agent::{
    AgentError, ContentBlock, ContentDelta, Provider, ProviderChunk, ProviderRequest, ProviderResponse,
    ProviderStream, Result, StopReason, Tool, ToolContext, ToolOutput, ToolUseBlock, UsageRecord,
};

// ═══════════════════════════════════════════════════════════════════════
//  Scripted provider
// ═══════════════════════════════════════════════════════════════════════

/// Sets a flag when dropped.
pub struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// A guard and the flag it sets on drop.
pub fn drop_flag() -> (DropFlag, Arc<AtomicBool>) {
    let flag = Arc::new(AtomicBool::new(false));
    (DropFlag(Arc::clone(&flag)), flag)
}

/// One scripted model call.
pub struct Turn {
    pub deltas: Vec<ContentDelta>,
    pub response: ProviderResponse,
    pub guard: Option<DropFlag>,
}

impl Turn {
    pub fn new(response: ProviderResponse) -> Self {
        Self {
            deltas: Vec::new(),
            response,
            guard: None,
        }
    }

    pub fn with_deltas(mut self, deltas: &[&str]) -> Self {
        self.deltas = deltas.iter().map(|d| ContentDelta::Text((*d).to_owned())).collect();
        self
    }

    /// Tie `guard` to the lifetime of the returned provider stream.
    pub fn with_guard(mut self, guard: DropFlag) -> Self {
        self.guard = Some(guard);
        self
    }
}

impl From<ProviderResponse> for Turn {
    fn from(response: ProviderResponse) -> Self {
        Self::new(response)
    }
}

/// Replays canned responses in order and records every request.
pub struct ScriptedProvider {
    name: String,
    script: Mutex<VecDeque<Turn>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(name: &str, turns: Vec<Turn>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            script: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Responses only, no deltas.
    pub fn replying(name: &str, responses: Vec<ProviderResponse>) -> Arc<Self> {
        Self::new(name, responses.into_iter().map(Turn::from).collect())
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&self, request: ProviderRequest) -> ProviderStream<'_> {
        self.requests.lock().unwrap().push(request);
        let Some(turn) = self.script.lock().unwrap().pop_front() else {
            return stream::once(async {
                Err(AgentError::Provider {
                    reason: "script exhausted".into(),
                })
            })
            .boxed();
        };

        let mut chunks: Vec<Result<ProviderChunk>> =
            turn.deltas.into_iter().map(|d| Ok(ProviderChunk::Delta(d))).collect();
        chunks.push(Ok(ProviderChunk::Completed(turn.response)));

        let guard = turn.guard;
        stream::iter(chunks)
            .map(move |chunk| {
                let _alive = &guard;
                chunk
            })
            .boxed()
    }
}

/// A final text answer.
pub fn text_response(text: &str, model: &str, input: u64, output: u64) -> ProviderResponse {
    ProviderResponse {
        content: vec![ContentBlock::text(text)],
        tokens: vec![UsageRecord::new(model, input, output)],
        stop_reason: StopReason::EndTurn,
    }
}

/// A response requesting `tool_uses`.
pub fn tool_use_response(tool_uses: Vec<ToolUseBlock>, model: &str, input: u64, output: u64) -> ProviderResponse {
    ProviderResponse {
        content: tool_uses.into_iter().map(ContentBlock::ToolUse).collect(),
        tokens: vec![UsageRecord::new(model, input, output)],
        stop_reason: StopReason::ToolUse,
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tools
// ═══════════════════════════════════════════════════════════════════════

/// Adds `a` and `b`.
pub struct Calculator;

#[async_trait]
impl Tool for Calculator {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Adds two integers"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "a": { "type": "integer" }, "b": { "type": "integer" } },
            "required": ["a", "b"]
        })
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolOutput> {
        let a = input["a"].as_i64().unwrap_or_default();
        let b = input["b"].as_i64().unwrap_or_default();
        Ok(ToolOutput::success(json!(a + b)))
    }
}

/// Always fails.
pub struct Failing;

#[async_trait]
impl Tool for Failing {
    fn name(&self) -> &str {
        "flaky"
    }

    fn description(&self) -> &str {
        "Never works"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn execute(&self, _input: Value, _context: &ToolContext) -> Result<ToolOutput> {
        Err(AgentError::ToolExecutionFailed {
            tool_name: "flaky".into(),
            reason: "boom".into(),
        })
    }
}

/// Completes normally but reports a failed outcome.
pub struct Rejecting;

#[async_trait]
impl Tool for Rejecting {
    fn name(&self) -> &str {
        "quota"
    }

    fn description(&self) -> &str {
        "Always over quota"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn execute(&self, _input: Value, _context: &ToolContext) -> Result<ToolOutput> {
        Ok(ToolOutput::error("quota exceeded"))
    }
}

/// Counts invocations and echoes the caller context.
#[derive(Default)]
pub struct Counter {
    pub calls: AtomicUsize,
}

impl Counter {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for Counter {
    fn name(&self) -> &str {
        "counter"
    }

    fn description(&self) -> &str {
        "Counts calls"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn execute(&self, _input: Value, context: &ToolContext) -> Result<ToolOutput> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ToolOutput::success(json!({ "n": n, "context": context.context }))
            .with_token_usage(vec![UsageRecord::new("counter-model", 1, 1)]))
    }
}

pub fn tool_use(id: &str, name: &str, input: Value) -> ToolUseBlock {
    ToolUseBlock::new(id, name, input)
}
