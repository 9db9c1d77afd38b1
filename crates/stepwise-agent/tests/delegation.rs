//! Integration tests for nested agent delegation and cancellation.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use serde_json::json;

use common::{Calculator, ScriptedProvider, Turn, drop_flag, text_response, tool_use, tool_use_response};
use stepwise_agent::{
    Agent, AgentError, CoroutineState, EventKind, ExternalToolResult, Message, RunOptions, ToolOutput, collect,
};

fn researcher(provider: Arc<ScriptedProvider>) -> Arc<Agent> {
    Agent::builder("researcher")
        .description("Looks things up")
        .provider(provider)
        .tool(Arc::new(Calculator))
        .build()
        .unwrap()
}

// ═══════════════════════════════════════════════════════════════════════
//  Delegation
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn nested_run_is_forwarded_and_accounted() {
    let child_provider = ScriptedProvider::replying("child", vec![text_response("found it", "child-model", 7, 3)]);
    let parent_provider = ScriptedProvider::replying(
        "parent",
        vec![
            tool_use_response(vec![tool_use("d1", "researcher", json!({"prompt": "find x"}))], "parent-model", 10, 5),
            text_response("x is found", "parent-model", 20, 6),
        ],
    );
    let agent = Agent::builder("lead")
        .provider(parent_provider.clone())
        .agent(researcher(child_provider.clone()))
        .build()
        .unwrap();

    let (events, output) = collect(agent.iterate(vec![Message::user("where is x?")], RunOptions::default()))
        .await
        .unwrap();

    let trace: Vec<_> = events.iter().map(|e| (e.name(), e.agent_name.as_str())).collect();
    assert_eq!(
        trace,
        vec![
            ("start", "lead"),
            ("tool-call-params", "lead"),
            ("start", "researcher"),
            ("stop", "researcher"),
            ("tool-result", "lead"),
            ("stop", "lead"),
        ]
    );
    assert!(matches!(events[1].kind, EventKind::ToolCallParams { has_agent_calls: true, .. }));
    assert_eq!(events[2].execution_path, vec!["lead", "researcher"]);
    assert_eq!(events[2].depth(), 1);

    let lead_scope = events[0].scope.as_ref().unwrap();
    let child_scope = events[2].scope.as_ref().unwrap();
    assert_eq!(child_scope.parent_run_id, Some(lead_scope.run_id));
    assert_eq!(child_scope.execution_path, vec!["lead", "researcher"]);

    // The child was seeded from the prompt and advertised as a tool.
    assert_eq!(child_provider.requests()[0].messages, vec![Message::user("find x")]);
    let advertised = &parent_provider.requests()[0].tools;
    assert_eq!(advertised[0].name, "researcher");
    assert_eq!(advertised[0].description, "Looks things up");

    let result = output.messages[2].tool_result_blocks().next().unwrap();
    assert_eq!(result.tool_use_id, "d1");
    assert_eq!(result.text(), "found it");

    let usage = &output.token_usage;
    assert_eq!(usage.completion().len(), 2);
    let child = usage.child("researcher").unwrap().details.as_ref().unwrap();
    assert_eq!(child.total().input, 7);
    assert_eq!(child.total().output, 3);
    assert_eq!(usage.total().input, 37);
    assert_eq!(usage.total().output, 14);
    assert_eq!(usage.total(), usage.computed_total());
}

#[tokio::test]
async fn nested_tool_calls_stream_through_the_parent() {
    let child_provider = ScriptedProvider::replying(
        "child",
        vec![
            tool_use_response(vec![tool_use("c1", "calculator", json!({"a": 3, "b": 4}))], "child-model", 1, 1),
            text_response("7", "child-model", 1, 1),
        ],
    );
    let parent_provider = ScriptedProvider::replying(
        "parent",
        vec![
            tool_use_response(vec![tool_use("d1", "researcher", json!("add 3 and 4"))], "parent-model", 1, 1),
            text_response("it is 7", "parent-model", 1, 1),
        ],
    );
    let agent = Agent::builder("lead")
        .provider(parent_provider)
        .agent(researcher(child_provider))
        .build()
        .unwrap();

    let (events, output) = collect(agent.iterate(vec![Message::user("3+4?")], RunOptions::default()))
        .await
        .unwrap();

    let nested: Vec<_> = events.iter().filter(|e| e.depth() == 1).map(|e| e.name()).collect();
    assert_eq!(nested, vec!["start", "tool-call-params", "tool-result", "stop"]);
    assert_eq!(output.text(), "it is 7");
    assert_eq!(output.messages[2].tool_result_blocks().next().unwrap().text(), "7");
}

#[tokio::test]
async fn leaf_tools_and_nested_agents_share_one_message() {
    let child_provider = ScriptedProvider::replying("child", vec![text_response("found", "child-model", 1, 1)]);
    let parent_provider = ScriptedProvider::replying(
        "parent",
        vec![
            tool_use_response(
                vec![
                    tool_use("t1", "calculator", json!({"a": 1, "b": 2})),
                    tool_use("d1", "researcher", json!({"prompt": "look"})),
                    tool_use("t3", "calculator", json!({"a": 4, "b": 4})),
                ],
                "parent-model",
                1,
                1,
            ),
            text_response("all done", "parent-model", 1, 1),
        ],
    );
    let agent = Agent::builder("lead")
        .provider(parent_provider.clone())
        .tool(Arc::new(Calculator))
        .agent(researcher(child_provider.clone()))
        .build()
        .unwrap();

    let (events, output) = collect(agent.iterate(vec![Message::user("mix")], RunOptions::default()))
        .await
        .unwrap();

    let streamed: Vec<_> = events
        .iter()
        .filter(|e| e.depth() == 0)
        .filter_map(|e| match &e.kind {
            EventKind::ToolResult { result } => Some(result.tool_use_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(streamed, vec!["t1", "d1", "t3"]);

    let trace: Vec<_> = events.iter().map(|e| (e.name(), e.depth())).collect();
    assert_eq!(
        trace,
        vec![
            ("start", 0),
            ("tool-call-params", 0),
            ("tool-result", 0),
            ("start", 1),
            ("stop", 1),
            ("tool-result", 0),
            ("tool-result", 0),
            ("stop", 0),
        ]
    );

    let merged: Vec<_> = output.messages[2].tool_result_blocks().collect();
    let ids: Vec<_> = merged.iter().map(|r| r.tool_use_id.as_str()).collect();
    assert_eq!(ids, vec!["t1", "d1", "t3"]);
    assert_eq!(merged[0].text(), "3");
    assert_eq!(merged[1].text(), "found");
    assert_eq!(merged[2].text(), "8");
    assert_eq!(child_provider.calls(), 1);
    assert_eq!(parent_provider.calls(), 2);
}

#[tokio::test]
async fn results_can_be_injected_into_a_nested_run() {
    let child_provider = ScriptedProvider::replying(
        "child",
        vec![
            tool_use_response(vec![tool_use("c1", "calculator", json!({"a": 1, "b": 1}))], "child-model", 1, 1),
            text_response("human says 42", "child-model", 1, 1),
        ],
    );
    let parent_provider = ScriptedProvider::replying(
        "parent",
        vec![
            tool_use_response(vec![tool_use("d1", "researcher", json!({"prompt": "ask"}))], "parent-model", 1, 1),
            text_response("done", "parent-model", 1, 1),
        ],
    );
    let agent = Agent::builder("lead")
        .provider(parent_provider)
        .agent(researcher(child_provider.clone()))
        .build()
        .unwrap();

    let mut stream = agent.iterate(vec![Message::user("go")], RunOptions::default());
    let mut input = None;
    let output = loop {
        match stream.resume(input.take()).await.unwrap() {
            CoroutineState::Yielded(event) => {
                if let EventKind::ToolCallParams { tool_uses, .. } = &event.kind {
                    if event.depth() == 1 {
                        input = Some(vec![ExternalToolResult::new(
                            tool_uses[0].clone(),
                            ToolOutput::success("42"),
                        )]);
                    }
                }
            }
            CoroutineState::Complete(output) => break output,
        }
    };

    let child_second = &child_provider.requests()[1];
    let injected = child_second.messages[2].tool_result_blocks().next().unwrap();
    assert_eq!(injected.text(), "42");
    assert_eq!(output.text(), "done");
}

#[tokio::test]
async fn nested_failure_aborts_the_parent() {
    let child_provider = ScriptedProvider::replying("child", vec![]);
    let parent_provider = ScriptedProvider::replying(
        "parent",
        vec![
            tool_use_response(vec![tool_use("d1", "researcher", json!({"prompt": "x"}))], "parent-model", 1, 1),
            text_response("unreachable", "parent-model", 1, 1),
        ],
    );
    let agent = Agent::builder("lead")
        .provider(parent_provider.clone())
        .agent(researcher(child_provider))
        .build()
        .unwrap();

    let err = agent.execute(vec![Message::user("go")], RunOptions::default()).await.unwrap_err();

    assert!(matches!(err, AgentError::Provider { .. }));
    assert_eq!(parent_provider.calls(), 1);
}

#[tokio::test]
async fn nested_seed_accepts_message_lists() {
    let child_provider = ScriptedProvider::replying("child", vec![text_response("ok", "child-model", 1, 1)]);
    let history = vec![Message::user("first"), Message::assistant("noted"), Message::user("second")];
    let parent_provider = ScriptedProvider::replying(
        "parent",
        vec![
            tool_use_response(
                vec![tool_use("d1", "researcher", json!({ "messages": history }))],
                "parent-model",
                1,
                1,
            ),
            text_response("done", "parent-model", 1, 1),
        ],
    );
    let agent = Agent::builder("lead")
        .provider(parent_provider)
        .agent(researcher(child_provider.clone()))
        .build()
        .unwrap();

    agent.execute(vec![Message::user("go")], RunOptions::default()).await.unwrap();

    assert_eq!(child_provider.requests()[0].messages, history);
}

// ═══════════════════════════════════════════════════════════════════════
//  Cancellation
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn dropping_the_stream_drops_a_suspended_nested_call() {
    let (guard, dropped) = drop_flag();
    let child_provider = ScriptedProvider::new(
        "child",
        vec![
            Turn::new(text_response("partial answer", "child-model", 1, 1))
                .with_deltas(&["partial", " answer"])
                .with_guard(guard),
        ],
    );
    let parent_provider = ScriptedProvider::replying(
        "parent",
        vec![tool_use_response(vec![tool_use("d1", "researcher", json!({"prompt": "x"}))], "parent-model", 1, 1)],
    );
    let agent = Agent::builder("lead")
        .provider(parent_provider.clone())
        .agent(researcher(child_provider))
        .build()
        .unwrap();

    let mut stream = agent.iterate(vec![Message::user("go")], RunOptions::new().with_stream(true));
    loop {
        let CoroutineState::Yielded(event) = stream.resume(None).await.unwrap() else {
            panic!("run completed before the nested delta");
        };
        if matches!(event.kind, EventKind::LlmStreaming { .. }) && event.depth() == 1 {
            break;
        }
    }
    assert!(!dropped.load(Ordering::SeqCst));

    stream.cancel();
    assert!(dropped.load(Ordering::SeqCst));
    assert_eq!(parent_provider.calls(), 1);
}

#[tokio::test]
async fn abandoning_before_the_first_resume_runs_nothing() {
    let provider = ScriptedProvider::replying("p", vec![text_response("hi", "m", 1, 1)]);
    let agent = Agent::builder("lazy").provider(provider.clone()).build().unwrap();

    let stream = agent.iterate(vec![Message::user("hi")], RunOptions::default());
    drop(stream);

    assert_eq!(provider.calls(), 0);
}
