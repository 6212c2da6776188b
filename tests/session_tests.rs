//! Session-level integration tests against a stubbed agent engine.

use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::mpsc;

use vizbridge::diagnostics::NullDiagnostics;
use vizbridge::engine::{PatchBatch, PatchOp};
use vizbridge::relay::ConnectionSession;
use vizbridge::ws::ClientMessage;

mod common;
use common::StubEngine;

/// Run one chat turn and collect every outbound event as JSON.
async fn collect_turn(engine: StubEngine, message: &str) -> Vec<Value> {
    let (tx, mut rx) = mpsc::channel(64);
    let mut session = ConnectionSession::new(Arc::new(engine), Arc::new(NullDiagnostics), tx);
    session
        .handle(ClientMessage::Chat {
            message: message.to_string(),
        })
        .await
        .expect("turn should succeed");
    drop(session);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(serde_json::to_value(&event).unwrap());
    }
    events
}

fn streamed_add(value: Value) -> PatchOp {
    PatchOp::add("/logs/ChatModel/streamed_output_str/-", value)
}

#[tokio::test]
async fn test_plain_text_turn_emits_running_then_finished() {
    let engine = StubEngine::with_batches(vec![PatchBatch::new(vec![streamed_add(json!(
        "Sales are highest in the West."
    ))])]);

    let events = collect_turn(engine, "Show me sales by region").await;

    assert_eq!(
        events,
        vec![
            json!({"type": "ai_message", "data": "Sales are highest in the West.", "state": "running"}),
            json!({"type": "ai_message", "data": "", "state": "finished"}),
        ]
    );
}

#[tokio::test]
async fn test_empty_patch_stream_still_ends_the_turn() {
    let events = collect_turn(StubEngine::default(), "hello").await;
    assert_eq!(
        events,
        vec![json!({"type": "ai_message", "data": "", "state": "finished"})]
    );
}

#[tokio::test]
async fn test_assistant_graph_payload_replaces_prose() {
    let fenced = "```json\n{\"type\":\"plotly\",\"data\":[],\"layout\":{}}\n```";
    let engine = StubEngine::with_batches(vec![PatchBatch::new(vec![streamed_add(json!([
        {"text": fenced}
    ]))])]);

    let events = collect_turn(engine, "chart it").await;

    assert_eq!(events[0]["type"], "graph_message");
    assert_eq!(events[0]["state"], "running");
    assert_eq!(
        events[0]["data"],
        json!({"type": "plotly", "data": [], "layout": {}})
    );
    // Assistant-sourced graphs carry no tool identity.
    assert!(events[0].get("tool_call_id").is_none());
}

#[tokio::test]
async fn test_streaming_sequence_events() {
    let ops = vec![
        streamed_add(json!([{"id": "toolu_01", "name": "query_datasource", "input": {}}])),
        streamed_add(json!([{"partial_json": "{\"query\":"}])),
        streamed_add(json!([{"partial_json": " \"sales\""}])),
        streamed_add(json!([{"partial_json": "}"}])),
        streamed_add(json!("")),
    ];
    let engine = StubEngine::with_batches(vec![PatchBatch::new(ops)]);

    let events = collect_turn(engine, "query sales").await;

    // One start, three incremental fragments, nothing for the terminator,
    // then the end-of-turn marker.
    assert_eq!(events.len(), 5);
    assert_eq!(
        events[0],
        json!({
            "type": "tool_message",
            "data": {"tool_call_id": "toolu_01", "name": "query_datasource", "partial_json": ""},
            "state": "streaming",
        })
    );
    for (event, fragment) in events[1..4]
        .iter()
        .zip(["{\"query\":", " \"sales\"", "}"])
    {
        assert_eq!(event["type"], "tool_message");
        assert_eq!(event["state"], "streaming");
        assert_eq!(event["data"]["partial_json"], fragment);
        assert_eq!(event["data"]["tool_call_id"], "toolu_01");
    }
    assert_eq!(events[4]["type"], "ai_message");
    assert_eq!(events[4]["state"], "finished");
}

#[tokio::test]
async fn test_tool_invocation_and_result() {
    let batches = vec![
        PatchBatch::new(vec![PatchOp::add(
            "/logs/agent/final_output",
            json!({"id": "toolu_02", "name": "list_fields"}),
        )]),
        PatchBatch::new(vec![PatchOp::add(
            "/logs/tools/final_output",
            json!({"messages": [{
                "tool_call_id": "toolu_02",
                "name": "list_fields",
                "content": "region, segment, sales",
            }]}),
        )]),
    ];
    let events = collect_turn(StubEngine::with_batches(batches), "what fields?").await;

    assert_eq!(
        events[0],
        json!({
            "type": "tool_message",
            "data": {"tool_call_id": "toolu_02", "name": "list_fields", "args": {}},
            "state": "running",
        })
    );
    assert_eq!(
        events[1],
        json!({
            "type": "tool_message",
            "data": {"tool_call_id": "toolu_02", "name": "list_fields", "output": "region, segment, sales"},
            "state": "finished",
        })
    );
    assert_eq!(events[2]["state"], "finished");
}

#[tokio::test]
async fn test_tool_result_graph_payload_carries_tool_identity() {
    let payload = "{\"type\": \"tableau\", \"view_url\": \"https://tableau.example/views/Sales\"}";
    let batches = vec![PatchBatch::new(vec![PatchOp::add(
        "/logs/tools/final_output",
        json!({"messages": [{
            "tool_call_id": "toolu_03",
            "name": "render_viz",
            "content": payload,
        }]}),
    )])];
    let events = collect_turn(StubEngine::with_batches(batches), "render").await;

    assert_eq!(events[0]["type"], "graph_message");
    assert_eq!(events[0]["state"], "finished");
    assert_eq!(events[0]["tool_call_id"], "toolu_03");
    assert_eq!(events[0]["name"], "render_viz");
    assert_eq!(events[0]["data"]["type"], "tableau");
}

#[tokio::test]
async fn test_tool_error_is_reported_once() {
    let error_value = json!({"id": "toolu_04", "name": "query", "error": "timeout"});
    let batches = vec![
        PatchBatch::new(vec![PatchOp::add("/logs/tools/final_output", error_value.clone())]),
        PatchBatch::new(vec![PatchOp::add("/logs/tools/final_output", error_value)]),
    ];
    let events = collect_turn(StubEngine::with_batches(batches), "query").await;

    let errors: Vec<_> = events
        .iter()
        .filter(|event| event["state"] == "error")
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["data"]["output"], "timeout");
}

#[tokio::test]
async fn test_non_add_ops_are_ignored() {
    let batch: PatchBatch = serde_json::from_value(json!({"ops": [
        {"op": "replace", "path": "/logs/ChatModel/streamed_output_str/-", "value": "ignored"},
        {"op": "remove", "path": "/logs"},
    ]}))
    .unwrap();
    let events = collect_turn(StubEngine::with_batches(vec![batch]), "hi").await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["state"], "finished");
}

#[tokio::test]
async fn test_resync_with_unknown_session_id_is_silent() {
    let (tx, mut rx) = mpsc::channel(16);
    let mut session =
        ConnectionSession::new(Arc::new(StubEngine::default()), Arc::new(NullDiagnostics), tx);

    session
        .handle(ClientMessage::Resync {
            session_id: Some("missing".to_string()),
        })
        .await
        .expect("unknown session id must not raise");
    assert_eq!(session.conversation_id(), "missing");

    drop(session);
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_resync_with_known_session_emits_history() {
    let mut engine = StubEngine::default();
    engine.history.insert(
        "conv-7".to_string(),
        vec![
            json!({"role": "user", "content": "hi"}),
            json!({"role": "assistant", "content": "hello"}),
        ],
    );

    let (tx, mut rx) = mpsc::channel(16);
    let mut session = ConnectionSession::new(Arc::new(engine), Arc::new(NullDiagnostics), tx);

    session
        .handle(ClientMessage::Resync {
            session_id: Some("conv-7".to_string()),
        })
        .await
        .unwrap();
    drop(session);

    let event = serde_json::to_value(rx.recv().await.unwrap()).unwrap();
    assert_eq!(event["type"], "history");
    assert_eq!(event["history"].as_array().unwrap().len(), 2);
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_resync_without_session_id_is_a_noop() {
    let (tx, mut rx) = mpsc::channel(16);
    let mut session =
        ConnectionSession::new(Arc::new(StubEngine::default()), Arc::new(NullDiagnostics), tx);
    let original = session.conversation_id().to_string();

    session
        .handle(ClientMessage::Resync { session_id: None })
        .await
        .unwrap();
    assert_eq!(session.conversation_id(), original);

    drop(session);
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_stream_error_aborts_the_turn() {
    let engine = StubEngine {
        stream_error: Some("engine exploded".to_string()),
        ..Default::default()
    };

    let (tx, mut rx) = mpsc::channel(16);
    let mut session = ConnectionSession::new(Arc::new(engine), Arc::new(NullDiagnostics), tx);

    let result = session
        .handle(ClientMessage::Chat {
            message: "hi".to_string(),
        })
        .await;
    assert!(result.is_err());
    drop(session);

    // No end-of-turn marker after a failed turn.
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_client_disconnect_aborts_the_turn() {
    let engine = StubEngine::with_batches(vec![PatchBatch::new(vec![streamed_add(json!(
        "some text"
    ))])]);

    let (tx, rx) = mpsc::channel(16);
    drop(rx);
    let mut session = ConnectionSession::new(Arc::new(engine), Arc::new(NullDiagnostics), tx);

    let result = session
        .handle(ClientMessage::Chat {
            message: "hi".to_string(),
        })
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_tool_ids_are_not_reannounced_across_turns() {
    let batches = vec![PatchBatch::new(vec![PatchOp::add(
        "/logs/agent/final_output",
        json!({"id": "toolu_05", "name": "query"}),
    )])];
    let engine = StubEngine::with_batches(batches);

    let (tx, mut rx) = mpsc::channel(64);
    let mut session = ConnectionSession::new(Arc::new(engine), Arc::new(NullDiagnostics), tx);

    for _ in 0..2 {
        session
            .handle(ClientMessage::Chat {
                message: "again".to_string(),
            })
            .await
            .unwrap();
    }
    drop(session);

    let mut tool_messages = 0;
    let mut turn_markers = 0;
    while let Some(event) = rx.recv().await {
        let event = serde_json::to_value(&event).unwrap();
        if event["type"] == "tool_message" {
            tool_messages += 1;
        }
        if event["type"] == "ai_message" && event["state"] == "finished" {
            turn_markers += 1;
        }
    }
    // The tracker persists for the connection: one announcement total.
    assert_eq!(tool_messages, 1);
    // Both turns still ended.
    assert_eq!(turn_markers, 2);
}
