//! Consumer Integration Tests
//!
//! Drives `PipelineConsumer` against the scripted transport:
//! - Full runs, reconnects, and retry exhaustion
//! - Fatal client errors
//! - Cancellation, superseded runs, and teardown on drop
//! - Slice selectors

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use plan_pipeline::PipelineConsumer;
use plan_pipeline_core::{Envelope, GenerationRequest, RunState, StageId, CANCELLED_MESSAGE};
use plan_pipeline_transport::mock::{ScriptedConnection, ScriptedItem, ScriptedTransport};
use plan_pipeline_transport::{RetryPolicy, TransportError};

// ============================================================================
// Helpers
// ============================================================================

fn wire(run_id: &str, seq: u64, event_type: &str, stage: Option<&str>, payload: Value) -> Envelope {
    let raw = json!({
        "run_id": run_id,
        "seq": seq,
        "ts": format!("2026-03-01T09:00:{:02}Z", seq % 60),
        "type": event_type,
        "stage": stage,
        "payload": payload,
    });
    Envelope::from_json(&raw.to_string()).unwrap()
}

fn complete_run(run_id: &str) -> Vec<Envelope> {
    vec![
        wire(run_id, 0, "run.started", None, json!({})),
        wire(run_id, 1, "stage.started", Some("planning"), json!({})),
        wire(run_id, 2, "stage.progress", Some("planning"), json!({"progress": 50})),
        wire(run_id, 3, "stage.completed", Some("planning"), json!({})),
        wire(run_id, 4, "stage.started", Some("validation"), json!({})),
        wire(run_id, 5, "quality.scored", Some("validation"), json!({"score": 88})),
        wire(run_id, 6, "stage.completed", Some("validation"), json!({})),
        wire(run_id, 7, "heartbeat", None, Value::Null),
        wire(run_id, 8, "run.completed", None, json!({"plan": {"title": "Volcanoes"}})),
    ]
}

fn request() -> GenerationRequest {
    GenerationRequest::new("Volcanoes", "6", "earth science")
        .with_accessibility_profile("dyslexia")
        .with_locale("en")
}

fn network_error() -> ScriptedConnection {
    ScriptedConnection::fail(TransportError::Network("connection refused".to_string()))
}

fn consumer(transport: &Arc<ScriptedTransport>, max_retries: u32) -> PipelineConsumer {
    PipelineConsumer::new(transport.clone(), RetryPolicy::immediate(max_retries))
}

async fn finish(consumer: &PipelineConsumer) -> RunState {
    tokio::time::timeout(Duration::from_secs(5), consumer.wait_until_idle())
        .await
        .expect("run did not finish")
}

async fn settle(consumer: &PipelineConsumer, predicate: impl Fn(&RunState) -> bool) {
    let mut rx = consumer.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|state| predicate(state)))
        .await
        .expect("state did not settle")
        .unwrap();
}

async fn wait_for_opens(transport: &ScriptedTransport, opens: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while transport.open_count() < opens {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("transport was not opened");
}

// ============================================================================
// Runs and retries
// ============================================================================

#[tokio::test]
async fn test_run_streams_to_completion() {
    let transport = Arc::new(ScriptedTransport::new(vec![ScriptedConnection::envelopes(
        complete_run("run-1"),
    )]));
    let consumer = consumer(&transport, 3);

    consumer.start(request()).unwrap();
    let state = finish(&consumer).await;

    assert!(!state.is_running);
    assert!(state.error.is_none());
    assert_eq!(state.run_id.as_deref(), Some("run-1"));
    assert_eq!(state.current_stage, Some(StageId::Done));
    assert_eq!(state.score, Some(88.0));
    assert_eq!(state.plan, Some(json!({"title": "Volcanoes"})));
    // Heartbeat is not part of the audit log.
    assert_eq!(state.events.len(), 8);
    assert_eq!(transport.open_count(), 1);

    let sent = transport.requests();
    assert_eq!(sent[0].accessibility_profile.as_deref(), Some("dyslexia"));
    assert_eq!(sent[0].grade, "6");
}

#[tokio::test]
async fn test_four_failures_abort_after_three_reconnects() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        network_error(),
        ScriptedConnection::fail(TransportError::Http {
            status: 503,
            body: "overloaded".to_string(),
        }),
        network_error(),
        network_error(),
        ScriptedConnection::envelopes(complete_run("never")),
    ]));
    let consumer = consumer(&transport, 3);

    consumer.start(request()).unwrap();
    let state = finish(&consumer).await;

    assert!(!state.is_running);
    assert_eq!(
        state.error.as_deref(),
        Some("Network error: connection refused")
    );
    // One initial open plus three reconnects.
    assert_eq!(transport.open_count(), 4);
    assert!(state.events.is_empty());
}

#[tokio::test]
async fn test_client_rejection_is_fatal() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        ScriptedConnection::fail(TransportError::Http {
            status: 422,
            body: "grade must be between K and 12".to_string(),
        }),
        ScriptedConnection::envelopes(complete_run("never")),
    ]));
    let consumer = consumer(&transport, 3);

    consumer.start(request()).unwrap();
    let state = finish(&consumer).await;

    assert_eq!(
        state.error.as_deref(),
        Some("HTTP error 422: grade must be between K and 12")
    );
    assert!(!state.is_running);
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test]
async fn test_dropped_stream_reconnects_and_keeps_state() {
    let full = complete_run("run-1");
    let transport = Arc::new(ScriptedTransport::new(vec![
        ScriptedConnection::envelopes(full[..3].to_vec()),
        ScriptedConnection::stream(vec![
            ScriptedItem::Envelope(full[3].clone()),
            ScriptedItem::Error(TransportError::Network("reset by peer".to_string())),
        ]),
        ScriptedConnection::envelopes(full[4..].to_vec()),
    ]));
    let consumer = consumer(&transport, 3);

    consumer.start(request()).unwrap();
    let state = finish(&consumer).await;

    assert!(state.error.is_none());
    assert!(state.is_complete());
    assert_eq!(transport.open_count(), 3);
    assert_eq!(state.stage(StageId::Planning).progress, 100);
    assert_eq!(state.events.len(), 8);
}

#[tokio::test]
async fn test_successful_open_resets_retry_count() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        network_error(),
        network_error(),
        network_error(),
        // Opens, then ends without a terminal event.
        ScriptedConnection::envelopes(vec![wire("run-1", 0, "run.started", None, json!({}))]),
        network_error(),
        network_error(),
        ScriptedConnection::envelopes(complete_run("run-1")[1..].to_vec()),
    ]));
    let consumer = consumer(&transport, 3);

    consumer.start(request()).unwrap();
    let state = finish(&consumer).await;

    assert!(state.error.is_none(), "unexpected error: {:?}", state.error);
    assert_eq!(state.current_stage, Some(StageId::Done));
    assert_eq!(transport.open_count(), 7);
}

#[tokio::test]
async fn test_run_failed_event_ends_without_retry() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        ScriptedConnection::envelopes(vec![
            wire("run-1", 0, "run.started", None, json!({})),
            wire("run-1", 1, "stage.started", Some("planning"), json!({})),
            wire("run-1", 2, "run.failed", None, json!({"message": "planner crashed"})),
        ])
        .hold_open(),
    ]));
    let consumer = consumer(&transport, 3);

    consumer.start(request()).unwrap();
    let state = finish(&consumer).await;

    assert_eq!(state.error.as_deref(), Some("planner crashed"));
    assert_eq!(state.current_stage, Some(StageId::Planning));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.open_count(), 1);
}

// ============================================================================
// Cancellation and generations
// ============================================================================

#[tokio::test]
async fn test_cancel_keeps_partial_state() {
    let transport = Arc::new(ScriptedTransport::new(vec![ScriptedConnection::envelopes(
        complete_run("run-1")[..3].to_vec(),
    )
    .hold_open()]));
    let consumer = consumer(&transport, 3);

    consumer.start(request()).unwrap();
    settle(&consumer, |state| state.events.len() == 3).await;
    consumer.cancel();

    let state = consumer.snapshot();
    assert!(!state.is_running);
    assert!(state.is_cancelled());
    assert_eq!(state.error.as_deref(), Some(CANCELLED_MESSAGE));
    assert_eq!(state.stage(StageId::Planning).progress, 50);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(consumer.snapshot(), state);
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test]
async fn test_cancel_during_reconnect_delay() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        network_error(),
        ScriptedConnection::envelopes(complete_run("never")),
    ]));
    let consumer = PipelineConsumer::new(
        transport.clone(),
        RetryPolicy::new(3, Duration::from_secs(30)),
    );

    consumer.start(request()).unwrap();
    wait_for_opens(&transport, 1).await;
    consumer.cancel();

    let state = finish(&consumer).await;
    assert!(state.is_cancelled());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test]
async fn test_cancel_while_connecting() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        ScriptedConnection::envelopes(complete_run("slow"))
            .with_open_delay(Duration::from_secs(30)),
        ScriptedConnection::envelopes(complete_run("never")),
    ]));
    let consumer = consumer(&transport, 3);

    consumer.start(request()).unwrap();
    wait_for_opens(&transport, 1).await;
    assert!(consumer.is_running());
    consumer.cancel();

    let state = finish(&consumer).await;
    assert!(state.is_cancelled());
    assert!(state.run_id.is_none());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test]
async fn test_restart_discards_superseded_run() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        // Keeps delivering after cancellation.
        ScriptedConnection::stream(vec![
            ScriptedItem::Envelope(wire("run-old", 0, "run.started", None, json!({}))),
            ScriptedItem::Delay(Duration::from_millis(30)),
            ScriptedItem::Envelope(wire(
                "run-old",
                1,
                "stage.started",
                Some("execution"),
                json!({}),
            )),
            ScriptedItem::Error(TransportError::Network("late failure".to_string())),
        ])
        .ignore_cancel(),
        ScriptedConnection::stream(vec![
            ScriptedItem::Delay(Duration::from_millis(80)),
            ScriptedItem::Envelope(wire("run-new", 0, "run.started", None, json!({}))),
            ScriptedItem::Envelope(wire("run-new", 1, "run.completed", None, json!({}))),
        ]),
    ]));
    let consumer = consumer(&transport, 3);

    let first = consumer.start(request()).unwrap();
    settle(&consumer, |state| state.run_id.as_deref() == Some("run-old")).await;

    let second = consumer.start(request()).unwrap();
    assert!(second > first);
    let fresh = consumer.snapshot();
    assert!(fresh.events.is_empty());
    assert!(fresh.run_id.is_none());
    assert!(fresh.is_running);

    let state = finish(&consumer).await;
    assert!(state.error.is_none());
    assert_eq!(state.run_id.as_deref(), Some("run-new"));
    assert!(state.events.iter().all(|e| e.run_id == "run-new"));
    assert!(state.stage(StageId::Execution).started_at.is_none());
    assert_eq!(transport.open_count(), 2);
}

#[tokio::test]
async fn test_set_error_stops_run() {
    let transport = Arc::new(ScriptedTransport::new(vec![ScriptedConnection::envelopes(
        vec![wire("run-1", 0, "run.started", None, json!({}))],
    )
    .hold_open()]));
    let consumer = consumer(&transport, 3);

    consumer.start(request()).unwrap();
    settle(&consumer, |state| state.run_id.is_some()).await;
    consumer.set_error("Connection lost");

    let state = consumer.snapshot();
    assert_eq!(state.error.as_deref(), Some("Connection lost"));
    assert!(!state.is_running);
    assert!(!consumer.is_running());
}

#[tokio::test]
async fn test_drop_tears_down_reader() {
    let transport = Arc::new(ScriptedTransport::new(vec![ScriptedConnection::envelopes(
        vec![wire("run-1", 0, "run.started", None, json!({}))],
    )
    .hold_open()]));
    let consumer = consumer(&transport, 3);

    consumer.start(request()).unwrap();
    settle(&consumer, |state| state.run_id.is_some()).await;
    assert!(Arc::strong_count(&transport) > 1);

    drop(consumer);
    tokio::time::timeout(Duration::from_secs(5), async {
        while Arc::strong_count(&transport) > 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("reader kept the transport alive");
}

// ============================================================================
// Selectors
// ============================================================================

#[tokio::test]
async fn test_stage_selector_reports_only_changes() {
    let mut envelopes = vec![wire("run-1", 0, "run.started", None, json!({}))];
    envelopes.push(wire("run-1", 1, "stage.started", Some("execution"), json!({})));
    for step in 0..20u64 {
        envelopes.push(wire(
            "run-1",
            2 + step,
            "stage.progress",
            Some("execution"),
            json!({"progress": step * 5}),
        ));
    }
    envelopes.push(wire("run-1", 30, "run.completed", None, json!({})));

    let transport = Arc::new(ScriptedTransport::new(vec![ScriptedConnection::envelopes(
        envelopes,
    )]));
    let consumer = consumer(&transport, 3);
    let mut stage = consumer.select(|state| state.current_stage);
    assert_eq!(stage.get(), None);

    consumer.start(request()).unwrap();
    let mut seen = Vec::new();
    while let Ok(Some(current)) =
        tokio::time::timeout(Duration::from_millis(200), stage.changed()).await
    {
        seen.push(current);
        if current == Some(StageId::Done) {
            break;
        }
    }

    assert_eq!(seen.last(), Some(&Some(StageId::Done)));
    assert!(seen.windows(2).all(|pair| pair[0] != pair[1]));
    assert!(seen.len() <= 2);
}
