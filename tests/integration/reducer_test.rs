//! Reducer Scenario Tests
//!
//! Envelopes are decoded from their wire JSON, then folded through the
//! reducer, so these cover decoding and reduction together.

use serde_json::{json, Value};

use plan_pipeline_core::{
    reduce, reduce_all, Envelope, QualityDecision, RunState, StageId, StageStatus,
};

// ============================================================================
// Helpers
// ============================================================================

fn wire(seq: u64, event_type: &str, stage: Option<&str>, payload: Value) -> Envelope {
    let raw = json!({
        "run_id": "run-1",
        "seq": seq,
        "ts": 1_767_225_600_000_i64 + seq as i64 * 1000,
        "type": event_type,
        "stage": stage,
        "payload": payload,
    });
    Envelope::from_json(&raw.to_string()).unwrap()
}

fn refinement_scenario() -> Vec<Envelope> {
    vec![
        wire(0, "run.started", None, json!({})),
        wire(1, "stage.started", Some("planning"), json!({})),
        wire(2, "stage.completed", Some("planning"), json!({})),
        wire(3, "stage.started", Some("validation"), json!({})),
        wire(4, "quality.scored", Some("validation"), json!({"score": 45})),
        wire(5, "quality.decision", Some("validation"), json!({"decision": "must-refine"})),
        wire(6, "refinement.started", Some("refinement"), json!({"iteration": 1})),
    ]
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_refinement_scenario() {
    let state = reduce_all(&RunState::running(None), &refinement_scenario());

    assert_eq!(state.run_id.as_deref(), Some("run-1"));
    assert_eq!(state.current_stage, Some(StageId::Refinement));
    assert_eq!(state.score, Some(45.0));
    assert_eq!(state.decision, Some(QualityDecision::MustRefine));
    assert_eq!(state.stage(StageId::Planning).status, StageStatus::Completed);
    assert_eq!(state.stage(StageId::Planning).progress, 100);
    assert_eq!(state.stage(StageId::Validation).status, StageStatus::Active);
    assert_eq!(state.refinement_cycles, 1);
    assert_eq!(state.events.len(), 7);
    assert!(state.is_running);
}

#[test]
fn test_full_run_to_completion() {
    let mut envelopes = refinement_scenario();
    envelopes.extend([
        wire(7, "refinement.completed", Some("refinement"), json!({})),
        wire(
            8,
            "quality.scored",
            Some("validation"),
            json!({
                "score": 91.5,
                "structural_checks": [
                    {"name": "objectives", "passed": true},
                    {"name": "assessment", "passed": true, "message": "rubric present"}
                ],
                "suggestions": ["Add a warm-up activity"],
                "decision": "accept"
            }),
        ),
        wire(9, "stage.started", Some("execution"), json!({})),
        wire(10, "tool.started", Some("execution"), json!({"tool": "worksheet"})),
        wire(
            11,
            "tool.completed",
            Some("execution"),
            json!({"tool": "worksheet", "success": true}),
        ),
        wire(
            12,
            "ai_receipt",
            None,
            json!({"model": "m-1", "input_tokens": 900, "output_tokens": 300}),
        ),
        wire(13, "stage.completed", Some("execution"), json!({})),
        wire(14, "run.completed", None, json!({"plan": {"title": "Fractions", "lessons": 4}})),
    ]);

    let state = reduce_all(&RunState::running(None), &envelopes);

    assert!(!state.is_running);
    assert!(state.error.is_none());
    assert_eq!(state.current_stage, Some(StageId::Done));
    assert!(state.is_complete());
    assert_eq!(state.score, Some(91.5));
    assert_eq!(state.decision, Some(QualityDecision::Accept));
    let report = state.quality_report.as_ref().unwrap();
    assert_eq!(report.checks.len(), 2);
    assert!(report.all_checks_passed());
    assert_eq!(state.plan, Some(json!({"title": "Fractions", "lessons": 4})));
    assert_eq!(state.stage(StageId::Refinement).status, StageStatus::Completed);
    assert_eq!(state.last_seq, Some(14));
}

#[test]
fn test_run_failed_keeps_stage_statuses() {
    let envelopes = vec![
        wire(0, "run.started", None, json!({})),
        wire(1, "stage.started", Some("planning"), json!({})),
        wire(2, "stage.progress", Some("planning"), json!({"progress": 40})),
        wire(3, "stage.failed", Some("planning"), json!({"error": "model overloaded"})),
        wire(4, "run.failed", None, json!({"error": "model overloaded"})),
    ];
    let state = reduce_all(&RunState::running(None), &envelopes);

    assert!(!state.is_running);
    assert_eq!(state.error.as_deref(), Some("model overloaded"));
    assert_eq!(state.stage(StageId::Planning).status, StageStatus::Failed);
    assert_eq!(state.stage(StageId::Planning).progress, 40);
    assert!(state
        .stages
        .iter()
        .all(|stage| stage.status != StageStatus::Completed));
}

#[test]
fn test_progress_is_monotonic_and_clamped() {
    let envelopes = vec![
        wire(1, "stage.started", Some("execution"), json!({})),
        wire(2, "stage.progress", Some("execution"), json!({"progress": 60})),
        wire(3, "stage.progress", Some("execution"), json!({"percent": 30})),
        wire(4, "stage.progress", Some("execution"), json!({"progress": 150})),
    ];
    let mut state = RunState::running(None);
    let mut seen = Vec::new();
    for envelope in &envelopes {
        state = reduce(&state, envelope);
        seen.push(state.stage(StageId::Execution).progress);
    }
    assert_eq!(seen, vec![0, 60, 60, 100]);
}

#[test]
fn test_stages_fixed_order_after_any_input() {
    let envelopes = vec![
        wire(0, "stage.started", Some("done"), json!({})),
        wire(1, "stage.started", Some("orbit"), json!({})),
        wire(2, "cache.warmed", None, json!({"hits": 3})),
        wire(3, "heartbeat", None, Value::Null),
    ];
    let state = reduce_all(&RunState::running(None), &envelopes);

    let ids: Vec<StageId> = state.stages.iter().map(|s| s.id).collect();
    assert_eq!(ids, StageId::ALL.to_vec());
    assert_eq!(state.stages.len(), 5);
    // Unknown stage label is audit-only, unknown type is kept, heartbeat is not.
    assert_eq!(state.events.len(), 3);
    assert_eq!(state.events[2].event_type(), "cache.warmed");
}

#[test]
fn test_batch_and_stepwise_agree() {
    let envelopes = refinement_scenario();
    let initial = RunState::running(None);
    let batch = reduce_all(&initial, &envelopes);
    let stepwise = envelopes
        .iter()
        .fold(initial.clone(), |state, envelope| reduce(&state, envelope));
    assert_eq!(batch, stepwise);

    // Same inputs, same output.
    assert_eq!(reduce_all(&initial, &envelopes), batch);
}

#[test]
fn test_start_run_discards_previous_run() {
    let mut state = reduce_all(&RunState::running(None), &refinement_scenario());
    assert!(!state.events.is_empty());

    state.start_run(Some("run-2".to_string()));
    assert!(state.events.is_empty());
    assert!(state.score.is_none());
    assert!(state.decision.is_none());
    assert!(state.current_stage.is_none());
    assert_eq!(state.refinement_cycles, 0);
    assert!(state.is_running);
    assert!(state
        .stages
        .iter()
        .all(|stage| stage.status == StageStatus::Pending));
}

#[test]
fn test_set_error_stops_run() {
    let mut state = RunState::running(None);
    state.set_error("Connection lost");
    assert_eq!(state.error.as_deref(), Some("Connection lost"));
    assert!(!state.is_running);
}

#[test]
fn test_snapshot_serializes_camel_case() {
    let state = reduce_all(&RunState::running(None), &refinement_scenario());
    let value = serde_json::to_value(&state).unwrap();
    assert_eq!(value["currentStage"], json!("refinement"));
    assert_eq!(value["isRunning"], json!(true));
    assert_eq!(value["stages"][0]["id"], json!("planning"));
    assert_eq!(value["stages"][0]["status"], json!("completed"));
    assert!(value["stages"][0]["completedAt"].is_string());
}
