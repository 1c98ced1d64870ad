//! Run Reducer
//!
//! Folds one envelope into a [`RunState`]. The fold depends only on the
//! state and the envelope (timestamps come from the envelope, never from the
//! clock), so applying envelopes one at a time and applying them as a batch
//! give the same result.
//!
//! Envelopes are applied in the order given. The reducer does not reorder or
//! deduplicate by `seq`.

use crate::envelope::{Envelope, PipelineEvent};
use crate::extract::{extract, DerivedResult};
use crate::run_state::{RunState, RUN_FAILED_MESSAGE};
use crate::stage::StageId;

/// Pure form: return the state after applying `envelope`.
pub fn reduce(state: &RunState, envelope: &Envelope) -> RunState {
    let mut next = state.clone();
    apply(&mut next, envelope);
    next
}

/// Apply a batch of envelopes in order.
pub fn reduce_all<'a, I>(state: &RunState, envelopes: I) -> RunState
where
    I: IntoIterator<Item = &'a Envelope>,
{
    let mut next = state.clone();
    for envelope in envelopes {
        apply(&mut next, envelope);
    }
    next
}

/// In-place form used by the consumer.
pub fn apply(state: &mut RunState, envelope: &Envelope) {
    // Keep-alive only; not part of the run's history.
    if matches!(envelope.event, PipelineEvent::Heartbeat) {
        return;
    }

    let ts = envelope.ts;
    match &envelope.event {
        PipelineEvent::RunStarted(_) => {
            state.run_id = Some(envelope.run_id.clone());
        }
        PipelineEvent::StageStarted(_) => {
            if let Some(id) = envelope.stage {
                enter_stage(state, id, envelope);
            }
        }
        PipelineEvent::StageProgress(payload) => {
            if let (Some(id), Some(progress)) = (envelope.stage, payload.progress) {
                state.stages.get_mut(id).set_progress(progress);
            }
        }
        PipelineEvent::StageCompleted(_) => {
            if let Some(id) = envelope.stage {
                state.stages.get_mut(id).complete(ts);
            }
        }
        PipelineEvent::StageFailed(_) => {
            // The run keeps going until run.failed says otherwise.
            if let Some(id) = envelope.stage {
                state.stages.get_mut(id).fail();
            }
        }
        PipelineEvent::RefinementStarted(_) => {
            enter_stage(state, StageId::Refinement, envelope);
        }
        PipelineEvent::RefinementCompleted(_) => {
            state.stages.get_mut(StageId::Refinement).complete(ts);
        }
        PipelineEvent::RunCompleted(_) => {
            state.stages.get_mut(StageId::Done).force_complete(ts);
            state.current_stage = Some(StageId::Done);
            state.is_running = false;
        }
        PipelineEvent::RunFailed(payload) => {
            state.is_running = false;
            let message = payload
                .error
                .clone()
                .unwrap_or_else(|| RUN_FAILED_MESSAGE.to_string());
            state.error = Some(message);
        }
        PipelineEvent::QualityScored(_)
        | PipelineEvent::QualityDecision(_)
        | PipelineEvent::ToolStarted(_)
        | PipelineEvent::ToolCompleted(_)
        | PipelineEvent::AiReceipt(_)
        | PipelineEvent::Heartbeat
        | PipelineEvent::Unknown { .. } => {}
    }

    for derived in extract(&envelope.event) {
        match derived {
            DerivedResult::Score(score) => state.score = Some(score),
            DerivedResult::Report(report) => {
                state.decision = Some(report.decision);
                state.quality_report = Some(report);
            }
            DerivedResult::Decision(decision) => state.decision = Some(decision),
            DerivedResult::Plan(plan) => state.plan = Some(plan),
        }
    }

    state.last_seq = Some(envelope.seq);
    state.events.push(envelope.clone());
}

fn enter_stage(state: &mut RunState, id: StageId, envelope: &Envelope) {
    let stage = state.stages.get_mut(id);
    let was_active = stage.status == crate::stage::StageStatus::Active;
    if !stage.start(envelope.ts) {
        return;
    }
    state.current_stage = Some(id);
    if id == StageId::Refinement && !was_active {
        state.refinement_cycles += 1;
    }
}
