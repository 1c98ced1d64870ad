//! Run State
//!
//! The in-memory state of one run as readers see it. A `RunState` starts
//! empty, is replaced wholesale when a run starts, and is then only changed
//! by folding envelopes into it (see [`crate::reducer`]) or by recording a
//! terminal error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::Envelope;
use crate::quality::{QualityDecision, QualityReport};
use crate::stage::{StageId, StageInfo, Stages};

/// Error text recorded when the user cancels a run.
pub const CANCELLED_MESSAGE: &str = "Generation cancelled";

/// Error text recorded for `run.failed` without an error message.
pub const RUN_FAILED_MESSAGE: &str = "Generation failed";

/// Snapshot of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    /// Server-assigned run id, known once `run.started` arrives
    pub run_id: Option<String>,
    pub current_stage: Option<StageId>,
    pub stages: Stages,
    /// Audit log of applied envelopes for the active run
    pub events: Vec<Envelope>,
    /// Final artifact
    pub plan: Option<Value>,
    pub quality_report: Option<QualityReport>,
    /// Last observed score
    pub score: Option<f64>,
    /// Last observed quality verdict
    pub decision: Option<QualityDecision>,
    /// Number of refinement cycles entered
    pub refinement_cycles: u32,
    /// `seq` of the last applied envelope
    pub last_seq: Option<u64>,
    pub is_running: bool,
    pub error: Option<String>,
}

impl RunState {
    /// An empty, idle state
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh running state, as the consumer installs it on start.
    pub fn running(run_id: Option<String>) -> Self {
        let mut state = Self::new();
        state.start_run(run_id);
        state
    }

    /// Replace the whole state for a new run, discarding the previous run's
    /// events and derived results.
    pub fn start_run(&mut self, run_id: Option<String>) {
        *self = Self {
            run_id,
            is_running: true,
            ..Self::default()
        };
    }

    /// Fold one envelope into this state.
    pub fn apply(&mut self, envelope: &Envelope) {
        crate::reducer::apply(self, envelope);
    }

    /// Record a terminal error and stop the run.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.is_running = false;
    }

    /// Record user cancellation. Returns false if the run had already ended.
    pub fn cancel(&mut self) -> bool {
        if !self.is_running {
            return false;
        }
        self.set_error(CANCELLED_MESSAGE);
        true
    }

    /// Whether the run ended because the user cancelled it
    pub fn is_cancelled(&self) -> bool {
        self.error.as_deref() == Some(CANCELLED_MESSAGE)
    }

    pub fn stage(&self, id: StageId) -> &StageInfo {
        self.stages.get(id)
    }

    /// Whether the `done` stage has completed
    pub fn is_complete(&self) -> bool {
        self.stages.get(StageId::Done).status == crate::stage::StageStatus::Completed
    }
}
