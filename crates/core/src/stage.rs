//! Stage State Machine
//!
//! The five ordered pipeline stages and the per-stage transitions
//! `pending -> active -> {completed | failed}`. The refinement stage is the
//! only one allowed to leave `completed` again: each refinement loop starts a
//! new cycle of the same stage instead of resetting validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a pipeline stage, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageId {
    Planning,
    Validation,
    Refinement,
    Execution,
    Done,
}

impl StageId {
    /// All stages in pipeline order
    pub const ALL: [StageId; 5] = [
        StageId::Planning,
        StageId::Validation,
        StageId::Refinement,
        StageId::Execution,
        StageId::Done,
    ];

    /// Position of this stage in [`StageId::ALL`]
    pub fn index(&self) -> usize {
        match self {
            StageId::Planning => 0,
            StageId::Validation => 1,
            StageId::Refinement => 2,
            StageId::Execution => 3,
            StageId::Done => 4,
        }
    }

    /// Wire name of this stage
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Planning => "planning",
            StageId::Validation => "validation",
            StageId::Refinement => "refinement",
            StageId::Execution => "execution",
            StageId::Done => "done",
        }
    }

    /// Parse a wire name, returning `None` for stages this build does not know.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.as_str() == name)
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Active,
    Completed,
    Failed,
}

impl StageStatus {
    /// Completed and failed stages do not change on ordinary stage events.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Failed)
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Pending => write!(f, "pending"),
            StageStatus::Active => write!(f, "active"),
            StageStatus::Completed => write!(f, "completed"),
            StageStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Clamp a payload-provided progress value into `[0, 100]`.
///
/// Non-finite input maps to 0.
pub fn clamp_progress(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

/// Observed state of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageInfo {
    pub id: StageId,
    pub status: StageStatus,
    /// Always within `[0, 100]`
    pub progress: u8,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StageInfo {
    /// A stage that has not started
    pub fn pending(id: StageId) -> Self {
        Self {
            id,
            status: StageStatus::Pending,
            progress: 0,
            started_at: None,
            completed_at: None,
        }
    }

    /// Enter `active`. Returns false when the transition is not allowed.
    ///
    /// A completed refinement stage starts a new cycle: progress goes back to
    /// 0 and `completed_at` is cleared, `started_at` keeps the first start.
    pub fn start(&mut self, at: DateTime<Utc>) -> bool {
        match self.status {
            StageStatus::Pending | StageStatus::Active => {}
            StageStatus::Completed if self.id == StageId::Refinement => {
                self.progress = 0;
                self.completed_at = None;
            }
            StageStatus::Completed | StageStatus::Failed => return false,
        }
        self.status = StageStatus::Active;
        self.started_at.get_or_insert(at);
        true
    }

    /// Raise progress towards `value`. Progress never decreases.
    pub fn set_progress(&mut self, value: f64) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.progress = self.progress.max(clamp_progress(value));
        true
    }

    /// Enter `completed` with progress forced to 100.
    pub fn complete(&mut self, at: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = StageStatus::Completed;
        self.progress = 100;
        self.completed_at = Some(at);
        true
    }

    /// Enter `failed`.
    pub fn fail(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = StageStatus::Failed;
        true
    }

    /// Mark completed regardless of the current status. Used for the `done`
    /// stage when the whole run completes.
    pub fn force_complete(&mut self, at: DateTime<Utc>) {
        self.status = StageStatus::Completed;
        self.progress = 100;
        self.started_at.get_or_insert(at);
        self.completed_at.get_or_insert(at);
    }
}

/// The fixed set of five stages, always present and always in pipeline order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stages([StageInfo; 5]);

impl Default for Stages {
    fn default() -> Self {
        Self(StageId::ALL.map(StageInfo::pending))
    }
}

impl Stages {
    pub fn get(&self, id: StageId) -> &StageInfo {
        &self.0[id.index()]
    }

    pub fn get_mut(&mut self, id: StageId) -> &mut StageInfo {
        &mut self.0[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &StageInfo> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}
