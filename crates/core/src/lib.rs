//! Plan Pipeline Core
//!
//! Domain types and the pure state machine for consuming a plan-generation
//! event stream. This crate performs no I/O: it decodes envelopes and folds
//! them into run state, and nothing else.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `envelope` - Wire envelope and typed event payloads
//! - `request` - The generation request sent when a run starts
//! - `quality` - Quality report, structural checks, and decision verdicts
//! - `stage` - The five pipeline stages and their transitions
//! - `run_state` - The snapshot readers observe
//! - `reducer` - `reduce(state, envelope) -> state`
//! - `extract` - Derived results (score, report, decision, plan)

pub mod envelope;
pub mod error;
pub mod extract;
pub mod quality;
pub mod reducer;
pub mod request;
pub mod run_state;
pub mod stage;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Envelope ───────────────────────────────────────────────────────────
pub use envelope::{Envelope, EventType, PipelineEvent};

// ── Run State & Reducer ────────────────────────────────────────────────
pub use reducer::{reduce, reduce_all};
pub use run_state::{RunState, CANCELLED_MESSAGE, RUN_FAILED_MESSAGE};
pub use stage::{StageId, StageInfo, StageStatus, Stages};

// ── Derived Results ────────────────────────────────────────────────────
pub use extract::{extract, DerivedResult};
pub use quality::{QualityDecision, QualityReport, StructuralCheck};

// ── Request ────────────────────────────────────────────────────────────
pub use request::GenerationRequest;
