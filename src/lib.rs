//! Plan Pipeline
//!
//! Client-side consumer for a streamed plan-generation job. It opens the
//! generation event stream, folds every envelope into one run state, and
//! exposes reactive snapshots of that state.
//! It includes:
//! - The pipeline consumer (start, cancel, snapshots, selectors)
//! - Settings and their JSON storage
//! - Logging setup and shared utilities

pub mod logging;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

// ── Consumer ───────────────────────────────────────────────────────────
pub use services::pipeline::{GenerationGuard, PipelineConsumer, Selector};

// ── Settings ───────────────────────────────────────────────────────────
pub use models::settings::{PipelineSettings, SettingsUpdate};
pub use storage::config::ConfigService;

// ── Errors ─────────────────────────────────────────────────────────────
pub use utils::error::{AppError, AppResult};
