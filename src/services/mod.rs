//! Services
//!
//! Business logic services for the application.

pub mod pipeline;

pub use pipeline::{GenerationGuard, PipelineConsumer, Selector};
