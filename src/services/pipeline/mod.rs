//! Pipeline Consumer Module
//!
//! Consumes the plan-generation event stream and keeps one live run state.
//!
//! # Architecture
//!
//! - `generation`: `GenerationGuard`, tags each run so stale work is discarded
//! - `consumer`: `PipelineConsumer`, start, cancel, snapshots, retries
//! - `selector`: `Selector<T>`, change-only notifications for one slice of state
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use plan_pipeline::services::pipeline::PipelineConsumer;
//! use plan_pipeline_core::GenerationRequest;
//! use plan_pipeline_transport::{HttpTransport, HttpTransportConfig, RetryPolicy};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new(
//!     "https://plans.example.com/api/v1/plans/generate",
//!     HttpTransportConfig::default(),
//! )?;
//! let consumer = PipelineConsumer::new(Arc::new(transport), RetryPolicy::default());
//!
//! let mut stage = consumer.select(|state| state.current_stage);
//! consumer.start(GenerationRequest::new("Fractions", "4", "math"))?;
//! while let Some(current) = stage.changed().await {
//!     println!("stage: {:?}", current);
//! }
//! # Ok(())
//! # }
//! ```

pub mod consumer;
pub mod generation;
pub mod selector;

pub use consumer::PipelineConsumer;
pub use generation::GenerationGuard;
pub use selector::Selector;
