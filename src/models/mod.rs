//! Data Models
//!
//! Settings structures for the consumer.

pub mod settings;

pub use settings::*;
