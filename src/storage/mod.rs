//! Storage Layer
//!
//! JSON settings persistence.

pub mod config;

pub use config::*;
