//! Utilities
//!
//! Error type and path helpers shared by the application.

pub mod error;
pub mod paths;

pub use error::*;
pub use paths::*;
