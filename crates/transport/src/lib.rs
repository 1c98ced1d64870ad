//! Plan Pipeline Transport
//!
//! Opens the generation stream and decides when to reconnect.
//!
//! ## Module Organization
//!
//! - `error` - Transport errors and their retry classification
//! - `sse` - Byte stream to envelope framing
//! - `transport` - `StreamTransport` trait and the reqwest implementation
//! - `retry` - Reconnect policy
//! - `mock` - Scripted transport (tests and the `test-support` feature)

pub mod error;
pub mod retry;
pub mod sse;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{ErrorKind, TransportError};

// ── Transport ──────────────────────────────────────────────────────────
pub use sse::{parse_envelope_stream, parse_sse_line};
pub use transport::{EnvelopeStream, HttpTransport, HttpTransportConfig, StreamTransport};

// ── Retry ──────────────────────────────────────────────────────────────
pub use retry::{RetryDecision, RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY};
