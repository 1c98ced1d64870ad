//! Retry Policy
//!
//! Decides, after a transport failure, whether to reconnect or to abort the
//! run. The policy holds configuration only; the caller owns the counter of
//! consecutive failures and resets it on every successful open.

use std::time::Duration;

use crate::error::ErrorKind;

/// Reconnect attempts allowed after the first failure.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Pause before each reconnect.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Policy that reconnects immediately, for tests and local tooling.
    pub fn immediate(max_retries: u32) -> Self {
        Self::new(max_retries, Duration::ZERO)
    }

    /// `retry_count` is the number of consecutive failures, this one included.
    pub fn decide(&self, kind: ErrorKind, retry_count: u32) -> RetryDecision {
        match kind {
            ErrorKind::ClientRejected(_) | ErrorKind::Fatal => RetryDecision::Abort,
            ErrorKind::ServerRejected(_) | ErrorKind::Network => {
                if retry_count <= self.max_retries {
                    RetryDecision::Retry
                } else {
                    RetryDecision::Abort
                }
            }
        }
    }
}
