//! Generation Guard
//!
//! Tags each run invocation with a fresh id. Work scheduled for a run checks
//! `is_current` before touching state, so a superseded run cannot write into
//! the one that replaced it.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct GenerationGuard {
    current: AtomicU64,
}

impl GenerationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new id; every earlier id stops being current.
    pub fn next_generation(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Retire the current id without handing out a replacement.
    pub fn retire(&self) {
        self.current.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current.load(Ordering::SeqCst) == generation
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}
