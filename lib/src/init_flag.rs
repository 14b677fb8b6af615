//! One-shot initialization flags.

use core::sync::atomic::{AtomicBool, Ordering};

/// A flag that records whether a subsystem has been initialized.
pub struct InitFlag(AtomicBool);

impl InitFlag {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Claim initialization. Returns `true` exactly once; every later call
    /// returns `false`.
    pub fn init_once(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn mark_set(&self) {
        self.0.store(true, Ordering::Release);
    }
}

impl Default for InitFlag {
    fn default() -> Self {
        Self::new()
    }
}
