//! Injection latch.

use std::sync::atomic::{AtomicBool, Ordering};

/// Lets exactly one caller through until re-armed.
#[derive(Debug, Default)]
pub struct InjectionGate {
    released: AtomicBool,
}

impl InjectionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate. Only the first caller gets `true`.
    pub fn try_release(&self) -> bool {
        self.released
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Reopen after the claimed action failed.
    pub fn rearm(&self) {
        self.released.store(false, Ordering::Release);
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}
