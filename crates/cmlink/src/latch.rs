//! Once-per-connection flags for the disconnect path.

use std::sync::atomic::{AtomicBool, Ordering};

/// A resettable fire-once flag.
///
/// [`trip`](Latch::trip) returns `true` for exactly one caller until the
/// latch is [`reset`](Latch::reset), no matter how many tasks race on it.
#[derive(Debug, Default)]
pub(crate) struct Latch(AtomicBool);

impl Latch {
    pub(crate) const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Trips the latch. Returns `true` only for the call that tripped it.
    pub(crate) fn trip(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_tripped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}
