//! Process-wide open-file-descriptor watermark (§4.5, §5).
//!
//! Every file the provider client opens (resolve/sign response bodies held
//! open briefly, and every part file while its GET is in flight) is tracked
//! here so the summary can report the observed peak and callers can assert
//! it stayed within `maxDownloaders * maxPartHandlers + C`.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct OpenFdWatermark {
    current: AtomicUsize,
    high_water: AtomicUsize,
}

/// RAII guard: increments the watermark's current count on creation,
/// decrements it on drop. `high_water` is a monotonic peak, never decremented.
pub struct OpenFdGuard<'a> {
    watermark: &'a OpenFdWatermark,
}

impl OpenFdWatermark {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one more open file descriptor and returns a guard that
    /// releases it on drop.
    pub fn track_open(&self) -> OpenFdGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        self.high_water.fetch_max(now, Ordering::AcqRel);
        OpenFdGuard { watermark: self }
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::Acquire)
    }
}

impl Drop for OpenFdGuard<'_> {
    fn drop(&mut self) {
        self.watermark.current.fetch_sub(1, Ordering::AcqRel);
    }
}
