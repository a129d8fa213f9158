//! Cooperative cancellation (§5 "Cancellation & timeouts").
//!
//! A single process-wide abort token for the invocation, checked by worker
//! threads between units of work. Grounded on `ddm-core/src/control.rs`'s
//! `JobControl` abort-token idiom (a shared `AtomicBool` a running job polls,
//! flipped by an external signal), simplified here to one token per
//! invocation instead of a job-id-keyed registry: this crate has no
//! multi-job control socket to address a specific job from (§9), only a
//! single batch running to completion or being interrupted as a whole.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled_and_latches_once_tripped() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn clones_share_the_same_underlying_flag() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled(), "cancelling a clone must be visible through the original");
    }
}
