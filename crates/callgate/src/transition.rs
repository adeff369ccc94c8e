//! Thread state transitions around a native call
//!
//! Normal-tier calls release the shared mutator hold for the duration of
//! the call; this is what lets a global pause proceed while native code
//! runs. Fast and Critical calls never leave Managed state: Fast calls pay
//! for a suspend check on the way out, Critical calls pay for nothing.

use crate::error::{fatal, BoundaryError};
use crate::method::Tier;
use crate::thread::{CallThread, ThreadState};

/// Assert that the executing method matches the tier the caller claims.
///
/// Threads that cannot name their executing method are not checked.
#[inline]
pub fn verify_tier<T: CallThread>(thread: &T, expected: Tier) {
    if let Some(method) = thread.executing_method() {
        if method.tier != expected {
            fatal(BoundaryError::TierMismatch {
                method: method.pretty_name(),
                expected,
                actual: method.tier,
            });
        }
    }
}

/// Entry transition for `tier`
#[inline]
pub fn start<T: CallThread>(thread: &T, tier: Tier) {
    match tier {
        Tier::Normal => {
            debug_assert_eq!(thread.state(), ThreadState::Managed);
            thread.transition_to_native();
        }
        Tier::Fast | Tier::Critical => {}
    }
}

/// Exit transition for `tier`
#[inline]
pub fn end<T: CallThread>(thread: &T, tier: Tier) {
    match tier {
        Tier::Normal => go_to_runnable(thread),
        Tier::Fast => go_to_runnable_fast(thread),
        Tier::Critical => {}
    }
}

/// Reacquire the shared mutator hold after a Normal-tier call. Blocks while
/// a global pause is in progress.
#[inline]
pub fn go_to_runnable<T: CallThread>(thread: &T) {
    debug_assert_eq!(thread.state(), ThreadState::Native);
    thread.transition_to_managed();
}

/// Exit of a Fast-tier call: the thread never left Managed state, so only
/// honor a pending safepoint request.
#[inline]
pub fn go_to_runnable_fast<T: CallThread>(thread: &T) {
    if thread.is_suspend_requested() {
        debug_assert!(thread.holds_mutator_share());
        tracing::trace!(target: "callgate::transition", "suspend check on fast native exit");
        thread.check_suspend();
    }
}
