//! Mutator Lock and Stop-the-World Pauses
//!
//! Threads running managed code hold a shared claim on the mutator lock. A
//! pause (garbage collection, debugger suspension) takes the lock
//! exclusively, so it can only begin once every thread has either reached a
//! suspend check or is running native code and holds no claim at all.
//!
//! ## Pause Protocol
//!
//! 1. The requester raises the pending flag and every attached thread's
//!    suspend request.
//! 2. It takes the lock exclusively. The lock is task-fair, so once the
//!    requester waits no new shared claim is granted.
//! 3. Managed threads release their claim at their next suspend check and
//!    block reacquiring it. Native threads are not waited for.
//! 4. The pause body runs, then requests are cleared and the lock released.

use parking_lot::lock_api::RawRwLock as _;
use parking_lot::{Mutex, RawRwLock};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

/// Reasons for requesting a pause
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PauseReason {
    /// Garbage collection
    GarbageCollection,
    /// Debugger suspension
    Debug,
}

/// Statistics tracking for pauses
#[derive(Debug, Default)]
pub struct SafepointStats {
    /// Total number of pauses executed
    total_pauses: AtomicUsize,
    /// Total time spent paused (microseconds)
    total_pause_time_us: AtomicUsize,
    /// Maximum pause time (microseconds)
    max_pause_time_us: AtomicUsize,
    /// Suspend checks that released a claim for a pause
    suspend_checks: AtomicUsize,
}

impl SafepointStats {
    /// Total number of pauses executed
    pub fn total_pauses(&self) -> usize {
        self.total_pauses.load(Ordering::Relaxed)
    }

    /// Total time spent paused (microseconds)
    pub fn total_pause_time_us(&self) -> usize {
        self.total_pause_time_us.load(Ordering::Relaxed)
    }

    /// Maximum pause time (microseconds)
    pub fn max_pause_time_us(&self) -> usize {
        self.max_pause_time_us.load(Ordering::Relaxed)
    }

    /// Suspend checks that released a claim for a pause
    pub fn suspend_checks(&self) -> usize {
        self.suspend_checks.load(Ordering::Relaxed)
    }

    pub(crate) fn record_suspend_check(&self) {
        self.suspend_checks.fetch_add(1, Ordering::Relaxed);
    }

    fn record(&self, elapsed: usize) {
        self.total_pauses.fetch_add(1, Ordering::Relaxed);
        self.total_pause_time_us
            .fetch_add(elapsed, Ordering::Relaxed);

        let mut max = self.max_pause_time_us.load(Ordering::Relaxed);
        while elapsed > max {
            match self.max_pause_time_us.compare_exchange_weak(
                max,
                elapsed,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => max = current,
            }
        }
    }
}

/// Reader/writer lock separating mutators from pauses
pub struct MutatorLock {
    raw: RawRwLock,
    /// A pause has been requested or is running
    pause_pending: AtomicBool,
    /// Current pause reason
    current_reason: Mutex<Option<PauseReason>>,
    /// Outstanding shared claims
    shared_claims: AtomicUsize,
    /// Statistics
    stats: SafepointStats,
}

impl MutatorLock {
    /// Create an unheld lock
    pub fn new() -> Self {
        Self {
            raw: RawRwLock::INIT,
            pause_pending: AtomicBool::new(false),
            current_reason: Mutex::new(None),
            shared_claims: AtomicUsize::new(0),
            stats: SafepointStats::default(),
        }
    }

    /// Fast check for a pending pause
    #[inline(always)]
    pub fn is_pause_pending(&self) -> bool {
        self.pause_pending.load(Ordering::Acquire)
    }

    /// Reason of the pause in progress, if any
    pub fn current_reason(&self) -> Option<PauseReason> {
        *self.current_reason.lock()
    }

    /// Number of threads currently holding a shared claim
    pub fn shared_claims(&self) -> usize {
        self.shared_claims.load(Ordering::Acquire)
    }

    /// Pause statistics
    pub fn stats(&self) -> &SafepointStats {
        &self.stats
    }

    /// Take a shared claim, blocking while a pause is running or waiting
    pub(crate) fn acquire_shared(&self) {
        self.raw.lock_shared();
        self.shared_claims.fetch_add(1, Ordering::AcqRel);
    }

    /// Give up a shared claim.
    ///
    /// The caller must hold a claim taken with `acquire_shared`.
    pub(crate) fn release_shared(&self) {
        self.shared_claims.fetch_sub(1, Ordering::AcqRel);
        // SAFETY: callers only release a claim they took with acquire_shared.
        unsafe { self.raw.unlock_shared() };
    }

    /// Run `body` with every Managed thread stopped.
    ///
    /// `raise` is called once the pause is pending and must flag every
    /// attached thread's suspend request; `lower` clears them afterwards.
    /// Must not be called by a thread that holds a shared claim.
    pub(crate) fn pause<R>(
        &self,
        reason: PauseReason,
        raise: impl FnOnce(),
        lower: impl FnOnce(),
        body: impl FnOnce() -> R,
    ) -> R {
        {
            let mut current = self.current_reason.lock();
            if let Some(active) = *current {
                tracing::warn!(target: "callgate_runtime::mutator", ?active, ?reason, "pause requested while another is active");
            }
            *current = Some(reason);
        }
        self.pause_pending.store(true, Ordering::Release);
        raise();

        self.raw.lock_exclusive();
        let start = Instant::now();
        tracing::debug!(target: "callgate_runtime::mutator", ?reason, "world stopped");

        let result = body();

        let elapsed = start.elapsed().as_micros() as usize;
        self.stats.record(elapsed);
        lower();
        self.pause_pending.store(false, Ordering::Release);
        *self.current_reason.lock() = None;
        // SAFETY: taken exclusively above on this thread.
        unsafe { self.raw.unlock_exclusive() };
        tracing::debug!(target: "callgate_runtime::mutator", ?reason, elapsed_us = elapsed, "world resumed");
        result
    }
}

impl Default for MutatorLock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MutatorLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutatorLock")
            .field("pause_pending", &self.is_pause_pending())
            .field("shared_claims", &self.shared_claims())
            .finish()
    }
}
