//! Object monitors
//!
//! Every heap object embeds a reentrant monitor. Threads that have to wait
//! for a contended monitor give up their shared mutator claim while they
//! wait, so a waiting thread never holds up a collector pause.

use crate::exception::{ExceptionRef, Throwable};
use crate::object::ObjRef;
use crate::thread::{ManagedThread, ThreadId};
use callgate::{CallThread, Monitors};
use crossbeam::atomic::AtomicCell;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Errors that can occur when operating on a monitor
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MonitorError {
    /// Exit by a thread that does not own the monitor
    #[error("Thread {thread:?} exited a monitor owned by {owner:?}")]
    NotOwner {
        /// Thread attempting the exit
        thread: ThreadId,
        /// Current owner, if any
        owner: Option<ThreadId>,
    },
}

#[derive(Debug, Default)]
struct MonitorState {
    owner: Option<ThreadId>,
    recursion: u32,
}

/// Reentrant monitor embedded in a heap object
#[derive(Debug, Default)]
pub struct ObjectMonitor {
    /// Current owner, readable without taking the state lock
    owner: AtomicCell<Option<ThreadId>>,
    state: Mutex<MonitorState>,
    released: Condvar,
}

impl ObjectMonitor {
    /// Create an unowned monitor
    pub fn new() -> Self {
        Self::default()
    }

    /// Current owner
    pub fn owner(&self) -> Option<ThreadId> {
        self.owner.load()
    }

    /// Recursion depth of the current owner (0 when unowned)
    pub fn recursion(&self) -> u32 {
        self.state.lock().recursion
    }

    /// Acquire without blocking. Reentrant.
    pub fn try_enter(&self, thread: ThreadId) -> bool {
        let mut state = self.state.lock();
        match state.owner {
            None => {
                state.owner = Some(thread);
                state.recursion = 1;
                self.owner.store(Some(thread));
                true
            }
            Some(owner) if owner == thread => {
                state.recursion += 1;
                true
            }
            Some(_) => false,
        }
    }

    /// Acquire, waiting for the current owner to release
    pub fn enter_blocking(&self, thread: ThreadId) {
        let mut state = self.state.lock();
        loop {
            match state.owner {
                None => {
                    state.owner = Some(thread);
                    state.recursion = 1;
                    self.owner.store(Some(thread));
                    return;
                }
                Some(owner) if owner == thread => {
                    state.recursion += 1;
                    return;
                }
                Some(_) => self.released.wait(&mut state),
            }
        }
    }

    /// Release one level of ownership
    pub fn exit(&self, thread: ThreadId) -> Result<(), MonitorError> {
        let mut state = self.state.lock();
        if state.owner != Some(thread) {
            return Err(MonitorError::NotOwner {
                thread,
                owner: state.owner,
            });
        }
        state.recursion -= 1;
        if state.recursion == 0 {
            state.owner = None;
            self.owner.store(None);
            self.released.notify_one();
        }
        Ok(())
    }
}

/// Monitor subsystem over objects' embedded monitors
#[derive(Debug, Default)]
pub struct MonitorTable {
    enters: AtomicUsize,
    contended: AtomicUsize,
}

impl MonitorTable {
    /// Create a monitor table
    pub fn new() -> Self {
        Self::default()
    }

    /// Total monitor enters
    pub fn enter_count(&self) -> usize {
        self.enters.load(Ordering::Relaxed)
    }

    /// Enters that had to wait
    pub fn contended_count(&self) -> usize {
        self.contended.load(Ordering::Relaxed)
    }

    /// Enter `object`'s monitor, waiting outside Managed state if contended
    pub fn enter(&self, thread: &ManagedThread, object: &ObjRef) {
        self.enters.fetch_add(1, Ordering::Relaxed);
        if object.monitor().try_enter(thread.id()) {
            return;
        }
        self.contended.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(target: "callgate_runtime::monitor", thread = ?thread.id(), object = ?object, "contended monitor enter");
        thread.blocking(|| object.monitor().enter_blocking(thread.id()));
    }

    /// Exit `object`'s monitor, converting misuse into an exception
    pub fn exit(&self, thread: &ManagedThread, object: &ObjRef) -> Result<(), ExceptionRef> {
        object
            .monitor()
            .exit(thread.id())
            .map_err(|e| Throwable::illegal_monitor_state(e.to_string()))
    }
}

impl Monitors<ManagedThread> for MonitorTable {
    fn monitor_enter(&self, thread: &ManagedThread, object: &ObjRef) -> Result<(), ExceptionRef> {
        debug_assert!(thread.holds_mutator_share());
        self.enter(thread, object);
        Ok(())
    }

    fn monitor_exit(&self, thread: &ManagedThread, object: &ObjRef) -> Result<(), ExceptionRef> {
        self.exit(thread, object)
    }
}
