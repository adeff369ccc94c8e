//! Invocation monitoring hook
//!
//! A process-wide observer can be told when native invocations begin and
//! end. With no observer installed the hook is a single branch; with one
//! installed, its `should_report` query is consulted on every call.

use crate::thread::EnvHandle;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;

/// Observer of native invocations
pub trait InvocationObserver: Send + Sync {
    /// Runtime-wide query: report invocations right now?
    fn should_report(&self) -> bool;

    /// A native invocation has begun; the thread is already Native
    fn notify_begin(&self, env: EnvHandle);

    /// A native invocation is ending; the thread is still Native
    fn notify_end(&self, env: EnvHandle);
}

static GLOBAL_OBSERVER: Lazy<RwLock<Option<Arc<dyn InvocationObserver>>>> =
    Lazy::new(|| RwLock::new(None));

/// Install the process-wide observer picked up by gates built afterwards
pub fn install_global(observer: Arc<dyn InvocationObserver>) {
    *GLOBAL_OBSERVER.write() = Some(observer);
}

/// Remove the process-wide observer
pub fn clear_global() {
    *GLOBAL_OBSERVER.write() = None;
}

/// Currently installed process-wide observer
pub fn global() -> Option<Arc<dyn InvocationObserver>> {
    GLOBAL_OBSERVER.read().clone()
}

/// The hook as seen by one gate
#[derive(Clone, Default)]
pub struct Monitoring {
    observer: Option<Arc<dyn InvocationObserver>>,
}

impl Monitoring {
    /// Hook with no observer
    pub fn disabled() -> Self {
        Self { observer: None }
    }

    /// Hook reporting to `observer`
    pub fn with_observer(observer: Arc<dyn InvocationObserver>) -> Self {
        Self {
            observer: Some(observer),
        }
    }

    /// Hook reporting to the process-wide observer, if one is installed
    pub fn from_global() -> Self {
        Self { observer: global() }
    }

    /// Whether an observer is attached at all
    pub fn is_attached(&self) -> bool {
        self.observer.is_some()
    }

    /// Report the beginning of an invocation
    #[inline]
    pub fn begin(&self, env: EnvHandle) {
        if let Some(observer) = &self.observer {
            if observer.should_report() {
                observer.notify_begin(env);
            }
        }
    }

    /// Report the end of an invocation
    #[inline]
    pub fn end(&self, env: EnvHandle) {
        if let Some(observer) = &self.observer {
            if observer.should_report() {
                observer.notify_end(env);
            }
        }
    }
}

impl std::fmt::Debug for Monitoring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitoring")
            .field("attached", &self.is_attached())
            .finish()
    }
}
