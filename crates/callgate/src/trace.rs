//! Native call tracing
//!
//! When enabled, Normal-tier calls whose `Class.method` name contains the
//! configured filter are logged on entry and exit, and an "active" flag is
//! raised for the duration of the traced call so the rest of the runtime can
//! tell it is inside one.

use crate::config::TraceConfig;
use crate::defaults::TRACE_TARGET;
use crate::method::NativeMethodDescriptor;
use std::sync::atomic::{AtomicBool, Ordering};

/// Name-filtered tracer for native calls
#[derive(Debug, Default)]
pub struct CallTracer {
    filter: Option<String>,
    active: AtomicBool,
}

impl CallTracer {
    /// Build from config; a disabled config yields an inert tracer
    pub fn new(config: &TraceConfig) -> Self {
        let filter = if config.enabled {
            config.filter.clone().filter(|f| !f.is_empty())
        } else {
            None
        };
        Self {
            filter,
            active: AtomicBool::new(false),
        }
    }

    /// Whether tracing is configured at all
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.filter.is_some()
    }

    /// Whether a traced call is in progress
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn matches(&self, name: &str) -> bool {
        self.filter.as_deref().is_some_and(|f| name.contains(f))
    }

    /// Entry of a Normal-tier call
    pub fn on_enter(&self, method: Option<&NativeMethodDescriptor>, thread_id: u64) {
        let Some(method) = method else { return };
        if !self.is_enabled() {
            return;
        }
        let name = method.pretty_name();
        if self.matches(&name) {
            tracing::info!(target: TRACE_TARGET, method = %name, thread = thread_id, "enter native method");
            self.active.store(true, Ordering::Release);
        }
    }

    /// Exit of a Normal-tier call
    pub fn on_leave(&self, method: Option<&NativeMethodDescriptor>) {
        let Some(method) = method else { return };
        if !self.is_enabled() {
            return;
        }
        let name = method.pretty_name();
        tracing::debug!(target: TRACE_TARGET, method = %name, "native method end");
        if self.matches(&name) {
            self.active.store(false, Ordering::Release);
            tracing::info!(target: TRACE_TARGET, method = %name, "leave native method");
        }
    }
}
