//! Call stub entry points
//!
//! `CallGate` is what compiled call stubs and the generic dispatcher talk
//! to. Every entry point is a fixed composition of the scope, transition,
//! synchronization and marshaling steps; the order of those steps is the
//! protocol:
//!
//! ```text
//! start: [lock target] -> push scope -> Managed->Native -> [begin hook]
//! end:   [end hook] -> Native->Managed -> [unlock target] -> decode -> pop scope
//! ```
//!
//! Fast calls skip the state change and only suspend-check on exit.
//! Critical calls skip everything.

use crate::barrier;
use crate::config::GateConfig;
use crate::error::{fatal, BoundaryError};
use crate::hook::Monitoring;
use crate::interfaces::{ObjectOf, Runtime};
use crate::marshal::{marshal_primitive, FloatNormalizer, MarshaledResult, RawResult, ReturnTag};
use crate::method::{NativeMethodDescriptor, Tier};
use crate::scope::{pop_scope, push_scope};
use crate::sync::{lock_for_call, unlock_for_call};
use crate::thread::{CallThread, HandleWrapper, RawHandle, SegmentCookie};
use crate::trace::CallTracer;
use crate::transition::{self, verify_tier};
use std::sync::Arc;

/// Native call boundary for one runtime
pub struct CallGate<R: Runtime> {
    runtime: Arc<R>,
    config: GateConfig,
    normalize_float: FloatNormalizer,
    monitoring: Monitoring,
    tracer: CallTracer,
}

impl<R: Runtime> CallGate<R> {
    /// Create a gate reporting to the process-wide observer, if installed
    pub fn new(runtime: Arc<R>, config: GateConfig) -> Self {
        let normalize_float = config.float_return.normalizer();
        let tracer = CallTracer::new(&config.trace);
        tracing::debug!(
            target: "callgate",
            check_jni = config.check_jni,
            verify_tiers = config.verify_tiers,
            float_return = %config.float_return,
            tracing = tracer.is_enabled(),
            "call gate created"
        );
        Self {
            runtime,
            config,
            normalize_float,
            monitoring: Monitoring::from_global(),
            tracer,
        }
    }

    /// Replace the invocation monitoring hook
    pub fn with_monitoring(mut self, monitoring: Monitoring) -> Self {
        self.monitoring = monitoring;
        self
    }

    /// Gate configuration
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Collaborators
    pub fn runtime(&self) -> &Arc<R> {
        &self.runtime
    }

    /// Native call tracer
    pub fn tracer(&self) -> &CallTracer {
        &self.tracer
    }

    // ========================================================================
    // Barrier
    // ========================================================================

    /// Refresh a static method's declaring class slot before the call
    #[inline]
    pub fn read_barrier_declaring_class(&self, declaring_class: &mut ObjectOf<R>) {
        barrier::read_barrier_declaring_class(self.runtime.collector(), declaring_class);
    }

    // ========================================================================
    // Normal tier
    // ========================================================================

    /// Entry of a Normal-tier call: push a scope and leave Managed state
    pub fn method_start(&self, thread: &R::Thread) -> SegmentCookie {
        let cookie = push_scope(thread);
        self.trace_enter(thread);
        self.check_tier(thread, Tier::Normal);
        transition::start(thread, Tier::Normal);
        cookie
    }

    /// Entry of a synchronized Normal-tier call
    pub fn method_start_synchronized(
        &self,
        to_lock: &ObjectOf<R>,
        thread: &R::Thread,
    ) -> SegmentCookie {
        lock_for_call(self.runtime.monitors(), thread, to_lock);
        self.method_start(thread)
    }

    /// Exit of a Normal-tier call
    pub fn method_end(&self, cookie: SegmentCookie, thread: &R::Thread) {
        self.trace_leave(thread);
        self.go_to_runnable(thread);
        pop_scope(thread, cookie, self.config.check_jni);
    }

    /// Exit of a synchronized Normal-tier call
    pub fn method_end_synchronized(
        &self,
        cookie: SegmentCookie,
        locked: &ObjectOf<R>,
        thread: &R::Thread,
    ) {
        self.trace_leave(thread);
        self.go_to_runnable(thread);
        unlock_for_call(self.runtime.monitors(), thread, locked);
        pop_scope(thread, cookie, self.config.check_jni);
    }

    /// Exit of a Normal-tier call returning a reference
    pub fn method_end_with_reference(
        &self,
        result: RawHandle,
        cookie: SegmentCookie,
        thread: &R::Thread,
    ) -> Option<ObjectOf<R>> {
        self.trace_leave(thread);
        self.go_to_runnable(thread);
        self.reference_result(result, cookie, thread, None)
    }

    /// Exit of a synchronized Normal-tier call returning a reference
    pub fn method_end_with_reference_synchronized(
        &self,
        result: RawHandle,
        cookie: SegmentCookie,
        locked: &ObjectOf<R>,
        thread: &R::Thread,
    ) -> Option<ObjectOf<R>> {
        self.trace_leave(thread);
        self.go_to_runnable(thread);
        unlock_for_call(self.runtime.monitors(), thread, locked);
        self.reference_result(result, cookie, thread, None)
    }

    // ========================================================================
    // Fast tier
    // ========================================================================

    /// Entry of a Fast-tier call: push a scope only
    pub fn method_fast_start(&self, thread: &R::Thread) -> SegmentCookie {
        let cookie = push_scope(thread);
        self.check_tier(thread, Tier::Fast);
        cookie
    }

    /// Exit of a Fast-tier call
    pub fn method_fast_end(&self, cookie: SegmentCookie, thread: &R::Thread) {
        self.go_to_runnable_fast(thread);
        pop_scope(thread, cookie, self.config.check_jni);
    }

    /// Exit of a Fast-tier call returning a reference
    pub fn method_fast_end_with_reference(
        &self,
        result: RawHandle,
        cookie: SegmentCookie,
        thread: &R::Thread,
    ) -> Option<ObjectOf<R>> {
        self.go_to_runnable_fast(thread);
        self.trace_leave(thread);
        self.reference_result(result, cookie, thread, None)
    }

    // ========================================================================
    // Critical tier
    // ========================================================================

    /// Entry of a Critical-tier call. Touches neither state nor scope.
    #[inline]
    pub fn method_critical_start(&self, thread: &R::Thread) {
        self.check_tier(thread, Tier::Critical);
    }

    /// Exit of a Critical-tier call. Touches neither state nor scope.
    #[inline]
    pub fn method_critical_end(&self, thread: &R::Thread) {
        self.check_tier(thread, Tier::Critical);
    }

    // ========================================================================
    // Monitored variants
    // ========================================================================

    /// `method_start` followed by the begin hook
    pub fn monitored_method_start(&self, thread: &R::Thread) -> SegmentCookie {
        let cookie = self.method_start(thread);
        self.monitoring.begin(thread.env());
        cookie
    }

    /// `method_start_synchronized` followed by the begin hook
    pub fn monitored_method_start_synchronized(
        &self,
        to_lock: &ObjectOf<R>,
        thread: &R::Thread,
    ) -> SegmentCookie {
        let cookie = self.method_start_synchronized(to_lock, thread);
        self.monitoring.begin(thread.env());
        cookie
    }

    /// End hook followed by `method_end`
    pub fn monitored_method_end(&self, cookie: SegmentCookie, thread: &R::Thread) {
        self.monitoring.end(thread.env());
        self.method_end(cookie, thread);
    }

    /// End hook followed by `method_end_synchronized`
    pub fn monitored_method_end_synchronized(
        &self,
        cookie: SegmentCookie,
        locked: &ObjectOf<R>,
        thread: &R::Thread,
    ) {
        self.monitoring.end(thread.env());
        self.method_end_synchronized(cookie, locked, thread);
    }

    /// End hook followed by `method_end_with_reference`
    pub fn monitored_method_end_with_reference(
        &self,
        result: RawHandle,
        cookie: SegmentCookie,
        thread: &R::Thread,
    ) -> Option<ObjectOf<R>> {
        self.monitoring.end(thread.env());
        self.method_end_with_reference(result, cookie, thread)
    }

    /// End hook followed by `method_end_with_reference_synchronized`
    pub fn monitored_method_end_with_reference_synchronized(
        &self,
        result: RawHandle,
        cookie: SegmentCookie,
        locked: &ObjectOf<R>,
        thread: &R::Thread,
    ) -> Option<ObjectOf<R>> {
        self.monitoring.end(thread.env());
        self.method_end_with_reference_synchronized(result, cookie, locked, thread)
    }

    // ========================================================================
    // Generic (metadata-driven)
    // ========================================================================

    /// Entry for call sites that only know the method's identity.
    ///
    /// A synchronized method is locked before any tier-specific step, so
    /// `generic_method_end` always has a matching enter to release.
    /// Critical calls push nothing; the returned cookie is the untouched
    /// current scope base and is ignored by `generic_method_end`.
    pub fn generic_method_start(
        &self,
        thread: &R::Thread,
        method: &NativeMethodDescriptor,
    ) -> SegmentCookie {
        self.check_synchronized_tier(method);
        if method.synchronized {
            let target = self.synchronization_target(thread, method);
            lock_for_call(self.runtime.monitors(), thread, &target);
        }
        match method.tier {
            Tier::Normal => {
                let cookie = self.method_start(thread);
                self.monitoring.begin(thread.env());
                cookie
            }
            Tier::Fast => self.method_fast_start(thread),
            Tier::Critical => {
                self.method_critical_start(thread);
                thread.local_ref_cookie()
            }
        }
    }

    /// Exit for call sites that only know the method's identity.
    ///
    /// The thread is back in Managed state before the synchronized flag or
    /// the lock object are looked at; the lock is released before the scope
    /// that references it is popped; a reference result is decoded before
    /// the pop as well.
    pub fn generic_method_end(
        &self,
        thread: &R::Thread,
        cookie: SegmentCookie,
        raw: RawResult,
        method: &NativeMethodDescriptor,
    ) -> MarshaledResult<ObjectOf<R>> {
        match method.tier {
            Tier::Normal => {
                self.monitoring.end(thread.env());
                self.trace_leave(thread);
                self.go_to_runnable(thread);
            }
            Tier::Fast => self.go_to_runnable_fast(thread),
            Tier::Critical => self.method_critical_end(thread),
        }

        if method.synchronized {
            self.check_synchronized_tier(method);
            let target = self.synchronization_target(thread, method);
            unlock_for_call(self.runtime.monitors(), thread, &target);
        }

        let tag = ReturnTag::from_shorty(method.return_shorty()).unwrap_or_else(|e| fatal(e));
        if tag.is_reference() {
            if method.tier == Tier::Critical {
                fatal(BoundaryError::CriticalReferenceReturn(method.pretty_name()));
            }
            if method.tier == Tier::Fast {
                self.trace_leave(thread);
            }
            return MarshaledResult::Object(self.reference_result(
                raw.handle(),
                cookie,
                thread,
                Some(method),
            ));
        }

        if method.tier.uses_local_scope() {
            pop_scope(thread, cookie, self.config.check_jni);
        }
        marshal_primitive(tag, raw, self.normalize_float)
    }

    // ========================================================================
    // Shared steps
    // ========================================================================

    fn go_to_runnable(&self, thread: &R::Thread) {
        self.check_tier(thread, Tier::Normal);
        transition::go_to_runnable(thread);
    }

    fn go_to_runnable_fast(&self, thread: &R::Thread) {
        self.check_tier(thread, Tier::Fast);
        transition::go_to_runnable_fast(thread);
    }

    /// Decode a reference result, pop the scope, and verify in checked mode.
    ///
    /// The raw handle is meaningless when an exception is pending, so it is
    /// not decoded at all then.
    fn reference_result(
        &self,
        result: RawHandle,
        cookie: SegmentCookie,
        thread: &R::Thread,
        method: Option<&NativeMethodDescriptor>,
    ) -> Option<ObjectOf<R>> {
        let mut object = if thread.is_exception_pending() {
            None
        } else {
            thread.decode_handle(result)
        };
        pop_scope(thread, cookie, self.config.check_jni);

        if self.config.check_jni {
            let executing = if method.is_none() {
                thread.executing_method()
            } else {
                None
            };
            if let Some(method) = method.or(executing.as_deref()) {
                let protected = HandleWrapper::new(thread, &mut object);
                self.runtime
                    .resolver()
                    .check_reference_result(thread, method, protected.get());
            }
        }
        object
    }

    fn synchronization_target(
        &self,
        thread: &R::Thread,
        method: &NativeMethodDescriptor,
    ) -> ObjectOf<R> {
        self.runtime
            .resolver()
            .synchronization_target(thread, method)
            .unwrap_or_else(|| {
                fatal(BoundaryError::MissingSynchronizationTarget(
                    method.pretty_name(),
                ))
            })
    }

    #[inline]
    fn check_tier(&self, thread: &R::Thread, tier: Tier) {
        if self.config.verify_tiers {
            verify_tier(thread, tier);
        }
    }

    #[inline]
    fn check_synchronized_tier(&self, method: &NativeMethodDescriptor) {
        if self.config.verify_tiers && method.synchronized && method.tier != Tier::Normal {
            fatal(BoundaryError::SynchronizedNonNormal {
                method: method.pretty_name(),
                tier: method.tier,
            });
        }
    }

    fn trace_enter(&self, thread: &R::Thread) {
        if self.tracer.is_enabled() {
            self.tracer
                .on_enter(thread.executing_method().as_deref(), thread.env().0);
        }
    }

    fn trace_leave(&self, thread: &R::Thread) {
        if self.tracer.is_enabled() {
            self.tracer.on_leave(thread.executing_method().as_deref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TraceConfig;
    use crate::testing::{exc, obj, MockRuntime, MockThread, RecordingObserver};
    use crate::thread::ThreadState;

    fn gate(runtime: &Arc<MockRuntime>) -> CallGate<MockRuntime> {
        let config = GateConfig {
            check_jni: true,
            verify_tiers: true,
            ..GateConfig::default()
        };
        CallGate::new(runtime.clone(), config).with_monitoring(Monitoring::disabled())
    }

    #[test]
    fn test_normal_int_call_scenario() {
        let runtime = Arc::new(MockRuntime::new());
        let gate = gate(&runtime);
        let thread = MockThread::new();
        let method = NativeMethodDescriptor::new("Math", "add", "III", Tier::Normal);
        thread.set_executing(method.clone());
        let depth = thread.locals_segment_state();

        let cookie = gate.generic_method_start(&thread, &method);
        assert_eq!(thread.state(), ThreadState::Native);
        let result = gate.generic_method_end(&thread, cookie, RawResult::from_gpr(42), &method);

        assert_eq!(result, MarshaledResult::Int(42));
        assert_eq!(thread.state(), ThreadState::Managed);
        assert_eq!(thread.locals_segment_state(), depth);
    }

    #[test]
    fn test_synchronized_reference_call_with_exception() {
        let runtime = Arc::new(MockRuntime::new());
        let gate = gate(&runtime);
        let thread = MockThread::new();
        let method = NativeMethodDescriptor::new("Store", "load", "L", Tier::Normal)
            .synchronized()
            .returning("Value");
        thread.set_executing(method.clone());

        let cookie = gate.generic_method_start(&thread, &method);
        let handle = thread.add_local("result");
        let pending = exc("java.lang.IllegalStateException");
        thread.set_exception(pending.clone());

        let result =
            gate.generic_method_end(&thread, cookie, RawResult::from_handle(handle), &method);

        assert_eq!(result, MarshaledResult::Object(None));
        assert!(Arc::ptr_eq(&thread.exception().unwrap(), &pending));
        assert_eq!(
            thread.events(),
            vec!["enter:class", "to_native", "to_managed", "exit:class"]
        );
        assert_eq!(thread.decode_count(), 0);
        assert_eq!(thread.local_count(), 0);
    }

    #[test]
    fn test_reference_result_decoded_before_pop() {
        let runtime = Arc::new(MockRuntime::new());
        let gate = gate(&runtime);
        let thread = MockThread::new();
        let method = NativeMethodDescriptor::new("Store", "get", "L", Tier::Normal);
        thread.set_executing(method.clone());

        let cookie = gate.method_start(&thread);
        let handle = thread.add_local("value");
        let result = gate.method_end_with_reference(handle, cookie, &thread);

        assert_eq!(result.as_deref().map(String::as_str), Some("value"));
        assert_eq!(thread.local_count(), 0);
        assert_eq!(runtime.checked_results(), vec![Some("value".to_string())]);
        assert_eq!(thread.handle_depth(), 0);
    }

    #[test]
    fn test_fast_call_without_safepoint() {
        let runtime = Arc::new(MockRuntime::new());
        let gate = gate(&runtime);
        let thread = MockThread::new();
        let method = NativeMethodDescriptor::new("Math", "abs", "II", Tier::Fast);
        thread.set_executing(method.clone());

        let cookie = gate.generic_method_start(&thread, &method);
        thread.add_local("temp");
        assert_eq!(thread.state(), ThreadState::Managed);
        let result = gate.generic_method_end(&thread, cookie, RawResult::from_gpr(5), &method);

        assert_eq!(result, MarshaledResult::Int(5));
        assert!(thread.events().is_empty());
        assert_eq!(thread.local_count(), 0);
    }

    #[test]
    fn test_critical_call_touches_nothing() {
        let runtime = Arc::new(MockRuntime::new());
        let gate = gate(&runtime);
        let thread = MockThread::new();
        thread.add_local("outer");
        let method = NativeMethodDescriptor::new("Math", "sqrt", "DD", Tier::Critical);
        thread.set_executing(method.clone());
        let base = thread.local_ref_cookie();
        let top = thread.locals_segment_state();

        let cookie = gate.generic_method_start(&thread, &method);
        let result = gate.generic_method_end(
            &thread,
            cookie,
            RawResult::from_fpr(3.0f64.to_bits()),
            &method,
        );

        assert_eq!(result, MarshaledResult::Double(3.0));
        assert_eq!(thread.local_ref_cookie(), base);
        assert_eq!(thread.locals_segment_state(), top);
        assert!(thread.events().is_empty());
    }

    #[test]
    fn test_monitoring_fires_inside_native_window() {
        let runtime = Arc::new(MockRuntime::new());
        let observer = Arc::new(RecordingObserver::new(true));
        let gate = gate(&runtime).with_monitoring(Monitoring::with_observer(observer.clone()));
        let thread = MockThread::new();
        observer.share_log(thread.log());

        let cookie = gate.monitored_method_start(&thread);
        gate.monitored_method_end(cookie, &thread);

        assert_eq!(observer.events(), vec!["begin:1", "end:1"]);
        assert_eq!(
            thread.events(),
            vec!["to_native", "begin:1", "end:1", "to_managed"]
        );
        assert_eq!(thread.state(), ThreadState::Managed);
    }

    #[test]
    fn test_specialized_synchronized_pair() {
        let runtime = Arc::new(MockRuntime::new());
        let gate = gate(&runtime);
        let thread = MockThread::new();
        let lock = obj("receiver");

        let cookie = gate.method_start_synchronized(&lock, &thread);
        thread.add_local("tmp");
        gate.method_end_synchronized(cookie, &lock, &thread);

        assert_eq!(
            thread.events(),
            vec!["enter:receiver", "to_native", "to_managed", "exit:receiver"]
        );
        assert_eq!(thread.local_count(), 0);
    }

    #[test]
    fn test_void_generic_returns_zero() {
        let runtime = Arc::new(MockRuntime::new());
        let gate = gate(&runtime);
        let thread = MockThread::new();
        let method = NativeMethodDescriptor::new("Io", "flush", "V", Tier::Normal);

        let cookie = gate.generic_method_start(&thread, &method);
        let result = gate.generic_method_end(&thread, cookie, RawResult { gpr: 9, fpr: 9 }, &method);
        assert_eq!(result, MarshaledResult::Void);
    }

    #[test]
    fn test_trace_flag_spans_traced_call() {
        let runtime = Arc::new(MockRuntime::new());
        let config = GateConfig {
            trace: TraceConfig {
                enabled: true,
                filter: Some("Crypto.digest".to_string()),
            },
            ..GateConfig::default()
        };
        let gate = CallGate::new(runtime, config).with_monitoring(Monitoring::disabled());
        let thread = MockThread::new();
        thread.set_executing(NativeMethodDescriptor::new("Crypto", "digest", "V", Tier::Normal));

        let cookie = gate.method_start(&thread);
        assert!(gate.tracer().is_active());
        gate.method_end(cookie, &thread);
        assert!(!gate.tracer().is_active());
    }

    #[test]
    fn test_synchronized_fast_generic_call_locks_before_unlock() {
        let runtime = Arc::new(MockRuntime::new());
        let config = GateConfig {
            verify_tiers: false,
            ..GateConfig::default()
        };
        let gate = CallGate::new(runtime, config).with_monitoring(Monitoring::disabled());
        let thread = MockThread::new();
        let method = NativeMethodDescriptor::new("Counter", "bump", "V", Tier::Fast).synchronized();
        thread.set_executing(method.clone());

        let cookie = gate.generic_method_start(&thread, &method);
        assert_eq!(thread.events(), vec!["enter:class"]);
        gate.generic_method_end(&thread, cookie, RawResult::default(), &method);

        assert_eq!(thread.events(), vec!["enter:class", "exit:class"]);
        assert!(thread.exception().is_none());
    }

    #[test]
    fn test_synchronized_critical_generic_call_locks_before_unlock() {
        let runtime = Arc::new(MockRuntime::new());
        let config = GateConfig {
            verify_tiers: false,
            ..GateConfig::default()
        };
        let gate = CallGate::new(runtime, config).with_monitoring(Monitoring::disabled());
        let thread = MockThread::new();
        let method =
            NativeMethodDescriptor::new("Counter", "peek", "I", Tier::Critical).synchronized();

        let cookie = gate.generic_method_start(&thread, &method);
        let result = gate.generic_method_end(&thread, cookie, RawResult::from_gpr(4), &method);

        assert_eq!(result, MarshaledResult::Int(4));
        assert_eq!(thread.events(), vec!["enter:class", "exit:class"]);
    }

    #[test]
    fn test_fast_reference_exit_leaves_trace() {
        let runtime = Arc::new(MockRuntime::new());
        let config = GateConfig {
            trace: TraceConfig {
                enabled: true,
                filter: Some("Cache.lookup".to_string()),
            },
            ..GateConfig::default()
        };
        let gate = CallGate::new(runtime, config).with_monitoring(Monitoring::disabled());
        let thread = MockThread::new();
        let method = NativeMethodDescriptor::new("Cache", "lookup", "L", Tier::Fast);
        thread.set_executing(method.clone());

        gate.tracer().on_enter(Some(&method), 1);
        let cookie = gate.method_fast_start(&thread);
        let handle = thread.add_local("entry");
        let result = gate.method_fast_end_with_reference(handle, cookie, &thread);

        assert_eq!(result.as_deref().map(String::as_str), Some("entry"));
        assert!(!gate.tracer().is_active());
    }
}
