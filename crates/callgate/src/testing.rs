//! In-crate test doubles for the collaborator traits

use crate::hook::InvocationObserver;
use crate::interfaces::{Collector, MethodResolver, Monitors, Runtime};
use crate::method::NativeMethodDescriptor;
use crate::thread::{CallThread, EnvHandle, RawHandle, SegmentCookie, ThreadState};
use parking_lot::Mutex;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub type Obj = Arc<String>;
pub type Exc = Arc<String>;
pub type Log = Arc<Mutex<Vec<String>>>;

pub fn obj(name: &str) -> Obj {
    Arc::new(name.to_string())
}

pub fn exc(text: &str) -> Exc {
    Arc::new(text.to_string())
}

pub struct MockThread {
    state: Cell<ThreadState>,
    share: Cell<bool>,
    suspend_requested: Cell<bool>,
    exception: RefCell<Option<Exc>>,
    locals: RefCell<Vec<Obj>>,
    cookie: Cell<SegmentCookie>,
    handles: RefCell<Vec<Obj>>,
    native_monitors: Cell<usize>,
    executing: RefCell<Option<Arc<NativeMethodDescriptor>>>,
    decodes: Cell<usize>,
    log: Log,
}

impl MockThread {
    pub fn new() -> Self {
        Self {
            state: Cell::new(ThreadState::Managed),
            share: Cell::new(true),
            suspend_requested: Cell::new(false),
            exception: RefCell::new(None),
            locals: RefCell::new(Vec::new()),
            cookie: Cell::new(SegmentCookie::BOTTOM),
            handles: RefCell::new(Vec::new()),
            native_monitors: Cell::new(0),
            executing: RefCell::new(None),
            decodes: Cell::new(0),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn add_local(&self, name: &str) -> RawHandle {
        let mut locals = self.locals.borrow_mut();
        locals.push(obj(name));
        RawHandle::from_bits(locals.len() as u64)
    }

    pub fn local_count(&self) -> usize {
        self.locals.borrow().len()
    }

    pub fn handle_depth(&self) -> usize {
        self.handles.borrow().len()
    }

    pub fn decode_count(&self) -> usize {
        self.decodes.get()
    }

    pub fn request_suspend(&self) {
        self.suspend_requested.set(true);
    }

    pub fn set_executing(&self, method: NativeMethodDescriptor) {
        *self.executing.borrow_mut() = Some(Arc::new(method));
    }

    pub fn record(&self, event: String) {
        self.log.lock().push(event);
    }

    pub fn log(&self) -> Log {
        self.log.clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

impl CallThread for MockThread {
    type Object = Obj;
    type Exception = Exc;

    fn state(&self) -> ThreadState {
        self.state.get()
    }

    fn transition_to_native(&self) {
        self.share.set(false);
        self.state.set(ThreadState::Native);
        self.record("to_native".to_string());
    }

    fn transition_to_managed(&self) {
        self.share.set(true);
        self.state.set(ThreadState::Managed);
        self.record("to_managed".to_string());
    }

    fn is_suspend_requested(&self) -> bool {
        self.suspend_requested.get()
    }

    fn check_suspend(&self) {
        self.suspend_requested.set(false);
        self.record("check_suspend".to_string());
    }

    fn holds_mutator_share(&self) -> bool {
        self.share.get()
    }

    fn is_exception_pending(&self) -> bool {
        self.exception.borrow().is_some()
    }

    fn exception(&self) -> Option<Exc> {
        self.exception.borrow().clone()
    }

    fn take_exception(&self) -> Option<Exc> {
        self.exception.borrow_mut().take()
    }

    fn set_exception(&self, exception: Exc) {
        *self.exception.borrow_mut() = Some(exception);
    }

    fn local_ref_cookie(&self) -> SegmentCookie {
        self.cookie.get()
    }

    fn set_local_ref_cookie(&self, cookie: SegmentCookie) {
        self.cookie.set(cookie);
    }

    fn locals_segment_state(&self) -> SegmentCookie {
        SegmentCookie::new(self.locals.borrow().len() as u32)
    }

    fn set_locals_segment_state(&self, state: SegmentCookie) {
        self.locals.borrow_mut().truncate(state.as_u32() as usize);
    }

    fn decode_handle(&self, handle: RawHandle) -> Option<Obj> {
        self.decodes.set(self.decodes.get() + 1);
        let index = (handle.bits() as usize).checked_sub(1)?;
        self.locals.borrow().get(index).cloned()
    }

    fn held_native_monitors(&self) -> usize {
        self.native_monitors.get()
    }

    fn push_handle(&self, object: Obj) {
        self.handles.borrow_mut().push(object);
    }

    fn pop_handle(&self) -> Option<Obj> {
        self.handles.borrow_mut().pop()
    }

    fn env(&self) -> EnvHandle {
        EnvHandle(1)
    }

    fn executing_method(&self) -> Option<Arc<NativeMethodDescriptor>> {
        self.executing.borrow().clone()
    }
}

pub struct MockCollector {
    fast_path: bool,
    marked: Mutex<HashSet<usize>>,
    forwarding: Mutex<HashMap<usize, Obj>>,
    barrier_calls: AtomicUsize,
}

impl MockCollector {
    pub fn new(fast_path: bool) -> Self {
        Self {
            fast_path,
            marked: Mutex::new(HashSet::new()),
            forwarding: Mutex::new(HashMap::new()),
            barrier_calls: AtomicUsize::new(0),
        }
    }

    pub fn mark(&self, object: &Obj) {
        self.marked.lock().insert(Arc::as_ptr(object) as usize);
    }

    pub fn forward(&self, from: &Obj, to: &Obj) {
        self.forwarding
            .lock()
            .insert(Arc::as_ptr(from) as usize, to.clone());
    }

    pub fn barrier_calls(&self) -> usize {
        self.barrier_calls.load(Ordering::SeqCst)
    }
}

impl Collector<Obj> for MockCollector {
    fn uses_read_barrier(&self) -> bool {
        true
    }

    fn uses_mark_bit_fast_path(&self) -> bool {
        self.fast_path
    }

    fn is_marked(&self, object: &Obj) -> bool {
        self.marked.lock().contains(&(Arc::as_ptr(object) as usize))
    }

    fn barrier_for_root(&self, root: &Obj) -> Obj {
        self.barrier_calls.fetch_add(1, Ordering::SeqCst);
        self.forwarding
            .lock()
            .get(&(Arc::as_ptr(root) as usize))
            .cloned()
            .unwrap_or_else(|| root.clone())
    }
}

#[derive(Default)]
pub struct MockMonitors {
    fail_enter: Mutex<Option<Exc>>,
    fail_exit: Mutex<Option<Exc>>,
    pending_on_exit: Mutex<Option<bool>>,
}

impl MockMonitors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_enter_with(&self, exception: Exc) {
        *self.fail_enter.lock() = Some(exception);
    }

    pub fn fail_exit_with(&self, exception: Exc) {
        *self.fail_exit.lock() = Some(exception);
    }

    pub fn pending_seen_on_exit(&self) -> Option<bool> {
        *self.pending_on_exit.lock()
    }
}

impl Monitors<MockThread> for MockMonitors {
    fn monitor_enter(&self, thread: &MockThread, object: &Obj) -> Result<(), Exc> {
        if let Some(exception) = self.fail_enter.lock().take() {
            return Err(exception);
        }
        thread.record(format!("enter:{}", object));
        Ok(())
    }

    fn monitor_exit(&self, thread: &MockThread, object: &Obj) -> Result<(), Exc> {
        *self.pending_on_exit.lock() = Some(thread.is_exception_pending());
        thread.record(format!("exit:{}", object));
        match self.fail_exit.lock().take() {
            Some(exception) => Err(exception),
            None => Ok(()),
        }
    }
}

pub struct MockResolver {
    class: Obj,
    checked: Mutex<Vec<Option<String>>>,
}

impl MethodResolver<MockThread> for MockResolver {
    fn synchronization_target(
        &self,
        _thread: &MockThread,
        _method: &NativeMethodDescriptor,
    ) -> Option<Obj> {
        Some(self.class.clone())
    }

    fn check_reference_result(
        &self,
        thread: &MockThread,
        _method: &NativeMethodDescriptor,
        result: Option<&Obj>,
    ) {
        assert_eq!(thread.handle_depth(), usize::from(result.is_some()));
        self.checked.lock().push(result.map(|o| o.to_string()));
    }
}

pub struct MockRuntime {
    collector: MockCollector,
    monitors: MockMonitors,
    resolver: MockResolver,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self {
            collector: MockCollector::new(true),
            monitors: MockMonitors::new(),
            resolver: MockResolver {
                class: obj("class"),
                checked: Mutex::new(Vec::new()),
            },
        }
    }

    pub fn checked_results(&self) -> Vec<Option<String>> {
        self.resolver.checked.lock().clone()
    }
}

impl Runtime for MockRuntime {
    type Thread = MockThread;

    fn collector(&self) -> &dyn Collector<Obj> {
        &self.collector
    }

    fn monitors(&self) -> &dyn Monitors<MockThread> {
        &self.monitors
    }

    fn resolver(&self) -> &dyn MethodResolver<MockThread> {
        &self.resolver
    }
}

pub struct RecordingObserver {
    report: bool,
    queries: AtomicUsize,
    events: Mutex<Vec<String>>,
    shared: Mutex<Option<Log>>,
}

impl RecordingObserver {
    pub fn new(report: bool) -> Self {
        Self {
            report,
            queries: AtomicUsize::new(0),
            events: Mutex::new(Vec::new()),
            shared: Mutex::new(None),
        }
    }

    pub fn share_log(&self, log: Log) {
        *self.shared.lock() = Some(log);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn push(&self, event: String) {
        if let Some(log) = self.shared.lock().as_ref() {
            log.lock().push(event.clone());
        }
        self.events.lock().push(event);
    }
}

impl InvocationObserver for RecordingObserver {
    fn should_report(&self) -> bool {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.report
    }

    fn notify_begin(&self, env: EnvHandle) {
        self.push(format!("begin:{}", env.0));
    }

    fn notify_end(&self, env: EnvHandle) {
        self.push(format!("end:{}", env.0));
    }
}
