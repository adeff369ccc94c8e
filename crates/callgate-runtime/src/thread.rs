//! Managed threads
//!
//! A `ManagedThread` is the per-OS-thread context the call boundary runs
//! against. It is owned by the thread it describes. The parts other threads
//! need to see (state and suspend request) live in a shared `ThreadControl`
//! registered with the VM.

use crate::exception::ExceptionRef;
use crate::mutator::MutatorLock;
use crate::object::ObjRef;
use crate::reference_table::LocalRefTable;
use callgate::{CallThread, EnvHandle, NativeMethodDescriptor, RawHandle, SegmentCookie, ThreadState};
use crossbeam::atomic::AtomicCell;
use dashmap::DashMap;
use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier for an attached thread
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(u64);

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

impl ThreadId {
    /// Generate a new unique ThreadId
    pub fn new() -> Self {
        ThreadId(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Create from raw u64 value
    pub fn from_u64(id: u64) -> Self {
        ThreadId(id)
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

/// Cross-thread view of an attached thread
#[derive(Debug)]
pub struct ThreadControl {
    name: String,
    state: AtomicCell<ThreadState>,
    suspend_requested: AtomicBool,
}

impl ThreadControl {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: AtomicCell::new(ThreadState::Native),
            suspend_requested: AtomicBool::new(false),
        }
    }

    /// Thread name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current execution state
    pub fn state(&self) -> ThreadState {
        self.state.load()
    }

    /// Whether a suspend has been requested
    #[inline]
    pub fn is_suspend_requested(&self) -> bool {
        self.suspend_requested.load(Ordering::Acquire)
    }

    pub(crate) fn set_suspend_requested(&self, requested: bool) {
        self.suspend_requested.store(requested, Ordering::Release);
    }
}

/// Registry of attached threads
#[derive(Debug, Default)]
pub struct ThreadRegistry {
    threads: DashMap<ThreadId, Arc<ThreadControl>>,
}

impl ThreadRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, id: ThreadId, control: Arc<ThreadControl>) {
        self.threads.insert(id, control);
    }

    fn unregister(&self, id: ThreadId) {
        self.threads.remove(&id);
    }

    /// Look up a thread's control block
    pub fn get(&self, id: ThreadId) -> Option<Arc<ThreadControl>> {
        self.threads.get(&id).map(|entry| entry.value().clone())
    }

    /// Number of attached threads
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    /// Whether no threads are attached
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Number of attached threads currently in `state`
    pub fn count_in_state(&self, state: ThreadState) -> usize {
        self.threads
            .iter()
            .filter(|entry| entry.value().state() == state)
            .count()
    }

    pub(crate) fn request_suspend_all(&self, requested: bool) {
        for entry in self.threads.iter() {
            entry.value().set_suspend_requested(requested);
        }
    }
}

/// Managed stack frame of a native method
#[derive(Debug, Clone)]
struct Frame {
    method: Arc<NativeMethodDescriptor>,
    receiver: Option<ObjRef>,
}

/// Per-thread context of an attached thread
pub struct ManagedThread {
    id: ThreadId,
    control: Arc<ThreadControl>,
    mutator: Arc<MutatorLock>,
    registry: Arc<ThreadRegistry>,
    holds_share: Cell<bool>,
    exception: RefCell<Option<ExceptionRef>>,
    locals: RefCell<LocalRefTable>,
    local_ref_cookie: Cell<SegmentCookie>,
    handles: RefCell<Vec<ObjRef>>,
    native_monitors: RefCell<Vec<ObjRef>>,
    frames: RefCell<Vec<Frame>>,
}

impl ManagedThread {
    /// Attach the calling OS thread. Starts in Managed state.
    pub(crate) fn attach(
        name: &str,
        mutator: Arc<MutatorLock>,
        registry: Arc<ThreadRegistry>,
    ) -> Self {
        let id = ThreadId::new();
        let control = Arc::new(ThreadControl::new(name));
        registry.register(id, control.clone());
        let thread = Self {
            id,
            control,
            mutator,
            registry,
            holds_share: Cell::new(false),
            exception: RefCell::new(None),
            locals: RefCell::new(LocalRefTable::new()),
            local_ref_cookie: Cell::new(SegmentCookie::BOTTOM),
            handles: RefCell::new(Vec::new()),
            native_monitors: RefCell::new(Vec::new()),
            frames: RefCell::new(Vec::new()),
        };
        thread.acquire_share();
        thread.control.state.store(ThreadState::Managed);
        tracing::debug!(target: "callgate_runtime::thread", id = id.as_u64(), name, "thread attached");
        thread
    }

    /// Thread ID
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Thread name
    pub fn name(&self) -> &str {
        self.control.name()
    }

    /// Shared control block
    pub fn control(&self) -> &Arc<ThreadControl> {
        &self.control
    }

    /// Add a local reference in the current scope
    pub fn add_local(&self, object: ObjRef) -> RawHandle {
        self.locals.borrow_mut().add(object)
    }

    /// Number of live local references
    pub fn local_count(&self) -> usize {
        self.locals.borrow().len()
    }

    /// Number of objects protected in the handle scope
    pub fn handle_depth(&self) -> usize {
        self.handles.borrow().len()
    }

    /// Enter a native method's frame
    pub fn push_frame(&self, method: Arc<NativeMethodDescriptor>, receiver: Option<ObjRef>) {
        self.frames.borrow_mut().push(Frame { method, receiver });
    }

    /// Leave the innermost native method's frame
    pub fn pop_frame(&self) {
        self.frames.borrow_mut().pop();
    }

    /// Receiver of the innermost frame
    pub fn current_receiver(&self) -> Option<ObjRef> {
        self.frames
            .borrow()
            .last()
            .and_then(|frame| frame.receiver.clone())
    }

    /// Objects reachable from this thread (locals, handles, receivers)
    pub fn roots(&self) -> Vec<ObjRef> {
        let mut roots: Vec<ObjRef> = self.locals.borrow().iter().cloned().collect();
        roots.extend(self.handles.borrow().iter().cloned());
        roots.extend(
            self.frames
                .borrow()
                .iter()
                .filter_map(|frame| frame.receiver.clone()),
        );
        roots
    }

    /// Run `f` without a shared mutator claim, so a pause can proceed while
    /// this thread waits.
    pub fn blocking<R>(&self, f: impl FnOnce() -> R) -> R {
        if !self.holds_share.get() {
            return f();
        }
        self.release_share();
        let result = f();
        self.acquire_share();
        result
    }

    pub(crate) fn note_native_monitor_enter(&self, object: ObjRef) {
        self.native_monitors.borrow_mut().push(object);
    }

    pub(crate) fn note_native_monitor_exit(&self, object: &ObjRef) {
        let mut held = self.native_monitors.borrow_mut();
        let same_monitor = |o: &ObjRef| std::ptr::eq(o.monitor(), object.monitor());
        if let Some(pos) = held.iter().rposition(|o| same_monitor(o)) {
            held.remove(pos);
        }
    }

    /// Take a shared claim, stepping aside for any pause already requested
    fn acquire_share(&self) {
        debug_assert!(!self.holds_share.get());
        loop {
            self.mutator.acquire_shared();
            if !self.control.is_suspend_requested() {
                break;
            }
            // Requested but the requester has not started waiting yet.
            self.mutator.release_shared();
            std::thread::yield_now();
        }
        self.holds_share.set(true);
    }

    fn release_share(&self) {
        debug_assert!(self.holds_share.get());
        self.holds_share.set(false);
        self.mutator.release_shared();
    }
}

impl CallThread for ManagedThread {
    type Object = ObjRef;
    type Exception = ExceptionRef;

    fn state(&self) -> ThreadState {
        self.control.state()
    }

    fn transition_to_native(&self) {
        self.control.state.store(ThreadState::Native);
        self.release_share();
    }

    fn transition_to_managed(&self) {
        self.acquire_share();
        self.control.state.store(ThreadState::Managed);
    }

    #[inline]
    fn is_suspend_requested(&self) -> bool {
        self.control.is_suspend_requested()
    }

    fn check_suspend(&self) {
        if !self.control.is_suspend_requested() || !self.holds_share.get() {
            return;
        }
        tracing::trace!(target: "callgate_runtime::thread", id = self.id.as_u64(), "suspend check");
        self.mutator.stats().record_suspend_check();
        self.release_share();
        self.acquire_share();
    }

    fn holds_mutator_share(&self) -> bool {
        self.holds_share.get()
    }

    fn is_exception_pending(&self) -> bool {
        self.exception.borrow().is_some()
    }

    fn exception(&self) -> Option<ExceptionRef> {
        self.exception.borrow().clone()
    }

    fn take_exception(&self) -> Option<ExceptionRef> {
        self.exception.borrow_mut().take()
    }

    fn set_exception(&self, exception: ExceptionRef) {
        *self.exception.borrow_mut() = Some(exception);
    }

    fn local_ref_cookie(&self) -> SegmentCookie {
        self.local_ref_cookie.get()
    }

    fn set_local_ref_cookie(&self, cookie: SegmentCookie) {
        self.local_ref_cookie.set(cookie);
    }

    fn locals_segment_state(&self) -> SegmentCookie {
        self.locals.borrow().segment_state()
    }

    fn set_locals_segment_state(&self, state: SegmentCookie) {
        self.locals.borrow_mut().set_segment_state(state);
    }

    fn decode_handle(&self, handle: RawHandle) -> Option<ObjRef> {
        self.locals.borrow().get(handle)
    }

    fn held_native_monitors(&self) -> usize {
        self.native_monitors.borrow().len()
    }

    fn push_handle(&self, object: ObjRef) {
        self.handles.borrow_mut().push(object);
    }

    fn pop_handle(&self) -> Option<ObjRef> {
        self.handles.borrow_mut().pop()
    }

    fn env(&self) -> EnvHandle {
        EnvHandle(self.id.as_u64())
    }

    fn executing_method(&self) -> Option<Arc<NativeMethodDescriptor>> {
        self.frames.borrow().last().map(|frame| frame.method.clone())
    }
}

impl Drop for ManagedThread {
    fn drop(&mut self) {
        if self.holds_share.get() {
            self.release_share();
        }
        self.control.state.store(ThreadState::Native);
        self.registry.unregister(self.id);
        tracing::debug!(target: "callgate_runtime::thread", id = self.id.as_u64(), "thread detached");
    }
}

impl std::fmt::Debug for ManagedThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedThread")
            .field("id", &self.id)
            .field("name", &self.control.name())
            .field("state", &self.control.state())
            .finish()
    }
}
