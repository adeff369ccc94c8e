//! Reference VM
//!
//! Bundles the heap, monitors, method registry and mutator lock into a
//! `Runtime` the call gate can drive, plus the handful of JNI-style services
//! native code calls back into.

use crate::exception::ExceptionRef;
use crate::heap::{Heap, HeapOptions};
use crate::methods::MethodRegistry;
use crate::monitor::MonitorTable;
use crate::mutator::{MutatorLock, PauseReason};
use crate::object::ObjRef;
use crate::thread::{ManagedThread, ThreadRegistry};
use callgate::{CallGate, Collector, GateConfig, MethodResolver, Monitors, Runtime};
use std::sync::Arc;

/// VM construction options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VmOptions {
    /// Collector options
    pub heap: HeapOptions,
}

/// Reference managed runtime
#[derive(Debug)]
pub struct Vm {
    options: VmOptions,
    heap: Arc<Heap>,
    monitors: MonitorTable,
    methods: MethodRegistry,
    mutator: Arc<MutatorLock>,
    threads: Arc<ThreadRegistry>,
}

impl Vm {
    /// Create a VM
    pub fn new(options: VmOptions) -> Arc<Self> {
        let heap = Arc::new(Heap::new(options.heap));
        Arc::new(Self {
            options,
            methods: MethodRegistry::new(heap.clone()),
            heap,
            monitors: MonitorTable::new(),
            mutator: Arc::new(MutatorLock::new()),
            threads: Arc::new(ThreadRegistry::new()),
        })
    }

    /// Call gate over this VM
    pub fn gate(self: &Arc<Self>, config: GateConfig) -> CallGate<Vm> {
        CallGate::new(self.clone(), config)
    }

    /// Construction options
    pub fn options(&self) -> VmOptions {
        self.options
    }

    /// Managed heap
    pub fn heap(&self) -> &Arc<Heap> {
        &self.heap
    }

    /// Native method registry
    pub fn methods(&self) -> &MethodRegistry {
        &self.methods
    }

    /// Monitor subsystem
    pub fn monitor_table(&self) -> &MonitorTable {
        &self.monitors
    }

    /// Mutator lock
    pub fn mutator(&self) -> &Arc<MutatorLock> {
        &self.mutator
    }

    /// Attached threads
    pub fn threads(&self) -> &Arc<ThreadRegistry> {
        &self.threads
    }

    /// Attach the calling OS thread
    pub fn attach_thread(&self, name: &str) -> ManagedThread {
        ManagedThread::attach(name, self.mutator.clone(), self.threads.clone())
    }

    /// Stop every Managed thread and run `body`.
    ///
    /// Threads in Native state keep running; they cannot touch the heap
    /// until they transition back, which blocks until `body` returns. Must
    /// not be called from a thread holding a mutator claim.
    pub fn request_pause<R>(&self, reason: PauseReason, body: impl FnOnce() -> R) -> R {
        tracing::debug!(target: "callgate_runtime::vm", ?reason, threads = self.threads.len(), "pause requested");
        self.mutator.pause(
            reason,
            || self.threads.request_suspend_all(true),
            || self.threads.request_suspend_all(false),
            body,
        )
    }

    /// `MonitorEnter` issued by native code
    pub fn jni_monitor_enter(&self, thread: &ManagedThread, object: &ObjRef) {
        self.monitors.enter(thread, object);
        thread.note_native_monitor_enter(object.clone());
    }

    /// `MonitorExit` issued by native code
    pub fn jni_monitor_exit(
        &self,
        thread: &ManagedThread,
        object: &ObjRef,
    ) -> Result<(), ExceptionRef> {
        self.monitors.exit(thread, object)?;
        thread.note_native_monitor_exit(object);
        Ok(())
    }
}

impl Runtime for Vm {
    type Thread = ManagedThread;

    fn collector(&self) -> &dyn Collector<ObjRef> {
        self.heap.as_ref()
    }

    fn monitors(&self) -> &dyn Monitors<ManagedThread> {
        &self.monitors
    }

    fn resolver(&self) -> &dyn MethodResolver<ManagedThread> {
        &self.methods
    }
}
