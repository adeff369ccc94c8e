//! Generic call stub
//!
//! Drives a native method through the gate the way a compiled stub does:
//! push the managed frame, refresh the declaring class of a static method,
//! run the entry sequence, call the native body, run the exit sequence.

use crate::exception::ExceptionRef;
use crate::object::ObjRef;
use crate::thread::ManagedThread;
use crate::vm::Vm;
use callgate::{
    CallGate, CallThread, Collector, MarshaledResult, NativeMethodDescriptor, RawHandle, RawResult,
};
use std::sync::Arc;

/// What native code can reach while it runs
pub struct NativeEnv<'a> {
    vm: &'a Vm,
    thread: &'a ManagedThread,
    declaring_class: Option<ObjRef>,
}

impl<'a> NativeEnv<'a> {
    /// Calling thread
    pub fn thread(&self) -> &'a ManagedThread {
        self.thread
    }

    /// Owning VM
    pub fn vm(&self) -> &'a Vm {
        self.vm
    }

    /// Declaring class as refreshed before entry (static methods only)
    pub fn declaring_class(&self) -> Option<&ObjRef> {
        self.declaring_class.as_ref()
    }

    /// Receiver of an instance method
    pub fn receiver(&self) -> Option<ObjRef> {
        self.thread.current_receiver()
    }

    /// `NewObject`: allocate and return a local reference
    pub fn new_object(&self, class_name: &str) -> RawHandle {
        let object = self.vm.heap().alloc_object(class_name);
        self.thread.add_local(object)
    }

    /// `NewLocalRef`
    pub fn new_local(&self, object: ObjRef) -> RawHandle {
        self.thread.add_local(object)
    }

    /// `Throw`
    pub fn throw(&self, exception: ExceptionRef) {
        self.thread.set_exception(exception);
    }

    /// `MonitorEnter`
    pub fn monitor_enter(&self, object: &ObjRef) {
        self.vm.jni_monitor_enter(self.thread, object);
    }

    /// `MonitorExit`; a failure is left pending on the thread
    pub fn monitor_exit(&self, object: &ObjRef) {
        if let Err(exception) = self.vm.jni_monitor_exit(self.thread, object) {
            self.thread.set_exception(exception);
        }
    }
}

/// Invoke `method` with `body` as its native implementation
pub fn invoke<F>(
    gate: &CallGate<Vm>,
    thread: &ManagedThread,
    method: &Arc<NativeMethodDescriptor>,
    receiver: Option<ObjRef>,
    body: F,
) -> MarshaledResult<ObjRef>
where
    F: FnOnce(&NativeEnv<'_>) -> RawResult,
{
    let vm = gate.runtime().as_ref();
    thread.push_frame(method.clone(), receiver);

    let declaring_class = if method.is_static {
        let mut class = vm
            .methods()
            .declaring_class_root(method)
            .unwrap_or_else(|| vm.heap().class_object(&method.declaring_class));
        if vm.heap().uses_read_barrier() {
            gate.read_barrier_declaring_class(&mut class);
        }
        Some(class)
    } else {
        None
    };

    let cookie = gate.generic_method_start(thread, method);
    let env = NativeEnv {
        vm,
        thread,
        declaring_class,
    };
    let raw = body(&env);
    let result = gate.generic_method_end(thread, cookie, raw, method);

    thread.pop_frame();
    result
}
