//! Native method registry

use crate::heap::Heap;
use crate::object::ObjRef;
use crate::thread::ManagedThread;
use callgate::{fatal, BoundaryError, MethodResolver, NativeMethodDescriptor};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Registered native methods and their metadata services
#[derive(Debug)]
pub struct MethodRegistry {
    heap: Arc<Heap>,
    methods: DashMap<String, Arc<NativeMethodDescriptor>>,
    /// Declaring-class roots as captured at registration; may go stale
    declaring_classes: DashMap<String, ObjRef>,
    checked_results: AtomicUsize,
}

impl MethodRegistry {
    /// Create a registry resolving class objects through `heap`
    pub fn new(heap: Arc<Heap>) -> Self {
        Self {
            heap,
            methods: DashMap::new(),
            declaring_classes: DashMap::new(),
            checked_results: AtomicUsize::new(0),
        }
    }

    /// Register a method under its pretty name
    pub fn register(&self, method: NativeMethodDescriptor) -> Arc<NativeMethodDescriptor> {
        let method = Arc::new(method);
        let class = self.heap.class_object(&method.declaring_class);
        self.declaring_classes.insert(method.pretty_name(), class);
        self.methods.insert(method.pretty_name(), method.clone());
        method
    }

    /// Declaring-class root recorded for `method`. A moving collection can
    /// leave it pointing at an old copy until a read barrier refreshes it.
    pub fn declaring_class_root(&self, method: &NativeMethodDescriptor) -> Option<ObjRef> {
        self.declaring_classes
            .get(&method.pretty_name())
            .map(|c| c.value().clone())
    }

    /// Look up a method by `Class.name`
    pub fn lookup(&self, pretty_name: &str) -> Option<Arc<NativeMethodDescriptor>> {
        self.methods.get(pretty_name).map(|m| m.value().clone())
    }

    /// Number of registered methods
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Whether no methods are registered
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Reference results verified so far
    pub fn checked_results(&self) -> usize {
        self.checked_results.load(Ordering::Relaxed)
    }
}

impl MethodResolver<ManagedThread> for MethodRegistry {
    fn synchronization_target(
        &self,
        thread: &ManagedThread,
        method: &NativeMethodDescriptor,
    ) -> Option<ObjRef> {
        if method.is_static {
            Some(self.heap.class_object(&method.declaring_class))
        } else {
            thread.current_receiver()
        }
    }

    fn check_reference_result(
        &self,
        _thread: &ManagedThread,
        method: &NativeMethodDescriptor,
        result: Option<&ObjRef>,
    ) {
        self.checked_results.fetch_add(1, Ordering::Relaxed);
        let Some(object) = result else {
            return;
        };
        if !object.is_alive() {
            fatal(BoundaryError::InvalidReferenceResult {
                method: method.pretty_name(),
                reason: format!("returned freed object {:?}", object),
            });
        }
        if let Some(expected) = &method.return_class {
            if object.class_name() != expected {
                fatal(BoundaryError::InvalidReferenceResult {
                    method: method.pretty_name(),
                    reason: format!(
                        "returned {} but declares {}",
                        object.class_name(),
                        expected
                    ),
                });
            }
        }
    }
}
