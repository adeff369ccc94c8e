//! Heap with a moving, read-barrier collector model
//!
//! Objects are never actually freed from under a live `ObjRef`; the heap
//! tracks which ones it still considers allocated and lets tests move
//! objects (leaving a forwarding pointer) and mark them, which is all the
//! declaring-class barrier and checked-mode verification observe.

use crate::object::{ObjRef, ObjectId};
use callgate::Collector;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Collector options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapOptions {
    /// Reads of roots go through a read barrier
    pub read_barrier: bool,
    /// A set mark bit proves the referent is current
    pub mark_bit_fast_path: bool,
}

impl Default for HeapOptions {
    fn default() -> Self {
        Self {
            read_barrier: true,
            mark_bit_fast_path: true,
        }
    }
}

/// Managed heap
#[derive(Debug, Default)]
pub struct Heap {
    options: HeapOptions,
    objects: DashMap<ObjectId, ObjRef>,
    classes: DashMap<String, ObjRef>,
    barrier_calls: AtomicUsize,
}

impl Heap {
    /// Create an empty heap
    pub fn new(options: HeapOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Collector options
    pub fn options(&self) -> HeapOptions {
        self.options
    }

    /// Allocate an instance of `class_name`
    pub fn alloc_object(&self, class_name: &str) -> ObjRef {
        let object = ObjRef::new_object(class_name);
        self.objects.insert(object.id(), object.clone());
        object
    }

    /// Class object for `class_name`, created on first use
    pub fn class_object(&self, class_name: &str) -> ObjRef {
        self.classes
            .entry(class_name.to_string())
            .or_insert_with(|| {
                let class = ObjRef::new_class(class_name);
                self.objects.insert(class.id(), class.clone());
                class
            })
            .value()
            .clone()
    }

    /// Move an object, leaving a forwarding pointer in the old copy.
    ///
    /// The monitor moves with the object: a lock taken through the old
    /// copy is released through the new one.
    pub fn relocate(&self, object: &ObjRef) -> ObjRef {
        let moved = object.moved_copy();
        object.set_forwarded(moved.clone());
        self.objects.remove(&object.id());
        self.objects.insert(moved.id(), moved.clone());
        if object.is_class() {
            self.classes
                .insert(object.class_name().to_string(), moved.clone());
        }
        tracing::trace!(target: "callgate_runtime::heap", from = ?object, to = ?moved, "object relocated");
        moved
    }

    /// Reclaim an object
    pub fn free(&self, object: &ObjRef) {
        object.kill();
        self.objects.remove(&object.id());
    }

    /// Set an object's mark bit
    pub fn mark(&self, object: &ObjRef) {
        object.set_marked(true);
    }

    /// Clear every mark bit
    pub fn clear_marks(&self) {
        for entry in self.objects.iter() {
            entry.value().set_marked(false);
        }
    }

    /// Number of allocated objects
    pub fn live_count(&self) -> usize {
        self.objects.len()
    }

    /// Number of slow-path root barriers taken
    pub fn barrier_calls(&self) -> usize {
        self.barrier_calls.load(Ordering::Relaxed)
    }
}

impl Collector<ObjRef> for Heap {
    fn uses_read_barrier(&self) -> bool {
        self.options.read_barrier
    }

    fn uses_mark_bit_fast_path(&self) -> bool {
        self.options.mark_bit_fast_path
    }

    #[inline]
    fn is_marked(&self, object: &ObjRef) -> bool {
        object.is_marked()
    }

    fn barrier_for_root(&self, root: &ObjRef) -> ObjRef {
        self.barrier_calls.fetch_add(1, Ordering::Relaxed);
        let mut current = root.clone();
        while let Some(next) = current.forwarded() {
            current = next;
        }
        current
    }
}
