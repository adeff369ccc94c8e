//! Heap objects
//!
//! Objects carry just enough state for the call boundary's collaborators:
//! a mark bit and forwarding slot for the collector, a liveness flag for
//! checked-mode verification, and a monitor that stays with the object
//! when it is moved.

use crate::monitor::ObjectMonitor;
use callgate::TransportBits;
use parking_lot::Mutex;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier for a heap object
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

impl ObjectId {
    /// Generate a new unique ObjectId
    pub fn new() -> Self {
        ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

/// A managed heap object
pub struct HeapObject {
    id: ObjectId,
    class_name: String,
    is_class: bool,
    marked: AtomicBool,
    alive: AtomicBool,
    forwarded: Mutex<Option<ObjRef>>,
    monitor: Arc<ObjectMonitor>,
}

impl HeapObject {
    /// Object ID
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Name of the object's class (for a class object, the class it names)
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Whether this object is a class object
    pub fn is_class(&self) -> bool {
        self.is_class
    }

    /// Mark bit
    #[inline]
    pub fn is_marked(&self) -> bool {
        self.marked.load(Ordering::Acquire)
    }

    /// Set or clear the mark bit
    pub fn set_marked(&self, marked: bool) {
        self.marked.store(marked, Ordering::Release);
    }

    /// Whether the object has not been freed
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn kill(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Copy this object was moved to, if any
    pub fn forwarded(&self) -> Option<ObjRef> {
        self.forwarded.lock().clone()
    }

    pub(crate) fn set_forwarded(&self, to: ObjRef) {
        *self.forwarded.lock() = Some(to);
    }

    /// Object monitor, shared by every copy of a moved object
    pub fn monitor(&self) -> &ObjectMonitor {
        &self.monitor
    }
}

/// Shared reference to a heap object
#[derive(Clone)]
pub struct ObjRef(Arc<HeapObject>);

impl ObjRef {
    /// Allocate a plain object
    pub(crate) fn new_object(class_name: &str) -> Self {
        Self::allocate(class_name, false)
    }

    /// Allocate a class object
    pub(crate) fn new_class(class_name: &str) -> Self {
        Self::allocate(class_name, true)
    }

    fn allocate(class_name: &str, is_class: bool) -> Self {
        Self::with_monitor(class_name, is_class, Arc::new(ObjectMonitor::new()))
    }

    fn with_monitor(class_name: &str, is_class: bool, monitor: Arc<ObjectMonitor>) -> Self {
        ObjRef(Arc::new(HeapObject {
            id: ObjectId::new(),
            class_name: class_name.to_string(),
            is_class,
            marked: AtomicBool::new(false),
            alive: AtomicBool::new(true),
            forwarded: Mutex::new(None),
            monitor,
        }))
    }

    /// Fresh copy of this object carrying the same monitor and mark bit
    pub(crate) fn moved_copy(&self) -> Self {
        let copy = Self::with_monitor(&self.class_name, self.is_class, Arc::clone(&self.monitor));
        copy.set_marked(self.is_marked());
        copy
    }

    /// Whether two references name the same object (not merely equal ids)
    pub fn ptr_eq(a: &ObjRef, b: &ObjRef) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl Deref for ObjRef {
    type Target = HeapObject;

    fn deref(&self) -> &HeapObject {
        &self.0
    }
}

impl PartialEq for ObjRef {
    fn eq(&self, other: &Self) -> bool {
        ObjRef::ptr_eq(self, other)
    }
}

impl Eq for ObjRef {}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_class {
            write!(f, "Class<{}>#{}", self.class_name, self.id.as_u64())
        } else {
            write!(f, "{}#{}", self.class_name, self.id.as_u64())
        }
    }
}

impl TransportBits for ObjRef {
    fn transport_bits(&self) -> u64 {
        Arc::as_ptr(&self.0) as usize as u64
    }
}
