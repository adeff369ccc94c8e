//! Calling thread context
//!
//! The boundary never reaches for ambient per-thread state. Every operation
//! receives the calling thread's `CallThread` explicitly and mutates it only
//! through these accessors.

use crate::method::NativeMethodDescriptor;
use std::fmt;
use std::sync::Arc;

/// Execution state relevant to the call boundary
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ThreadState {
    /// Running managed code; holds a shared claim on the mutator lock
    Managed,
    /// Running native code; no claim, never paused by the collector
    Native,
}

/// Opaque position in a thread's local reference stack
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct SegmentCookie(u32);

impl SegmentCookie {
    /// Cookie for the bottom of an empty table
    pub const BOTTOM: SegmentCookie = SegmentCookie(0);

    /// Wrap a raw segment position
    #[inline]
    pub const fn new(raw: u32) -> Self {
        SegmentCookie(raw)
    }

    /// Raw segment position
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

/// Raw local reference handle as native code sees it (0 is null)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct RawHandle(u64);

impl RawHandle {
    /// The null handle
    pub const NULL: RawHandle = RawHandle(0);

    /// Wrap raw handle bits
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        RawHandle(bits)
    }

    /// Raw handle bits
    #[inline]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Whether this is the null handle
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Environment handle passed to invocation observers
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct EnvHandle(pub u64);

/// Per-thread execution context consumed by the boundary.
///
/// Implementations own their state behind interior mutability: a thread
/// only ever mutates its own context, but collectors and tests read it from
/// other threads.
pub trait CallThread {
    /// Managed object reference
    type Object: Clone + fmt::Debug;
    /// Pending exception object; `Display` renders its diagnostic dump
    type Exception: Clone + fmt::Display;

    /// Current execution state
    fn state(&self) -> ThreadState;

    /// Release the shared mutator hold and enter Native state
    fn transition_to_native(&self);

    /// Reacquire the shared mutator hold (may block on a pending pause) and
    /// enter Managed state
    fn transition_to_managed(&self);

    /// Whether a global safepoint has been requested of this thread
    fn is_suspend_requested(&self) -> bool;

    /// Honor a pending safepoint request, blocking until it is released
    fn check_suspend(&self);

    /// Whether this thread currently holds a shared mutator claim
    fn holds_mutator_share(&self) -> bool;

    /// Whether an exception is pending
    fn is_exception_pending(&self) -> bool;

    /// Pending exception, left in place
    fn exception(&self) -> Option<Self::Exception>;

    /// Detach and return the pending exception, clearing the slot
    fn take_exception(&self) -> Option<Self::Exception>;

    /// Set the pending exception
    fn set_exception(&self, exception: Self::Exception);

    /// Base of the current local reference scope
    fn local_ref_cookie(&self) -> SegmentCookie;

    /// Replace the base of the current local reference scope
    fn set_local_ref_cookie(&self, cookie: SegmentCookie);

    /// Current top of the local reference segment
    fn locals_segment_state(&self) -> SegmentCookie;

    /// Move the top of the local reference segment, dropping entries above it
    fn set_locals_segment_state(&self, state: SegmentCookie);

    /// Decode a raw handle through the thread's reference table
    fn decode_handle(&self, handle: RawHandle) -> Option<Self::Object>;

    /// Monitors entered by native code and not yet exited
    fn held_native_monitors(&self) -> usize;

    /// Protect an object in the thread's handle scope
    fn push_handle(&self, object: Self::Object);

    /// Remove the innermost protected object, returning its current value
    fn pop_handle(&self) -> Option<Self::Object>;

    /// Environment handle for observers
    fn env(&self) -> EnvHandle;

    /// Native method on top of the managed stack, if known
    fn executing_method(&self) -> Option<Arc<NativeMethodDescriptor>>;
}

/// Keeps an optional object protected in the thread's handle scope while
/// alive and writes back its current value on drop.
pub struct HandleWrapper<'a, T: CallThread> {
    thread: &'a T,
    slot: &'a mut Option<T::Object>,
}

impl<'a, T: CallThread> HandleWrapper<'a, T> {
    /// Protect the object in `slot`, if any
    pub fn new(thread: &'a T, slot: &'a mut Option<T::Object>) -> Self {
        if let Some(object) = slot.as_ref() {
            thread.push_handle(object.clone());
        }
        Self { thread, slot }
    }

    /// The protected object
    pub fn get(&self) -> Option<&T::Object> {
        self.slot.as_ref()
    }
}

impl<T: CallThread> Drop for HandleWrapper<'_, T> {
    fn drop(&mut self) {
        if self.slot.is_some() {
            if let Some(current) = self.thread.pop_handle() {
                *self.slot = Some(current);
            }
        }
    }
}
