//! Local reference table
//!
//! A thread's local references live in one growable segment. Scopes are
//! positions in that segment: truncating to a position invalidates every
//! reference created after it. Handles are 1-based indices so that 0 stays
//! the null handle.

use crate::object::ObjRef;
use callgate::{RawHandle, SegmentCookie};

/// Segment-stacked local reference storage
#[derive(Debug, Default)]
pub struct LocalRefTable {
    entries: Vec<ObjRef>,
}

impl LocalRefTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a local reference, returning its handle
    pub fn add(&mut self, object: ObjRef) -> RawHandle {
        self.entries.push(object);
        RawHandle::from_bits(self.entries.len() as u64)
    }

    /// Resolve a handle. Null handles and handles above the current top
    /// (already popped) resolve to nothing.
    pub fn get(&self, handle: RawHandle) -> Option<ObjRef> {
        let index = (handle.bits() as usize).checked_sub(1)?;
        self.entries.get(index).cloned()
    }

    /// Current top of the segment
    pub fn segment_state(&self) -> SegmentCookie {
        SegmentCookie::new(self.entries.len() as u32)
    }

    /// Drop every entry above `state`
    pub fn set_segment_state(&mut self, state: SegmentCookie) {
        self.entries.truncate(state.as_u32() as usize);
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over live entries (collector roots)
    pub fn iter(&self) -> impl Iterator<Item = &ObjRef> + '_ {
        self.entries.iter()
    }
}
