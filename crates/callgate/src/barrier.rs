//! Declaring-class read barrier for static native calls
//!
//! A static native method's stub holds its declaring class in a frame slot
//! that may lag behind a concurrent, moving collector. The slot is refreshed
//! while the thread is still Managed, right before the Native transition.

use crate::interfaces::Collector;

/// Refresh `declaring_class` so it holds the class object's current address.
///
/// With a mark-bit fast path, an already marked referent is current and the
/// barrier costs nothing more. Otherwise the collector's root barrier
/// supplies the current address and the slot is overwritten with it.
#[inline]
pub fn read_barrier_declaring_class<O>(collector: &dyn Collector<O>, declaring_class: &mut O) {
    debug_assert!(
        collector.uses_read_barrier(),
        "declaring-class barrier invoked without read barriers"
    );
    if collector.uses_mark_bit_fast_path() && collector.is_marked(declaring_class) {
        return;
    }
    let to_ref = collector.barrier_for_root(declaring_class);
    *declaring_class = to_ref;
}
