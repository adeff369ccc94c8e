//! Local reference scope stack
//!
//! A thread keeps two registers for its local reference table: the base of
//! the current scope (`local_ref_cookie`) and the current top
//! (`locals_segment_state`). Pushing a scope saves the old base and moves the
//! base up to the top. Popping drops everything above the base and restores
//! the saved base. Both must happen while the thread holds its shared
//! mutator claim.

use crate::error::{fatal, BoundaryError};
use crate::thread::{CallThread, SegmentCookie};

/// Open a new local reference scope, returning the cookie that closes it.
#[inline]
pub fn push_scope<T: CallThread>(thread: &T) -> SegmentCookie {
    let saved = thread.local_ref_cookie();
    thread.set_local_ref_cookie(thread.locals_segment_state());
    tracing::trace!(target: "callgate::scope", saved = saved.as_u32(), "push local scope");
    saved
}

/// Close the scope opened by the `push_scope` that returned `cookie`.
///
/// Every local reference created since that push is invalidated. In checked
/// mode, native code must not still hold monitors it entered, and the
/// segment must not have sunk below the scope base.
#[inline]
pub fn pop_scope<T: CallThread>(thread: &T, cookie: SegmentCookie, check_jni: bool) {
    let base = thread.local_ref_cookie();
    if check_jni {
        let held = thread.held_native_monitors();
        if held != 0 {
            fatal(BoundaryError::MonitorsHeld(held));
        }
        let segment = thread.locals_segment_state();
        if segment.as_u32() < base.as_u32() {
            fatal(BoundaryError::ScopeDepthMismatch {
                segment: segment.as_u32(),
                base: base.as_u32(),
            });
        }
    }
    thread.set_locals_segment_state(base);
    thread.set_local_ref_cookie(cookie);
    tracing::trace!(target: "callgate::scope", restored = cookie.as_u32(), "pop local scope");
}
