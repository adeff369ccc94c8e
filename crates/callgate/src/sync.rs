//! Implicit monitor handling for `synchronized native` methods
//!
//! The monitor is entered while the thread is still Managed (entering may
//! block or inflate the lock) and exited after the thread is Managed again
//! but before the local scope holding the target is popped.

use crate::error::{fatal, BoundaryError};
use crate::interfaces::Monitors;
use crate::thread::CallThread;

/// Enter `target`'s monitor before a synchronized native call.
///
/// A failure to enter is left pending on the thread for the stub to see.
#[inline]
pub fn lock_for_call<T: CallThread>(monitors: &dyn Monitors<T>, thread: &T, target: &T::Object) {
    if let Err(exception) = monitors.monitor_enter(thread, target) {
        thread.set_exception(exception);
    }
}

/// Exit `target`'s monitor after a synchronized native call.
///
/// An exception pending from the native code is detached over the exit and
/// reattached unchanged afterwards. If the exit itself raises while one was
/// pending, there is no single exception left to report and the process
/// is aborted with both diagnostics.
pub fn unlock_for_call<T: CallThread>(monitors: &dyn Monitors<T>, thread: &T, target: &T::Object) {
    let saved_exception = thread.take_exception();

    if let Err(second) = monitors.monitor_exit(thread, target) {
        match saved_exception {
            Some(original) => fatal(BoundaryError::DoubleFault {
                original: original.to_string(),
                second: second.to_string(),
            }),
            None => {
                thread.set_exception(second);
                return;
            }
        }
    }

    if let Some(exception) = saved_exception {
        thread.set_exception(exception);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{exc, obj, MockMonitors, MockThread};
    use std::sync::Arc;

    #[test]
    fn test_lock_unlock_without_exception() {
        let thread = MockThread::new();
        let monitors = MockMonitors::new();
        let target = obj("lock");

        lock_for_call(&monitors, &thread, &target);
        unlock_for_call(&monitors, &thread, &target);

        assert_eq!(thread.events(), vec!["enter:lock", "exit:lock"]);
        assert!(!thread.is_exception_pending());
    }

    #[test]
    fn test_pending_exception_survives_unlock() {
        let thread = MockThread::new();
        let monitors = MockMonitors::new();
        let target = obj("lock");
        let pending = exc("java.io.IOException: closed");

        lock_for_call(&monitors, &thread, &target);
        thread.set_exception(pending.clone());
        unlock_for_call(&monitors, &thread, &target);

        let after = thread.exception().expect("exception still pending");
        assert!(Arc::ptr_eq(&after, &pending));
        assert_eq!(thread.events(), vec!["enter:lock", "exit:lock"]);
    }

    #[test]
    fn test_exit_sees_no_pending_exception() {
        let thread = MockThread::new();
        let monitors = MockMonitors::new();
        let target = obj("lock");
        thread.set_exception(exc("pending"));

        unlock_for_call(&monitors, &thread, &target);
        assert_eq!(monitors.pending_seen_on_exit(), Some(false));
    }

    #[test]
    fn test_exit_failure_without_pending_exception_is_raised() {
        let thread = MockThread::new();
        let monitors = MockMonitors::new();
        let target = obj("lock");
        monitors.fail_exit_with(exc("IllegalMonitorStateException"));

        unlock_for_call(&monitors, &thread, &target);
        let raised = thread.exception().unwrap();
        assert_eq!(raised.as_str(), "IllegalMonitorStateException");
    }

    #[test]
    fn test_enter_failure_is_left_pending() {
        let thread = MockThread::new();
        let monitors = MockMonitors::new();
        monitors.fail_enter_with(exc("NullPointerException"));

        lock_for_call(&monitors, &thread, &obj("lock"));
        assert!(thread.is_exception_pending());
    }
}
