//! Runtime-wide collaborators of the call boundary
//!
//! The boundary does not implement a collector, monitors, or a method
//! registry. It drives them through these traits, bundled by `Runtime`.

use crate::method::NativeMethodDescriptor;
use crate::thread::CallThread;

/// Object type of a runtime's threads
pub type ObjectOf<R> = <<R as Runtime>::Thread as CallThread>::Object;

/// Collector operations the declaring-class barrier needs
pub trait Collector<O>: Send + Sync {
    /// Whether reads of roots go through a read barrier at all
    fn uses_read_barrier(&self) -> bool;

    /// Whether a set mark bit proves the referent is current
    fn uses_mark_bit_fast_path(&self) -> bool;

    /// Test the referent's mark bit
    fn is_marked(&self, object: &O) -> bool;

    /// Current valid address of a root. Must be callable concurrently with an
    /// active collection cycle.
    fn barrier_for_root(&self, root: &O) -> O;
}

/// Monitor subsystem
pub trait Monitors<T: CallThread>: Send + Sync {
    /// Enter `object`'s monitor on behalf of `thread`, blocking if contended
    fn monitor_enter(&self, thread: &T, object: &T::Object) -> Result<(), T::Exception>;

    /// Exit `object`'s monitor on behalf of `thread`
    fn monitor_exit(&self, thread: &T, object: &T::Object) -> Result<(), T::Exception>;
}

/// Method metadata services
pub trait MethodResolver<T: CallThread>: Send + Sync {
    /// Object whose monitor a synchronized call holds: the class object for
    /// a static method, the receiver for an instance method
    fn synchronization_target(
        &self,
        thread: &T,
        method: &NativeMethodDescriptor,
    ) -> Option<T::Object>;

    /// Checked-mode verification of a reference returned by native code.
    /// May resolve types; the caller keeps `result` protected meanwhile.
    /// Rejections are fatal and never return.
    fn check_reference_result(
        &self,
        thread: &T,
        method: &NativeMethodDescriptor,
        result: Option<&T::Object>,
    );
}

/// Bundle of collaborators sharing one thread type
pub trait Runtime: Send + Sync {
    /// Calling thread context
    type Thread: CallThread;

    /// Garbage collector
    fn collector(&self) -> &dyn Collector<ObjectOf<Self>>;

    /// Monitor subsystem
    fn monitors(&self) -> &dyn Monitors<Self::Thread>;

    /// Method metadata services
    fn resolver(&self) -> &dyn MethodResolver<Self::Thread>;
}
