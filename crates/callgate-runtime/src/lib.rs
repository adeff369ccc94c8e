//! Reference runtime for the callgate call boundary
//!
//! A small but real managed runtime that the boundary can be driven
//! against end to end:
//! - **Mutator lock**: shared claims for Managed threads, exclusive pauses (`mutator`)
//! - **Threads**: per-thread context implementing `CallThread` (`thread`)
//! - **Heap**: moving collector model with read barriers and mark bits (`heap`)
//! - **Monitors**: reentrant object monitors (`monitor`)
//! - **Methods**: native method registry and checked-mode result checks (`methods`)
//! - **Stub**: generic call stub running native bodies through the gate (`stub`)

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod exception;
pub mod heap;
pub mod methods;
pub mod monitor;
pub mod mutator;
pub mod object;
pub mod reference_table;
pub mod stub;
pub mod thread;
pub mod vm;

pub use exception::{ExceptionRef, Throwable};
pub use heap::{Heap, HeapOptions};
pub use methods::MethodRegistry;
pub use monitor::{MonitorError, MonitorTable, ObjectMonitor};
pub use mutator::{MutatorLock, PauseReason, SafepointStats};
pub use object::{HeapObject, ObjRef, ObjectId};
pub use reference_table::LocalRefTable;
pub use stub::{invoke, NativeEnv};
pub use thread::{ManagedThread, ThreadControl, ThreadId, ThreadRegistry};
pub use vm::{Vm, VmOptions};
