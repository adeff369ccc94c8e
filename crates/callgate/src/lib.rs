//! Callgate - native call boundary protocol for managed runtimes
//!
//! This crate implements the entry/exit sequence a managed runtime runs every
//! time managed code calls into a natively implemented method and every time
//! that method returns:
//! - **Local reference scopes**: bracket the references a native call creates (`scope`)
//! - **Declaring-class barrier**: refresh a static method's class root (`barrier`)
//! - **State transitions**: Managed <-> Native around a call, per tier (`transition`)
//! - **Synchronized calls**: implicit monitor enter/exit, exception-safe (`sync`)
//! - **Result marshaling**: metadata-driven exit for generic call sites (`marshal`)
//! - **Invocation monitoring**: optional begin/end observer (`hook`)
//!
//! The garbage collector, thread model, reference table, monitors and method
//! metadata are collaborators reached through the traits in `thread` and
//! `interfaces`. `CallGate` in `gate` ties everything together.
//!
//! # Example
//!
//! ```rust,ignore
//! use callgate::{CallGate, GateConfig, RawResult};
//!
//! let gate = CallGate::new(runtime, GateConfig::default());
//! let cookie = gate.generic_method_start(&thread, &method);
//! let raw = RawResult::from_gpr(native_fn() as u64);
//! let result = gate.generic_method_end(&thread, cookie, raw, &method);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![allow(clippy::needless_return)]

pub mod barrier;
pub mod config;
pub mod defaults;
pub mod error;
pub mod gate;
pub mod hook;
pub mod interfaces;
pub mod marshal;
pub mod method;
pub mod scope;
pub mod sync;
pub mod thread;
pub mod trace;
pub mod transition;

#[cfg(test)]
mod testing;

pub use barrier::read_barrier_declaring_class;
pub use config::{FloatReturnAbi, GateConfig, TraceConfig};
pub use error::{fatal, BoundaryError, ConfigError};
pub use gate::CallGate;
pub use hook::{InvocationObserver, Monitoring};
pub use interfaces::{Collector, MethodResolver, Monitors, ObjectOf, Runtime};
pub use marshal::{MarshaledResult, RawResult, ReturnTag, TransportBits};
pub use method::{NativeMethodDescriptor, Tier};
pub use scope::{pop_scope, push_scope};
pub use sync::{lock_for_call, unlock_for_call};
pub use thread::{CallThread, EnvHandle, HandleWrapper, RawHandle, SegmentCookie, ThreadState};
pub use trace::CallTracer;
