//! Error types for the call boundary
//!
//! Two families live here. `BoundaryError` describes internal consistency
//! failures: the runtime's own invariants are already broken when one is
//! produced, so the only thing to do with it is `fatal`. `ConfigError` covers
//! loading a `GateConfig` and is an ordinary recoverable error.

use crate::method::Tier;

/// Internal consistency failures detected at the call boundary
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BoundaryError {
    /// Entry point used for a method of a different tier
    #[error("Tier mismatch for {method}: entry point expects {expected:?}, method is {actual:?}")]
    TierMismatch {
        /// Pretty name of the executing method
        method: String,
        /// Tier the entry point was written for
        expected: Tier,
        /// Tier recorded in the method metadata
        actual: Tier,
    },

    /// A Fast or Critical method marked synchronized
    #[error("Synchronized native method {method} must be Normal tier, found {tier:?}")]
    SynchronizedNonNormal {
        /// Pretty name of the method
        method: String,
        /// Offending tier
        tier: Tier,
    },

    /// Synchronized method whose lock object could not be resolved
    #[error("No synchronization target for synchronized native method {0}")]
    MissingSynchronizationTarget(String),

    /// A Critical method declared to return an object reference
    #[error("Critical native method {0} cannot return a reference")]
    CriticalReferenceReturn(String),

    /// Return shorty character outside the known alphabet
    #[error("Unexpected return shorty character {0:?}")]
    UnknownReturnTag(char),

    /// Local reference segment below the base of the scope being popped
    #[error("Local reference scope depth mismatch: segment {segment} below scope base {base}")]
    ScopeDepthMismatch {
        /// Current top of the local reference segment
        segment: u32,
        /// Base recorded when the scope was pushed
        base: u32,
    },

    /// Native code returned while still holding monitors it entered
    #[error("Native code returned while still holding {0} monitor(s)")]
    MonitorsHeld(usize),

    /// Reference returned by native code failed verification
    #[error("Invalid reference result from {method}: {reason}")]
    InvalidReferenceResult {
        /// Pretty name of the method
        method: String,
        /// What the verifier rejected
        reason: String,
    },

    /// A second exception raised by the implicit monitor exit of a synchronized call
    #[error(
        "Synchronized native code returning with an exception:\n{original}\n\
         Encountered second exception during implicit MonitorExit:\n{second}"
    )]
    DoubleFault {
        /// Diagnostic text of the exception pending before the unlock
        original: String,
        /// Diagnostic text of the exception raised by the unlock
        second: String,
    },
}

/// Errors produced while loading a `GateConfig`
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Semantically invalid value
    #[error("Invalid config: {0}")]
    ValidationError(String),
}

/// Report an internal consistency failure and terminate the process.
///
/// There is no recovery from any `BoundaryError`: collector or reference
/// table state may already be corrupt, so unwinding is not an option either.
#[cold]
#[inline(never)]
pub fn fatal(error: BoundaryError) -> ! {
    tracing::error!(target: "callgate", %error, "fatal call boundary failure");
    eprintln!("callgate: fatal: {}", error);
    std::process::abort()
}
