//! Default constants for gate configuration.

/// Checked mode (CheckJNI-style verification) is off by default.
pub const DEFAULT_CHECK_JNI: bool = false;

/// Tier assertions follow the build profile.
pub const DEFAULT_VERIFY_TIERS: bool = cfg!(debug_assertions);

/// Call tracing is off by default.
pub const DEFAULT_TRACE_ENABLED: bool = false;

/// Environment variable enabling checked mode.
pub const ENV_CHECK_JNI: &str = "CALLGATE_CHECK_JNI";

/// Environment variable toggling tier assertions.
pub const ENV_VERIFY_TIERS: &str = "CALLGATE_VERIFY_TIERS";

/// Environment variable overriding the float return convention.
pub const ENV_FLOAT_RETURN: &str = "CALLGATE_FLOAT_RETURN";

/// Environment variable setting the trace filter (also enables tracing).
pub const ENV_TRACE_FILTER: &str = "CALLGATE_TRACE_FILTER";

/// Log target for call tracing events.
pub const TRACE_TARGET: &str = "callgate::trace";
