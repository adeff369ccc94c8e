//! Native method metadata consumed by the boundary
//!
//! Descriptors are owned by the runtime's method registry and are read-only
//! here. The tier and synchronized flag decide how much of the protocol runs;
//! the shorty's first character decides how the result is marshaled.

use std::fmt;

/// How much of the transition protocol a native method uses
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Full protocol: leaves Managed state for the duration of the call
    Normal,
    /// Stays Managed, pushes a local reference scope, suspend check on exit
    Fast,
    /// Stays Managed, no scope, no suspend check
    Critical,
}

impl Tier {
    /// Whether the thread gives up its shared mutator hold for the call
    #[inline]
    pub fn transitions_state(self) -> bool {
        matches!(self, Tier::Normal)
    }

    /// Whether the call brackets a local reference scope
    #[inline]
    pub fn uses_local_scope(self) -> bool {
        !matches!(self, Tier::Critical)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Tier::Normal => "normal",
            Tier::Fast => "fast",
            Tier::Critical => "critical",
        };
        f.write_str(text)
    }
}

/// Immutable per-method metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeMethodDescriptor {
    /// Simple method name
    pub name: String,
    /// Name of the declaring class
    pub declaring_class: String,
    /// Shorty: return type character followed by one character per parameter
    pub shorty: String,
    /// Call tier
    pub tier: Tier,
    /// `synchronized native`
    pub synchronized: bool,
    /// Static method (synchronizes on the class object)
    pub is_static: bool,
    /// Declared class of a reference return, if any
    pub return_class: Option<String>,
}

impl NativeMethodDescriptor {
    /// Create a descriptor for a non-synchronized static method
    pub fn new(declaring_class: &str, name: &str, shorty: &str, tier: Tier) -> Self {
        Self {
            name: name.to_string(),
            declaring_class: declaring_class.to_string(),
            shorty: shorty.to_string(),
            tier,
            synchronized: false,
            is_static: true,
            return_class: None,
        }
    }

    /// Mark the method `synchronized`
    pub fn synchronized(mut self) -> Self {
        self.synchronized = true;
        self
    }

    /// Mark the method as an instance method
    pub fn instance(mut self) -> Self {
        self.is_static = false;
        self
    }

    /// Set the declared class of a reference return
    pub fn returning(mut self, class: &str) -> Self {
        self.return_class = Some(class.to_string());
        self
    }

    /// Return type character (first shorty character).
    ///
    /// An empty shorty reads as NUL, which no return tag accepts.
    #[inline]
    pub fn return_shorty(&self) -> u8 {
        self.shorty.as_bytes().first().copied().unwrap_or(0)
    }

    /// `Class.method` form used in diagnostics
    pub fn pretty_name(&self) -> String {
        format!("{}.{}", self.declaring_class, self.name)
    }
}
