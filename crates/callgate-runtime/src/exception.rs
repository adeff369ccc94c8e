//! Exception objects carried on a thread's pending slot

use std::fmt;
use std::sync::Arc;

/// Pending exception reference
pub type ExceptionRef = Arc<Throwable>;

/// A thrown exception
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Throwable {
    class_name: String,
    message: String,
}

impl Throwable {
    /// Create a new exception reference
    pub fn new(class_name: &str, message: impl Into<String>) -> ExceptionRef {
        Arc::new(Self {
            class_name: class_name.to_string(),
            message: message.into(),
        })
    }

    /// `java.lang.IllegalMonitorStateException`
    pub fn illegal_monitor_state(message: impl Into<String>) -> ExceptionRef {
        Self::new("java.lang.IllegalMonitorStateException", message)
    }

    /// Exception class name
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Detail message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Throwable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(&self.class_name)
        } else {
            write!(f, "{}: {}", self.class_name, self.message)
        }
    }
}
