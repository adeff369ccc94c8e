//! Gate configuration (callgate.toml)
//!
//! Configuration is read once when a `CallGate` is built. Every field has a
//! default, so an empty file is a valid config. Environment variables
//! override file values.

use crate::defaults::{
    DEFAULT_CHECK_JNI, DEFAULT_TRACE_ENABLED, DEFAULT_VERIFY_TIERS, ENV_CHECK_JNI,
    ENV_FLOAT_RETURN, ENV_TRACE_FILTER, ENV_VERIFY_TIERS,
};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// How a `float` result travels in the floating-point return register
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FloatReturnAbi {
    /// Float bits arrive as-is
    Native,
    /// Floats arrive widened to a double (x87-style shared return register)
    X87Widened,
}

impl FloatReturnAbi {
    /// Convention of the build target
    pub const fn for_target() -> Self {
        if cfg!(target_arch = "x86") {
            FloatReturnAbi::X87Widened
        } else {
            FloatReturnAbi::Native
        }
    }

    /// Parse a config or environment spelling
    pub fn parse(text: &str) -> Option<Self> {
        match text.to_ascii_lowercase().as_str() {
            "native" => Some(Self::Native),
            "x87-widened" | "x87" | "widened" => Some(Self::X87Widened),
            _ => None,
        }
    }
}

impl Default for FloatReturnAbi {
    fn default() -> Self {
        Self::for_target()
    }
}

impl fmt::Display for FloatReturnAbi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FloatReturnAbi::Native => "native",
            FloatReturnAbi::X87Widened => "x87-widened",
        };
        f.write_str(text)
    }
}

/// Native call tracing settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Trace native calls whose pretty name matches `filter`
    pub enabled: bool,

    /// Substring of `Class.method` names to trace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: DEFAULT_TRACE_ENABLED,
            filter: None,
        }
    }
}

/// Call gate configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Checked mode: held-monitor check at scope pop, scope depth check,
    /// verification of reference results
    pub check_jni: bool,

    /// Assert that entry points match the executing method's tier
    pub verify_tiers: bool,

    /// Float return register convention
    pub float_return: FloatReturnAbi,

    /// Native call tracing
    pub trace: TraceConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            check_jni: DEFAULT_CHECK_JNI,
            verify_tiers: DEFAULT_VERIFY_TIERS,
            float_return: FloatReturnAbi::default(),
            trace: TraceConfig::default(),
        }
    }
}

impl GateConfig {
    /// Parse a config from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: GateConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Default config with environment overrides applied
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env()
    }

    /// Apply process environment overrides
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(ENV_CHECK_JNI) {
            self.check_jni = parse_flag(ENV_CHECK_JNI, &value)?;
        }
        if let Some(value) = lookup(ENV_VERIFY_TIERS) {
            self.verify_tiers = parse_flag(ENV_VERIFY_TIERS, &value)?;
        }
        if let Some(value) = lookup(ENV_FLOAT_RETURN) {
            self.float_return = FloatReturnAbi::parse(&value).ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "{} must be 'native' or 'x87-widened', got '{}'",
                    ENV_FLOAT_RETURN, value
                ))
            })?;
        }
        if let Some(value) = lookup(ENV_TRACE_FILTER) {
            self.trace.enabled = true;
            self.trace.filter = Some(value);
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject configs that cannot be honored
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trace.enabled && self.trace.filter.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::ValidationError(
                "trace.enabled requires a non-empty trace.filter".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::ValidationError(format!(
            "{} must be a boolean, got '{}'",
            key, value
        ))),
    }
}
