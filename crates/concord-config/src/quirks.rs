//! Native implementation quirk profiles.
//!
//! A [`QuirkProfile`] describes where a native audio engine deviates from the
//! specified behavior. The simulated engine reads one to decide how to
//! misbehave; the shim never reads it directly, it discovers the same facts by
//! probing.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Error code a native engine raises when a node is connected to a param of a
/// different context.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ParamConnectError {
    /// `InvalidAccessError`, as specified.
    #[default]
    InvalidAccess,
    /// `InvalidStateError`, which the shim relabels.
    InvalidState,
}

/// How a native audio engine deviates from the standard graph API.
///
/// # TOML Format
///
/// ```toml
/// name = "legacy-webkit"
/// description = "Early WebKit engine"
/// selective_disconnect = false
/// param_connect_error = "invalid-state"
/// cancel_and_hold = false
/// validates_exponential_ramp = false
/// validates_frequency_response = false
/// max_processor_inputs = 1
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuirkProfile {
    /// Profile name.
    pub name: String,

    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// `disconnect(destination)` removes only the edges to that destination.
    /// When false the engine silently drops every outgoing edge instead.
    #[serde(default = "yes")]
    pub selective_disconnect: bool,

    /// Error raised for cross-context param connections.
    #[serde(default)]
    pub param_connect_error: ParamConnectError,

    /// `cancel_and_hold_at_time` exists.
    #[serde(default = "yes")]
    pub cancel_and_hold: bool,

    /// Exponential ramps to zero are rejected with a `RangeError`.
    #[serde(default = "yes")]
    pub validates_exponential_ramp: bool,

    /// `get_frequency_response` rejects arrays of unequal length.
    #[serde(default = "yes")]
    pub validates_frequency_response: bool,

    /// Largest input count a processor node accepts.
    #[serde(default = "default_max_processor_inputs")]
    pub max_processor_inputs: u32,
}

fn yes() -> bool {
    true
}

fn default_max_processor_inputs() -> u32 {
    32
}

impl QuirkProfile {
    /// A profile with every capability behaving as specified.
    pub fn conformant() -> Self {
        Self {
            name: "conformant".to_string(),
            description: None,
            selective_disconnect: true,
            param_connect_error: ParamConnectError::InvalidAccess,
            cancel_and_hold: true,
            validates_exponential_ramp: true,
            validates_frequency_response: true,
            max_processor_inputs: default_max_processor_inputs(),
        }
    }

    /// Load a profile from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Parse a profile from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let profile: QuirkProfile = toml::from_str(toml_str)?;
        if profile.max_processor_inputs == 0 {
            return Err(ConfigError::invalid_value(
                "max_processor_inputs",
                "a processor needs at least one input",
            ));
        }
        Ok(profile)
    }

    /// Convert the profile to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Returns true when no quirk is active.
    pub fn is_conformant(&self) -> bool {
        self.selective_disconnect
            && self.param_connect_error == ParamConnectError::InvalidAccess
            && self.cancel_and_hold
            && self.validates_exponential_ramp
            && self.validates_frequency_response
            && self.max_processor_inputs > 1
    }
}

impl Default for QuirkProfile {
    fn default() -> Self {
        Self::conformant()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_default_to_conformant() {
        let profile = QuirkProfile::from_toml("name = \"bare\"").unwrap();
        assert!(profile.is_conformant());
        assert_eq!(profile.max_processor_inputs, 32);
    }

    #[test]
    fn parses_quirks() {
        let profile = QuirkProfile::from_toml(
            r#"
name = "odd"
selective_disconnect = false
param_connect_error = "invalid-state"
max_processor_inputs = 1
"#,
        )
        .unwrap();
        assert!(!profile.selective_disconnect);
        assert_eq!(profile.param_connect_error, ParamConnectError::InvalidState);
        assert!(!profile.is_conformant());
    }

    #[test]
    fn zero_processor_inputs_rejected() {
        let err = QuirkProfile::from_toml("name = \"x\"\nmax_processor_inputs = 0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
