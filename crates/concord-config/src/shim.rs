//! Shim configuration file format.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ConfigError;

/// Names of the capability probes the shim runs.
///
/// Probe overrides in a [`ShimConfig`] must use one of these names.
pub static PROBE_NAMES: &[&str] = &[
    "selective-disconnect",
    "cancel-and-hold",
    "exponential-ramp-validation",
    "frequency-response-validation",
    "multi-input-processor",
];

/// Lowest sample rate a context may be configured with.
pub const MIN_SAMPLE_RATE: f32 = 3000.0;

/// Highest sample rate a context may be configured with.
pub const MAX_SAMPLE_RATE: f32 = 768_000.0;

/// Top-level shim configuration.
///
/// # TOML Format
///
/// ```toml
/// [context]
/// sample_rate = 48000.0
/// latency_hint = "interactive"
///
/// [render]
/// mute_cycles = true
///
/// [probes]
/// "selective-disconnect" = false
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ShimConfig {
    /// Defaults applied to live contexts.
    #[serde(default)]
    pub context: ContextDefaults,

    /// Offline render pass settings.
    #[serde(default)]
    pub render: RenderConfig,

    /// Forced probe verdicts. A probe listed here never runs.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub probes: BTreeMap<String, bool>,
}

/// Live context defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextDefaults {
    /// Requested sample rate; the native default is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<f32>,

    /// Latency category requested from the native engine.
    #[serde(default)]
    pub latency_hint: LatencyHint,
}

impl Default for ContextDefaults {
    fn default() -> Self {
        Self {
            sample_rate: None,
            latency_hint: LatencyHint::Interactive,
        }
    }
}

/// Latency category for live contexts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LatencyHint {
    /// Lowest latency without glitching.
    #[default]
    Interactive,
    /// Balance latency and power.
    Balanced,
    /// Favor sustained playback over latency.
    Playback,
}

/// Offline render pass settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderConfig {
    /// Mute nodes that are part of a cycle when building the native graph.
    #[serde(default = "default_mute_cycles")]
    pub mute_cycles: bool,
}

fn default_mute_cycles() -> bool {
    true
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { mute_cycles: true }
    }
}

impl ShimConfig {
    /// Forces a probe verdict.
    pub fn with_probe(mut self, name: impl Into<String>, supported: bool) -> Self {
        self.probes.insert(name.into(), supported);
        self
    }

    /// Sets the default sample rate for live contexts.
    pub fn with_sample_rate(mut self, sample_rate: f32) -> Self {
        self.context.sample_rate = Some(sample_rate);
        self
    }

    /// Load a configuration from a TOML file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Parse a configuration from a TOML string and validate it.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: ShimConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Convert the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks ranges and probe names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(rate) = self.context.sample_rate
            && !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&rate)
        {
            return Err(ConfigError::invalid_value(
                "context.sample_rate",
                format!("{rate} is outside [{MIN_SAMPLE_RATE}, {MAX_SAMPLE_RATE}]"),
            ));
        }

        if let Some(name) = self
            .probes
            .keys()
            .find(|name| !PROBE_NAMES.contains(&name.as_str()))
        {
            return Err(ConfigError::UnknownProbe(name.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = ShimConfig::from_toml("").unwrap();
        assert_eq!(config, ShimConfig::default());
        assert!(config.render.mute_cycles);
        assert_eq!(config.context.latency_hint, LatencyHint::Interactive);
    }

    #[test]
    fn parses_all_sections() {
        let config = ShimConfig::from_toml(
            r#"
[context]
sample_rate = 44100.0
latency_hint = "playback"

[render]
mute_cycles = false

[probes]
"cancel-and-hold" = false
"#,
        )
        .unwrap();

        assert_eq!(config.context.sample_rate, Some(44100.0));
        assert_eq!(config.context.latency_hint, LatencyHint::Playback);
        assert!(!config.render.mute_cycles);
        assert_eq!(config.probes.get("cancel-and-hold"), Some(&false));
    }

    #[test]
    fn rejects_unknown_probe() {
        let err = ShimConfig::from_toml("[probes]\n\"teleport\" = true\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProbe(ref name) if name == "teleport"));
    }

    #[test]
    fn rejects_out_of_range_sample_rate() {
        let err = ShimConfig::default()
            .with_sample_rate(100.0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "context.sample_rate"));
    }

    #[test]
    fn toml_roundtrip() {
        let config = ShimConfig::default()
            .with_sample_rate(96000.0)
            .with_probe("multi-input-processor", true);
        let parsed = ShimConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
