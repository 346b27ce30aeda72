//! Simulated native backend.
//!
//! A [`SimBackend`] stands for one native engine build. Every context it
//! creates exhibits the same [`QuirkProfile`], so a test can pick the
//! engine it wants to run the shim against:
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │      concord_core::Context       │
//! └──────────────┬───────────────────┘
//!                │ NativeBackend / NativeContext
//!        ┌───────┴────────┐
//!        ▼                ▼
//! ┌─────────────┐  ┌─────────────┐
//! │ SimBackend  │  │ SimBackend  │
//! │ conformant  │  │ legacy-*    │
//! └─────────────┘  └─────────────┘
//! ```

use std::sync::Arc;

use concord_config::{
    ConfigError, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE, QuirkProfile, get_builtin_profile,
};
use concord_core::{NativeBackend, NativeBackendRef, NativeContextOptions, NativeContextRef, NativeError};

use crate::context::{MAX_CHANNELS, SimContext};

/// Sample rate of live contexts that do not request one.
pub const DEFAULT_SAMPLE_RATE: f32 = 44_100.0;

/// Simulated engine with a fixed set of quirks.
#[derive(Debug, Clone)]
pub struct SimBackend {
    profile: QuirkProfile,
}

impl SimBackend {
    /// Creates a backend exhibiting `profile`.
    pub fn new(profile: QuirkProfile) -> Self {
        Self { profile }
    }

    /// A backend with no quirks.
    pub fn conformant() -> Self {
        Self::new(QuirkProfile::conformant())
    }

    /// A backend exhibiting the built-in profile `name`.
    pub fn builtin(name: &str) -> Result<Self, ConfigError> {
        get_builtin_profile(name)
            .map(Self::new)
            .ok_or_else(|| ConfigError::ProfileNotFound(name.to_string()))
    }

    /// The quirks of this engine.
    pub fn profile(&self) -> &QuirkProfile {
        &self.profile
    }

    /// Shares the backend as a [`NativeBackendRef`].
    pub fn into_ref(self) -> NativeBackendRef {
        Arc::new(self)
    }
}

fn check_sample_rate(sample_rate: f32) -> Result<(), NativeError> {
    if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
        return Err(NativeError::not_supported(format!(
            "sample rate {sample_rate} outside {MIN_SAMPLE_RATE}..={MAX_SAMPLE_RATE}"
        )));
    }
    Ok(())
}

impl NativeBackend for SimBackend {
    fn name(&self) -> &str {
        &self.profile.name
    }

    fn create_context(&self, options: &NativeContextOptions) -> Result<NativeContextRef, NativeError> {
        let sample_rate = options.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
        check_sample_rate(sample_rate)?;
        tracing::debug!(
            backend = self.profile.name.as_str(),
            sample_rate,
            latency_hint = ?options.latency_hint,
            "sim_create_context"
        );
        let context: NativeContextRef = SimContext::create(self.profile.clone(), sample_rate, None)?;
        Ok(context)
    }

    fn create_offline_context(
        &self,
        channels: u32,
        length: usize,
        sample_rate: f32,
    ) -> Result<NativeContextRef, NativeError> {
        check_sample_rate(sample_rate)?;
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(NativeError::not_supported(format!(
                "channel count {channels} outside 1..={MAX_CHANNELS}"
            )));
        }
        if length == 0 {
            return Err(NativeError::not_supported("offline length must be nonzero"));
        }
        tracing::debug!(
            backend = self.profile.name.as_str(),
            channels,
            length,
            sample_rate,
            "sim_create_offline_context"
        );
        let context: NativeContextRef =
            SimContext::create(self.profile.clone(), sample_rate, Some((channels, length)))?;
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::{ContextState, NodeKind};

    #[test]
    fn builtin_lookup() {
        assert!(SimBackend::builtin("legacy-webkit").is_ok());
        let err = SimBackend::builtin("no-such-engine").unwrap_err();
        assert!(matches!(err, ConfigError::ProfileNotFound(ref name) if name == "no-such-engine"));
        assert_eq!(err.to_string(), "quirk profile not found: no-such-engine");
        assert_eq!(SimBackend::conformant().name(), "conformant");
    }

    #[test]
    fn live_context_defaults() {
        let backend = SimBackend::conformant();
        let context = backend
            .create_context(&NativeContextOptions::default())
            .unwrap();
        assert!((context.sample_rate() - DEFAULT_SAMPLE_RATE).abs() < f32::EPSILON);
        assert_eq!(context.state(), ContextState::Running);
        assert!(!context.is_offline());
    }

    #[test]
    fn rejects_bad_sample_rate() {
        let backend = SimBackend::conformant();
        let options = NativeContextOptions {
            sample_rate: Some(100.0),
            ..NativeContextOptions::default()
        };
        let err = backend.create_context(&options).err().unwrap();
        assert_eq!(err.kind(), concord_core::ErrorKind::NotSupported);
    }

    #[test]
    fn offline_context_validation() {
        let backend = SimBackend::conformant();
        assert!(backend.create_offline_context(0, 128, 44_100.0).is_err());
        assert!(backend.create_offline_context(2, 0, 44_100.0).is_err());
        let context = backend.create_offline_context(2, 128, 44_100.0).unwrap();
        assert!(context.is_offline());
        assert_eq!(context.state(), ContextState::Suspended);
        assert_eq!(context.destination().channel_config().count, 2);
    }

    #[test]
    fn processor_input_limit_follows_profile() {
        let webkit = SimBackend::builtin("legacy-webkit").unwrap();
        let context = webkit
            .create_context(&NativeContextOptions::default())
            .unwrap();
        let err = context
            .create_node(&NodeKind::Processor { inputs: 2, outputs: 1 })
            .err()
            .unwrap();
        assert_eq!(err.kind(), concord_core::ErrorKind::NotSupported);
        assert!(context
            .create_node(&NodeKind::Processor { inputs: 1, outputs: 1 })
            .is_ok());
    }
}
