//! Configuration and quirk profiles for the concord audio graph shim.
//!
//! # Features
//!
//! - **Shim configuration**: context defaults, render pass settings and forced
//!   probe verdicts, loaded from TOML ([`ShimConfig`])
//! - **Quirk profiles**: descriptions of how a native engine deviates from the
//!   standard graph API ([`QuirkProfile`])
//! - **Built-in profiles**: the engine families the shim knows about
//!
//! # Example
//!
//! ```rust
//! use concord_config::{ShimConfig, get_builtin_profile};
//!
//! let config = ShimConfig::from_toml(r#"
//! [render]
//! mute_cycles = true
//!
//! [probes]
//! "multi-input-processor" = false
//! "#).unwrap();
//! assert_eq!(config.probes.get("multi-input-processor"), Some(&false));
//!
//! let webkit = get_builtin_profile("legacy-webkit").unwrap();
//! assert!(!webkit.selective_disconnect);
//! ```

mod error;
mod quirks;
mod shim;

/// Quirk profiles bundled with the library.
pub mod builtin_profiles;

pub use builtin_profiles::{
    BUILTIN_PROFILE_NAMES, builtin_profiles, get_builtin_profile, is_builtin_profile,
};
pub use error::ConfigError;
pub use quirks::{ParamConnectError, QuirkProfile};
pub use shim::{
    ContextDefaults, LatencyHint, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE, PROBE_NAMES, RenderConfig,
    ShimConfig,
};
