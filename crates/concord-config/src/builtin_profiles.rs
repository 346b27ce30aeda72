//! Quirk profiles bundled with the library.
//!
//! These describe the engine families the shim has to paper over and are
//! always available without external files.

use crate::QuirkProfile;

/// Names of the built-in profiles.
pub static BUILTIN_PROFILE_NAMES: &[&str] = &["conformant", "legacy-webkit", "legacy-gecko"];

static BUILTIN_PROFILES_TOML: &[(&str, &str)] = &[
    ("conformant", CONFORMANT_PROFILE),
    ("legacy-webkit", LEGACY_WEBKIT_PROFILE),
    ("legacy-gecko", LEGACY_GECKO_PROFILE),
];

const CONFORMANT_PROFILE: &str = r#"
name = "conformant"
description = "Every capability behaves as specified"
"#;

const LEGACY_WEBKIT_PROFILE: &str = r#"
name = "legacy-webkit"
description = "No selective disconnect, wrong param connect error, no cancel-and-hold, single-input processors"
selective_disconnect = false
param_connect_error = "invalid-state"
cancel_and_hold = false
validates_exponential_ramp = false
validates_frequency_response = false
max_processor_inputs = 1
"#;

const LEGACY_GECKO_PROFILE: &str = r#"
name = "legacy-gecko"
description = "Missing cancel-and-hold and unvalidated frequency response queries"
cancel_and_hold = false
validates_frequency_response = false
"#;

/// Returns all built-in profiles.
pub fn builtin_profiles() -> Vec<QuirkProfile> {
    BUILTIN_PROFILES_TOML
        .iter()
        .filter_map(|(_, toml)| QuirkProfile::from_toml(toml).ok())
        .collect()
}

/// Returns a built-in profile by name (case-insensitive).
pub fn get_builtin_profile(name: &str) -> Option<QuirkProfile> {
    let lower = name.to_lowercase();
    BUILTIN_PROFILES_TOML
        .iter()
        .find(|(id, _)| *id == lower)
        .and_then(|(_, toml)| QuirkProfile::from_toml(toml).ok())
}

/// Returns true if `name` is a built-in profile.
pub fn is_builtin_profile(name: &str) -> bool {
    let lower = name.to_lowercase();
    BUILTIN_PROFILE_NAMES.contains(&lower.as_str())
}
