//! Device profiles for reading sources
//!
//! Built-in profiles for the boards the forwarder is used with. A profile
//! supplies the default baud rate and the USB identifiers used to find the
//! board's serial port when none is configured.

pub mod generic;
pub mod microbit;
pub mod profile;

pub use generic::GENERIC_PROFILE;
pub use microbit::MICROBIT_PROFILE;
pub use profile::DeviceProfile;

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Registry of built-in device profiles
pub static DEVICE_PROFILES: Lazy<HashMap<&'static str, &'static DeviceProfile>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("microbit", &*MICROBIT_PROFILE);
    m.insert("micro:bit", &*MICROBIT_PROFILE);
    m.insert("generic", &*GENERIC_PROFILE);
    m.insert("default", &*GENERIC_PROFILE);
    m
});

/// Get a device profile by name
pub fn get_profile(name: &str) -> Option<&'static DeviceProfile> {
    DEVICE_PROFILES.get(name.to_lowercase().as_str()).copied()
}

/// Get profile names only (deduplicated)
pub fn profile_names() -> Vec<&'static str> {
    vec!["generic", "microbit"]
}
