//! # rover-settings
//!
//! Configuration for the rover link client, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`RoverSettings::default()`]
//! 2. **User file**: `~/.rover/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `ROVER_*` overrides

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
