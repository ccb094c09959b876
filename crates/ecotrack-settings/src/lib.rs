//! # ecotrack-settings
//!
//! Configuration for the EcoTrack hub, loaded from three layers (in priority
//! order):
//! 1. **Compiled defaults**: [`EcotrackSettings::default()`]
//! 2. **User file**: `~/.ecotrack/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `ECOTRACK_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    deep_merge, load_settings, load_settings_from_path, parse_u16_range, parse_u64_range,
    parse_usize_range, settings_path,
};
pub use types::*;
