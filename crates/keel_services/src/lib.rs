//! Keel Services Layer
//!
//! Disk-facing services for the runtime: settings files and world snapshots.

pub mod save;
pub mod settings;

pub use save::{load_world, save_world, SaveError};
pub use settings::{RuntimeSettings, SettingsError};
