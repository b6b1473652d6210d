//! Settings management

use keel_core::world::WorldDesc;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings from {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("settings file {path} is malformed")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write settings to {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode settings")]
    Encode(#[from] serde_json::Error),
}

/// Runtime settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// One world is created per entry, each driven by its own thread.
    pub worlds: Vec<WorldDesc>,
    /// Updates to run per world before exiting.
    pub frames: u64,
    /// Where the first world is saved and reloaded from. `None` skips the
    /// snapshot round trip.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            worlds: vec![WorldDesc::new("main"), WorldDesc::new("background")],
            frames: 120,
            snapshot_path: Some(PathBuf::from("keel.snapshot")),
        }
    }
}

impl RuntimeSettings {
    /// Load from a JSON file. A missing file yields the defaults; any other
    /// failure is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no settings file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.to_owned(),
                    source,
                })
            }
        };
        let settings = serde_json::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_owned(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|source| SettingsError::Write {
            path: path.to_owned(),
            source,
        })
    }
}
