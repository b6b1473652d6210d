use crate::storage::HandleError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("not a snapshot (magic {0:?})")]
    BadMagic([u8; 4]),

    #[error("snapshot format version {0} is newer than supported")]
    UnsupportedVersion(u32),

    #[error("snapshots can only be loaded into an empty world")]
    WorldNotEmpty,

    #[error("snapshot contains invalid UTF-8")]
    InvalidString(#[from] std::string::FromUtf8Error),

    #[error("failed to encode '{type_name}' components")]
    Encode {
        type_name: &'static str,
        #[source]
        source: bincode::Error,
    },

    #[error("failed to decode a '{type_name}' component")]
    Decode {
        type_name: String,
        #[source]
        source: bincode::Error,
    },

    #[error("saved handle cannot be restored")]
    Handle(#[from] HandleError),

    #[error("object {index} references parent {parent} that was not saved before it")]
    MissingParent { index: u32, parent: u32 },
}
