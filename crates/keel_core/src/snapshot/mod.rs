//! Binary world snapshots.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! header      "KEEL" | u32 version | str world name
//! type table  u32 count | { u16 type id | str name | u8 serializable }*
//! objects     u32 count | object record*          (parents before children)
//! payloads    u32 count | { u16 type id | u32 count | component record* }*
//! ```
//!
//! Strings are a `u32` byte length followed by UTF-8. Object records keep
//! their exact `(index, generation)` so handles stored anywhere in saved
//! state still resolve after loading.

mod error;
mod reader;
mod writer;

pub use error::SnapshotError;
pub use reader::{read_world, LoadSummary};
pub use writer::write_world;

pub const MAGIC: [u8; 4] = *b"KEEL";
pub const FORMAT_VERSION: u32 = 1;
