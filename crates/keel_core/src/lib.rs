//! Keel Core
//!
//! The entity/component runtime:
//! - Generational handles and dense block storage
//! - Worlds of hierarchical game objects with batched components
//! - Phased frame updates with deferred structural changes and messaging
//! - Grid spatial index, simulation clock and binary snapshots

pub mod math;
pub mod snapshot;
pub mod spatial;
pub mod storage;
pub mod time;
pub mod world;

pub use glam;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
