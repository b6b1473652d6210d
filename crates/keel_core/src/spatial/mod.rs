//! Spatial index over object bounds.
//!
//! A regular grid of cubic cells. Objects are registered in every cell their
//! bounds overlap; objects spanning more cells than the configured limit are
//! kept in a separate list that every query checks.

mod grid;
mod region;

pub use grid::{SpatialConfig, SpatialSystem};
pub use region::{Region, RegionQuery};

/// Category mask matching every object.
pub const ALL_CATEGORIES: u32 = u32::MAX;
