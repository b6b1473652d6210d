use crate::math::CoordinateSystem;
use crate::spatial::SpatialConfig;
use crate::time::TimeStep;
use serde::{Deserialize, Serialize};

/// World construction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldDesc {
    pub name: String,
    /// `None` creates a world without a spatial index.
    pub spatial: Option<SpatialConfig>,
    pub coordinate_system: CoordinateSystem,
    pub time_step: TimeStep,
    pub max_objects: u32,
    pub max_components_per_type: u32,
    /// Rows per storage block in every component manager. Must be a power
    /// of two.
    pub component_block_size: usize,
    /// Fan the async phase out over worker threads.
    pub parallel_async: bool,
    /// `0` uses rayon's global pool; anything else gives the world its own.
    pub worker_threads: usize,
    /// Create every registered module when the world is created.
    pub eager_modules: bool,
    /// Run "only when simulating" update functions.
    pub simulate: bool,
}

impl WorldDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Default for WorldDesc {
    fn default() -> Self {
        Self {
            name: "world".to_owned(),
            spatial: Some(SpatialConfig::default()),
            coordinate_system: CoordinateSystem::default(),
            time_step: TimeStep::default(),
            max_objects: 1 << 20,
            max_components_per_type: 1 << 20,
            component_block_size: 128,
            parallel_async: true,
            worker_threads: 0,
            eager_modules: false,
            simulate: true,
        }
    }
}
