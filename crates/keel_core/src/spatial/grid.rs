use crate::math::{Aabb, Vec3};
use crate::spatial::{Region, RegionQuery};
use crate::world::ObjectHandle;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Grid configuration, part of the world descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Edge length of one cubic cell, in world units.
    pub cell_size: f32,
    /// Objects overlapping more cells than this go to the oversized list.
    pub max_cells_per_object: u32,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            cell_size: 128.0,
            max_cells_per_object: 512,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CellCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl CellCoord {
    fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    fn max(self, other: CellCoord) -> CellCoord {
        CellCoord::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }
}

/// Inclusive box of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CellRange {
    pub min: CellCoord,
    pub max: CellCoord,
}

impl CellRange {
    pub fn cell_count(&self) -> u64 {
        let span = |lo: i32, hi: i32| (hi as i64 - lo as i64 + 1).max(0) as u64;
        span(self.min.x, self.max.x)
            .saturating_mul(span(self.min.y, self.max.y))
            .saturating_mul(span(self.min.z, self.max.z))
    }

    pub fn contains(&self, cell: CellCoord) -> bool {
        (self.min.x..=self.max.x).contains(&cell.x)
            && (self.min.y..=self.max.y).contains(&cell.y)
            && (self.min.z..=self.max.z).contains(&cell.z)
    }

    /// First cell of the overlap in x-major scan order. A query visits an
    /// object only from this cell so that it is reported once.
    pub fn canonical_cell(&self, other: &CellRange) -> CellCoord {
        self.min.max(other.min)
    }

    pub fn iter(&self) -> CellIter {
        CellIter {
            range: *self,
            next: Some(self.min),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CellIter {
    range: CellRange,
    next: Option<CellCoord>,
}

impl Iterator for CellIter {
    type Item = CellCoord;

    fn next(&mut self) -> Option<CellCoord> {
        let current = self.next?;
        let mut step = current;
        self.next = if step.x < self.range.max.x {
            step.x += 1;
            Some(step)
        } else if step.y < self.range.max.y {
            step.x = self.range.min.x;
            step.y += 1;
            Some(step)
        } else if step.z < self.range.max.z {
            step.x = self.range.min.x;
            step.y = self.range.min.y;
            step.z += 1;
            Some(step)
        } else {
            None
        };
        Some(current)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SpatialEntry {
    pub bounds: Aabb,
    pub category: u32,
    /// `None` for objects kept in the oversized list.
    pub cells: Option<CellRange>,
}

/// Regular-grid spatial index keyed by object handle.
pub struct SpatialSystem {
    config: SpatialConfig,
    inv_cell_size: f32,
    pub(crate) cells: HashMap<CellCoord, Vec<ObjectHandle>>,
    pub(crate) entries: HashMap<ObjectHandle, SpatialEntry>,
    pub(crate) oversized: Vec<ObjectHandle>,
    relocations: u64,
}

impl SpatialSystem {
    pub fn new(config: SpatialConfig) -> Self {
        let cell_size = if config.cell_size > 0.0 {
            config.cell_size
        } else {
            SpatialConfig::default().cell_size
        };
        Self {
            config: SpatialConfig {
                cell_size,
                ..config
            },
            inv_cell_size: 1.0 / cell_size,
            cells: HashMap::new(),
            entries: HashMap::new(),
            oversized: Vec::new(),
            relocations: 0,
        }
    }

    pub fn config(&self) -> &SpatialConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Bounds as of the last insert or update.
    pub fn bounds(&self, handle: ObjectHandle) -> Option<Aabb> {
        self.entries.get(&handle).map(|entry| entry.bounds)
    }

    pub fn category(&self, handle: ObjectHandle) -> Option<u32> {
        self.entries.get(&handle).map(|entry| entry.category)
    }

    /// Number of cells that hold at least one object.
    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    /// How many updates had to move an object between cells.
    pub fn relocations(&self) -> u64 {
        self.relocations
    }

    /// Add `handle`. Inserting a handle that is already present updates it.
    pub fn insert(&mut self, handle: ObjectHandle, bounds: Aabb, category: u32) {
        if self.entries.contains_key(&handle) {
            self.set_category(handle, category);
            self.update(handle, bounds);
            return;
        }
        let cells = self.cells_for(&bounds);
        self.link(handle, cells);
        self.entries.insert(
            handle,
            SpatialEntry {
                bounds,
                category,
                cells,
            },
        );
    }

    /// Move `handle` to new bounds. Returns `false` if it is not indexed.
    pub fn update(&mut self, handle: ObjectHandle, bounds: Aabb) -> bool {
        let new_cells = self.cells_for(&bounds);
        let Some(entry) = self.entries.get_mut(&handle) else {
            return false;
        };
        entry.bounds = bounds;
        if entry.cells == new_cells {
            return true;
        }
        let old_cells = std::mem::replace(&mut entry.cells, new_cells);
        self.unlink(handle, old_cells);
        self.link(handle, new_cells);
        self.relocations += 1;
        true
    }

    pub fn set_category(&mut self, handle: ObjectHandle, category: u32) -> bool {
        match self.entries.get_mut(&handle) {
            Some(entry) => {
                entry.category = category;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, handle: ObjectHandle) -> bool {
        match self.entries.remove(&handle) {
            Some(entry) => {
                self.unlink(handle, entry.cells);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.entries.clear();
        self.oversized.clear();
    }

    /// Lazily yield every indexed handle whose bounds intersect `region` and
    /// whose category shares a bit with `category_mask`.
    ///
    /// The iterator is `Clone`; cloning it before consumption restarts the
    /// query over the same index state.
    pub fn find_in_region(&self, region: &Region, category_mask: u32) -> RegionQuery<'_> {
        let range = self.range_for(&region.bounding_box());
        RegionQuery::new(self, region.clone(), category_mask, range)
    }

    pub(crate) fn range_for(&self, bounds: &Aabb) -> CellRange {
        CellRange {
            min: self.cell_of(bounds.min),
            max: self.cell_of(bounds.max),
        }
    }

    fn cell_of(&self, point: Vec3) -> CellCoord {
        let scaled = (point * self.inv_cell_size).floor();
        CellCoord::new(scaled.x as i32, scaled.y as i32, scaled.z as i32)
    }

    fn cells_for(&self, bounds: &Aabb) -> Option<CellRange> {
        let range = self.range_for(bounds);
        (range.cell_count() <= self.config.max_cells_per_object as u64).then_some(range)
    }

    fn link(&mut self, handle: ObjectHandle, cells: Option<CellRange>) {
        match cells {
            Some(range) => {
                for cell in range.iter() {
                    self.cells.entry(cell).or_default().push(handle);
                }
            }
            None => self.oversized.push(handle),
        }
    }

    fn unlink(&mut self, handle: ObjectHandle, cells: Option<CellRange>) {
        match cells {
            Some(range) => {
                for cell in range.iter() {
                    if let Some(bucket) = self.cells.get_mut(&cell) {
                        if let Some(pos) = bucket.iter().position(|&h| h == handle) {
                            bucket.swap_remove(pos);
                        }
                        if bucket.is_empty() {
                            self.cells.remove(&cell);
                        }
                    }
                }
            }
            None => {
                if let Some(pos) = self.oversized.iter().position(|&h| h == handle) {
                    self.oversized.swap_remove(pos);
                }
            }
        }
    }
}

impl Default for SpatialSystem {
    fn default() -> Self {
        Self::new(SpatialConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::BoundingSphere;
    use crate::spatial::ALL_CATEGORIES;
    use std::collections::HashSet;

    fn handle(i: u32) -> ObjectHandle {
        ObjectHandle::from_raw(i, 1)
    }

    fn cube(center: Vec3, half: f32) -> Aabb {
        Aabb::from_center_half_extents(center, Vec3::splat(half))
    }

    fn grid() -> SpatialSystem {
        SpatialSystem::new(SpatialConfig {
            cell_size: 10.0,
            max_cells_per_object: 64,
        })
    }

    #[test]
    fn cell_iter_covers_range_once() {
        let range = CellRange {
            min: CellCoord::new(-1, 0, 2),
            max: CellCoord::new(1, 1, 3),
        };
        let cells: Vec<_> = range.iter().collect();
        assert_eq!(cells.len() as u64, range.cell_count());
        assert_eq!(cells.iter().collect::<HashSet<_>>().len(), cells.len());
        assert_eq!(cells[0], range.min);
        assert_eq!(*cells.last().unwrap(), range.max);
    }

    #[test]
    fn query_returns_exactly_the_intersecting_handles() {
        let mut grid = grid();
        grid.insert(handle(0), cube(Vec3::ZERO, 1.0), 1);
        grid.insert(handle(1), cube(Vec3::new(25.0, 0.0, 0.0), 1.0), 1);
        // Spans several cells and must still be reported once.
        grid.insert(handle(2), cube(Vec3::new(10.0, 0.0, 0.0), 12.0), 1);

        let region = Region::Box(cube(Vec3::new(2.0, 0.0, 0.0), 2.0));
        let mut found: Vec<_> = grid.find_in_region(&region, ALL_CATEGORIES).collect();
        found.sort();
        assert_eq!(found, vec![handle(0), handle(2)]);

        let far = Region::Box(cube(Vec3::splat(500.0), 1.0));
        assert_eq!(grid.find_in_region(&far, ALL_CATEGORIES).count(), 0);
    }

    #[test]
    fn query_is_restartable() {
        let mut grid = grid();
        for i in 0..5 {
            grid.insert(handle(i), cube(Vec3::new(i as f32 * 3.0, 0.0, 0.0), 0.5), 1);
        }
        let query = grid.find_in_region(&Region::Box(cube(Vec3::ZERO, 100.0)), ALL_CATEGORIES);
        let first: Vec<_> = query.clone().collect();
        let second: Vec<_> = query.collect();
        assert_eq!(first.len(), 5);
        assert_eq!(first, second);
    }

    #[test]
    fn update_within_cell_keeps_buckets() {
        let mut grid = grid();
        grid.insert(handle(0), cube(Vec3::splat(5.0), 1.0), 1);
        assert!(grid.update(handle(0), cube(Vec3::splat(5.5), 1.0)));
        assert_eq!(grid.relocations(), 0);

        assert!(grid.update(handle(0), cube(Vec3::splat(55.0), 1.0)));
        assert_eq!(grid.relocations(), 1);
        let old = Region::Box(cube(Vec3::splat(5.0), 1.0));
        assert_eq!(grid.find_in_region(&old, ALL_CATEGORIES).count(), 0);
        assert!(!grid.update(handle(9), cube(Vec3::ZERO, 1.0)));
    }

    #[test]
    fn remove_forgets_the_handle() {
        let mut grid = grid();
        grid.insert(handle(0), cube(Vec3::ZERO, 1.0), 1);
        assert!(grid.remove(handle(0)));
        assert!(!grid.remove(handle(0)));
        assert!(grid.is_empty());
        assert_eq!(grid.occupied_cells(), 0);
    }

    #[test]
    fn oversized_objects_are_found() {
        let mut grid = grid();
        grid.insert(handle(0), cube(Vec3::ZERO, 1000.0), 1);
        assert!(grid.oversized.contains(&handle(0)));
        let region = Region::Sphere(BoundingSphere::new(Vec3::splat(900.0), 1.0));
        assert_eq!(grid.find_in_region(&region, ALL_CATEGORIES).collect::<Vec<_>>(), vec![handle(0)]);
    }

    #[test]
    fn category_mask_filters() {
        let mut grid = grid();
        grid.insert(handle(0), cube(Vec3::ZERO, 1.0), 0b01);
        grid.insert(handle(1), cube(Vec3::ZERO, 1.0), 0b10);
        let region = Region::Box(cube(Vec3::ZERO, 2.0));
        assert_eq!(grid.find_in_region(&region, 0b10).collect::<Vec<_>>(), vec![handle(1)]);
    }
}
