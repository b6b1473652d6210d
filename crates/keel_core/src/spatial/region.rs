use crate::math::{Aabb, BoundingSphere, Frustum};
use crate::spatial::grid::{CellCoord, CellIter, CellRange, SpatialEntry};
use crate::spatial::SpatialSystem;
use crate::world::ObjectHandle;
use std::collections::hash_map;

/// Query volume for [`SpatialSystem::find_in_region`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Region {
    Box(Aabb),
    Sphere(BoundingSphere),
    Frustum(Frustum),
}

impl Region {
    pub fn bounding_box(&self) -> Aabb {
        match self {
            Region::Box(aabb) => *aabb,
            Region::Sphere(sphere) => sphere.bounding_box(),
            Region::Frustum(frustum) => frustum.bounding_box(),
        }
    }

    pub fn intersects(&self, bounds: &Aabb) -> bool {
        match self {
            Region::Box(aabb) => aabb.intersects(bounds),
            Region::Sphere(sphere) => sphere.intersects_aabb(bounds),
            Region::Frustum(frustum) => frustum.intersects_aabb(bounds),
        }
    }
}

impl From<Aabb> for Region {
    fn from(aabb: Aabb) -> Self {
        Region::Box(aabb)
    }
}

impl From<BoundingSphere> for Region {
    fn from(sphere: BoundingSphere) -> Self {
        Region::Sphere(sphere)
    }
}

impl From<Frustum> for Region {
    fn from(frustum: Frustum) -> Self {
        Region::Frustum(frustum)
    }
}

/// Where the next cell to scan comes from. Small queries walk their cell
/// range; queries covering more cells than are occupied walk the occupied
/// cells instead.
#[derive(Clone)]
enum CellSource<'a> {
    Range(CellIter),
    Occupied(hash_map::Iter<'a, CellCoord, Vec<ObjectHandle>>),
    Done,
}

/// Lazy result of a region query. See [`SpatialSystem::find_in_region`].
#[derive(Clone)]
pub struct RegionQuery<'a> {
    system: &'a SpatialSystem,
    region: Region,
    mask: u32,
    range: CellRange,
    source: CellSource<'a>,
    cell: Option<(CellCoord, std::slice::Iter<'a, ObjectHandle>)>,
    oversized: std::slice::Iter<'a, ObjectHandle>,
}

impl<'a> RegionQuery<'a> {
    pub(crate) fn new(system: &'a SpatialSystem, region: Region, mask: u32, range: CellRange) -> Self {
        let source = if system.cells.is_empty() {
            CellSource::Done
        } else if range.cell_count() > system.cells.len() as u64 {
            CellSource::Occupied(system.cells.iter())
        } else {
            CellSource::Range(range.iter())
        };
        Self {
            system,
            region,
            mask,
            range,
            source,
            cell: None,
            oversized: system.oversized.iter(),
        }
    }

    fn accepts(&self, entry: &SpatialEntry) -> bool {
        entry.category & self.mask != 0 && self.region.intersects(&entry.bounds)
    }

    fn next_cell(&mut self) -> Option<(CellCoord, std::slice::Iter<'a, ObjectHandle>)> {
        let system = self.system;
        loop {
            match &mut self.source {
                CellSource::Range(cells) => {
                    let coord = cells.next()?;
                    if let Some(bucket) = system.cells.get(&coord) {
                        return Some((coord, bucket.iter()));
                    }
                }
                CellSource::Occupied(cells) => {
                    let (coord, bucket) = cells.next()?;
                    if self.range.contains(*coord) {
                        return Some((*coord, bucket.iter()));
                    }
                }
                CellSource::Done => return None,
            }
        }
    }
}

impl Iterator for RegionQuery<'_> {
    type Item = ObjectHandle;

    fn next(&mut self) -> Option<ObjectHandle> {
        loop {
            if let Some((coord, bucket)) = &mut self.cell {
                let coord = *coord;
                if let Some(&handle) = bucket.next() {
                    let Some(entry) = self.system.entries.get(&handle) else {
                        continue;
                    };
                    let canonical = entry
                        .cells
                        .map(|cells| cells.canonical_cell(&self.range));
                    if canonical == Some(coord) && self.accepts(entry) {
                        return Some(handle);
                    }
                    continue;
                }
            }

            match self.next_cell() {
                Some(next) => self.cell = Some(next),
                None => {
                    self.cell = None;
                    self.source = CellSource::Done;
                    break;
                }
            }
        }

        while let Some(&handle) = self.oversized.next() {
            if let Some(entry) = self.system.entries.get(&handle) {
                if self.accepts(entry) {
                    return Some(handle);
                }
            }
        }
        None
    }
}
