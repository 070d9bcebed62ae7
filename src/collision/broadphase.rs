use std::collections::HashMap;

use glam::Vec3;

use crate::{core::mesh::Aabb, utils::allocator::BodyHandle};

/// Uniform grid spatial partitioning over body bounds.
pub struct SpatialGrid {
    cell_size: f32,
    grid: HashMap<(i32, i32, i32), Vec<BodyHandle>>,
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(1e-3),
            grid: HashMap::new(),
        }
    }

    fn world_to_grid(&self, pos: Vec3) -> (i32, i32, i32) {
        (
            (pos.x / self.cell_size).floor() as i32,
            (pos.y / self.cell_size).floor() as i32,
            (pos.z / self.cell_size).floor() as i32,
        )
    }

    fn cells(&self, bounds: &Aabb) -> impl Iterator<Item = (i32, i32, i32)> {
        let min_cell = self.world_to_grid(bounds.min);
        let max_cell = self.world_to_grid(bounds.max);
        (min_cell.0..=max_cell.0).flat_map(move |x| {
            (min_cell.1..=max_cell.1)
                .flat_map(move |y| (min_cell.2..=max_cell.2).map(move |z| (x, y, z)))
        })
    }

    pub fn insert(&mut self, handle: BodyHandle, bounds: &Aabb) {
        let cells: Vec<_> = self.cells(bounds).collect();
        for cell in cells {
            self.grid.entry(cell).or_default().push(handle);
        }
    }

    pub fn remove(&mut self, handle: BodyHandle, bounds: &Aabb) {
        let cells: Vec<_> = self.cells(bounds).collect();
        for cell in cells {
            if let Some(entries) = self.grid.get_mut(&cell) {
                entries.retain(|h| *h != handle);
                if entries.is_empty() {
                    self.grid.remove(&cell);
                }
            }
        }
    }

    /// Candidates sharing a cell with `bounds`, deduplicated.
    pub fn query(&self, bounds: &Aabb) -> Vec<BodyHandle> {
        let mut results = Vec::new();
        for cell in self.cells(bounds) {
            if let Some(entries) = self.grid.get(&cell) {
                results.extend(entries);
            }
        }

        results.sort();
        results.dedup();
        results
    }
}

/// Spatial registration of structural bodies, guarded by the world's spatial lock.
pub struct BroadPhase {
    grid: SpatialGrid,
    bounds: HashMap<BodyHandle, Aabb>,
}

impl BroadPhase {
    pub fn new(cell_size: f32) -> Self {
        Self {
            grid: SpatialGrid::new(cell_size),
            bounds: HashMap::new(),
        }
    }

    /// Registers or moves a body.
    pub fn update(&mut self, handle: BodyHandle, bounds: Aabb) {
        if bounds.is_empty() {
            self.remove(handle);
            return;
        }
        if let Some(old) = self.bounds.insert(handle, bounds) {
            self.grid.remove(handle, &old);
        }
        self.grid.insert(handle, &bounds);
    }

    pub fn remove(&mut self, handle: BodyHandle) {
        if let Some(old) = self.bounds.remove(&handle) {
            self.grid.remove(handle, &old);
        }
    }

    /// Bodies whose registered bounds overlap `area`.
    pub fn query_overlaps(&self, area: &Aabb) -> Vec<BodyHandle> {
        self.grid
            .query(area)
            .into_iter()
            .filter(|h| self.bounds.get(h).map(|b| b.overlaps(area)).unwrap_or(false))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_query_filters_by_exact_bounds() {
        let mut broadphase = BroadPhase::new(5.0);
        let a = BodyHandle::new(0, 0);
        let b = BodyHandle::new(1, 0);
        broadphase.update(a, Aabb::new(Vec3::ZERO, Vec3::ONE));
        broadphase.update(b, Aabb::new(Vec3::splat(2.0), Vec3::splat(3.0)));

        let hits = broadphase.query_overlaps(&Aabb::new(Vec3::splat(0.5), Vec3::splat(1.5)));
        assert_eq!(hits, vec![a]);
    }

    #[test]
    fn moved_body_leaves_old_cells() {
        let mut broadphase = BroadPhase::new(1.0);
        let a = BodyHandle::new(0, 0);
        broadphase.update(a, Aabb::new(Vec3::ZERO, Vec3::splat(0.5)));
        broadphase.update(a, Aabb::new(Vec3::splat(10.0), Vec3::splat(10.5)));

        assert!(broadphase
            .query_overlaps(&Aabb::new(Vec3::ZERO, Vec3::splat(0.5)))
            .is_empty());
        broadphase.remove(a);
        assert!(broadphase.is_empty());
    }
}
