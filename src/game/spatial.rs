//! Uniform-grid spatial hash for radius queries
//!
//! Divides the world into square cells and buckets entity ids by the cell
//! their position falls in. Queries return every id in the cells overlapping
//! the query disc, an approximate superset; callers apply the exact distance check.
//!
//! `insert` hands back the `CellKey` the id was stored under. Removal must
//! present that same key, which makes it a single bucket lookup.

use crate::util::vec2::Vec2;
use rustc_hash::FxHashMap;

/// Initial capacity for grid cells (number of expected non-empty cells)
const GRID_INITIAL_CAPACITY: usize = 1024;

/// Initial capacity for id vectors within cells
const CELL_INITIAL_CAPACITY: usize = 8;

/// Grid cell coordinate an id was stored under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellKey {
    cx: i32,
    cy: i32,
}

impl CellKey {
    #[inline]
    pub fn coords(&self) -> (i32, i32) {
        (self.cx, self.cy)
    }
}

/// Spatial hash grid over copyable ids
#[derive(Debug, Clone)]
pub struct SpatialGrid<Id> {
    /// Cell size in world units
    cell_size: f32,
    /// Inverse cell size for fast position-to-cell conversion
    inv_cell_size: f32,
    /// Map from cell key to the ids in that cell
    cells: FxHashMap<CellKey, Vec<Id>>,
    /// Total stored ids
    len: usize,
}

impl<Id: Copy + Eq> SpatialGrid<Id> {
    /// Create a new spatial grid with the given cell size
    pub fn new(cell_size: f32) -> Self {
        let cell_size = if cell_size > 0.0 { cell_size } else { 1.0 };
        let mut cells = FxHashMap::default();
        cells.reserve(GRID_INITIAL_CAPACITY);
        Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            cells,
            len: 0,
        }
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Clear all ids, keeping cell allocations for reuse
    #[inline]
    pub fn clear(&mut self) {
        for cell in self.cells.values_mut() {
            cell.clear();
        }
        self.len = 0;
    }

    /// Convert world position to cell key
    #[inline]
    pub fn position_to_cell(&self, position: Vec2) -> CellKey {
        CellKey {
            cx: (position.x * self.inv_cell_size).floor() as i32,
            cy: (position.y * self.inv_cell_size).floor() as i32,
        }
    }

    /// Insert an id at a position; returns the key needed to remove it
    #[inline]
    pub fn insert(&mut self, id: Id, position: Vec2) -> CellKey {
        let key = self.position_to_cell(position);
        self.cells
            .entry(key)
            .or_insert_with(|| Vec::with_capacity(CELL_INITIAL_CAPACITY))
            .push(id);
        self.len += 1;
        key
    }

    /// Remove an id from the cell it was inserted under.
    /// Returns true if the id was found and removed.
    pub fn remove(&mut self, id: Id, key: CellKey) -> bool {
        if let Some(cell) = self.cells.get_mut(&key) {
            if let Some(idx) = cell.iter().position(|&stored| stored == id) {
                cell.swap_remove(idx);
                self.len -= 1;
                return true;
            }
        }
        false
    }

    /// Ids stored in every cell overlapping the disc `(position, radius)`
    pub fn query_radius(&self, position: Vec2, radius: f32) -> impl Iterator<Item = Id> + '_ {
        let center = self.position_to_cell(position);
        let radius = if radius.is_finite() { radius.max(0.0) } else { 0.0 };
        let cell_radius = (radius * self.inv_cell_size).ceil() as i32;

        (-cell_radius..=cell_radius).flat_map(move |dx| {
            (-cell_radius..=cell_radius).flat_map(move |dy| {
                let key = CellKey {
                    cx: center.cx + dx,
                    cy: center.cy + dy,
                };
                self.cells
                    .get(&key)
                    .into_iter()
                    .flat_map(|cell| cell.iter().copied())
            })
        })
    }

    /// Rebuild the grid from scratch
    pub fn rebuild(&mut self, entries: impl Iterator<Item = (Id, Vec2)>) {
        self.clear();
        for (id, position) in entries {
            self.insert(id, position);
        }
    }

    /// Total stored ids
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get statistics about the grid
    pub fn stats(&self) -> SpatialGridStats {
        let non_empty_cells = self.cells.values().filter(|c| !c.is_empty()).count();
        let max_per_cell = self.cells.values().map(|c| c.len()).max().unwrap_or(0);

        SpatialGridStats {
            non_empty_cells,
            total_entities: self.len,
            max_per_cell,
        }
    }
}

/// Statistics about the spatial grid
#[derive(Debug, Clone)]
pub struct SpatialGridStats {
    pub non_empty_cells: usize,
    pub total_entities: usize,
    pub max_per_cell: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_grid() {
        let grid: SpatialGrid<u64> = SpatialGrid::new(64.0);
        assert_eq!(grid.cell_size(), 64.0);
        assert!(grid.is_empty());
    }

    #[test]
    fn test_insert_and_query() {
        let mut grid = SpatialGrid::new(64.0);
        grid.insert(7u64, Vec2::new(100.0, 100.0));

        let results: Vec<_> = grid.query_radius(Vec2::new(100.0, 100.0), 20.0).collect();
        assert_eq!(results, vec![7]);
    }

    #[test]
    fn test_negative_coordinates_use_floor() {
        let grid: SpatialGrid<u64> = SpatialGrid::new(64.0);
        assert_eq!(grid.position_to_cell(Vec2::new(-1.0, -1.0)).coords(), (-1, -1));
        assert_eq!(grid.position_to_cell(Vec2::new(0.0, 63.9)).coords(), (0, 0));
    }

    #[test]
    fn test_query_covers_radius_across_cells() {
        let mut grid = SpatialGrid::new(50.0);
        grid.insert(1u64, Vec2::new(0.0, 0.0));
        grid.insert(2u64, Vec2::new(180.0, 0.0));
        grid.insert(3u64, Vec2::new(1000.0, 0.0));

        let results: Vec<_> = grid.query_radius(Vec2::ZERO, 200.0).collect();
        assert!(results.contains(&1));
        assert!(results.contains(&2));
        assert!(!results.contains(&3));
    }

    #[test]
    fn test_remove_requires_matching_key() {
        let mut grid = SpatialGrid::new(64.0);
        let key = grid.insert(1u64, Vec2::new(10.0, 10.0));
        let other = grid.position_to_cell(Vec2::new(500.0, 500.0));

        assert!(!grid.remove(1, other));
        assert_eq!(grid.len(), 1);
        assert!(grid.remove(1, key));
        assert!(!grid.remove(1, key));
        assert!(grid.is_empty());
    }

    #[test]
    fn test_clear_and_rebuild() {
        let mut grid = SpatialGrid::new(64.0);
        grid.insert(1u64, Vec2::new(100.0, 100.0));
        grid.clear();
        assert_eq!(grid.query_radius(Vec2::new(100.0, 100.0), 50.0).count(), 0);

        grid.rebuild(vec![(2u64, Vec2::ZERO), (3u64, Vec2::new(10.0, 0.0))].into_iter());
        assert_eq!(grid.len(), 2);
        assert_eq!(grid.query_radius(Vec2::ZERO, 5.0).count(), 2);
    }

    #[test]
    fn test_non_finite_radius_queries_home_cell() {
        let mut grid = SpatialGrid::new(64.0);
        grid.insert(1u64, Vec2::new(10.0, 10.0));
        grid.insert(2u64, Vec2::new(1000.0, 10.0));
        let results: Vec<_> = grid.query_radius(Vec2::new(10.0, 10.0), f32::NAN).collect();
        assert_eq!(results, vec![1]);
    }

    #[test]
    fn test_stats() {
        let mut grid = SpatialGrid::new(64.0);
        for id in 0..3u64 {
            grid.insert(id, Vec2::new(100.0, 100.0));
        }
        grid.insert(3, Vec2::new(500.0, 500.0));

        let stats = grid.stats();
        assert_eq!(stats.total_entities, 4);
        assert_eq!(stats.non_empty_cells, 2);
        assert_eq!(stats.max_per_cell, 3);
    }
}
