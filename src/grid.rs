use crate::rules::TribeSet;

/// Dense toroidal grid of tribe indices, row-major.
///
/// Coordinate arithmetic always wraps modulo `cols`/`rows`, so there are no
/// boundary cells and callers may pass coordinates outside the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    pub cols: u32,
    pub rows: u32,
    pub cells: Vec<u8>,
}

impl Grid {
    /// Allocate a grid with every cell set to `fill`.
    pub fn new(cols: u32, rows: u32, fill: u8) -> Self {
        Self {
            cols,
            rows,
            cells: vec![fill; (cols * rows) as usize],
        }
    }

    /// Row-major index of the toroidally wrapped coordinate.
    pub fn wrap_index(&self, x: i32, y: i32) -> usize {
        let w = self.cols as i32;
        let h = self.rows as i32;
        let wx = ((x % w) + w) % w;
        let wy = ((y % h) + h) % h;
        (wy * w + wx) as usize
    }

    /// Tribe index at the (wrapped) coordinate.
    pub fn get(&self, x: i32, y: i32) -> u8 {
        self.cells[self.wrap_index(x, y)]
    }

    /// Overwrite the tribe index at the (wrapped) coordinate.
    pub fn set(&mut self, x: i32, y: i32, tribe: u8) {
        let i = self.wrap_index(x, y);
        self.cells[i] = tribe;
    }

    /// Reset every cell to `fill`.
    pub fn fill(&mut self, fill: u8) {
        self.cells.fill(fill);
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Count the 8 Moore neighbors of `(x, y)` whose tribe is in `set`.
    /// The center cell itself is excluded.
    pub fn count_neighbors(&self, x: i32, y: i32, set: TribeSet) -> u8 {
        let mut n = 0;
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                if set.contains(self.get(x + dx, y + dy)) {
                    n += 1;
                }
            }
        }
        n
    }

    /// Count cells holding any tribe other than `dead`.
    pub fn population(&self, dead: u8) -> u64 {
        self.cells.iter().filter(|&&c| c != dead).count() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_of(indices: &[u8]) -> TribeSet {
        let mut s = TribeSet::EMPTY;
        for &i in indices {
            s.insert(i);
        }
        s
    }

    #[test]
    fn test_grid_new() {
        let grid = Grid::new(10, 5, 0);
        assert_eq!(grid.len(), 50);
        assert_eq!(grid.population(0), 0);
    }

    #[test]
    fn test_grid_set_get() {
        let mut grid = Grid::new(10, 10, 0);
        grid.set(3, 4, 2);
        assert_eq!(grid.get(3, 4), 2);
        assert_eq!(grid.get(0, 0), 0);
    }

    #[test]
    fn test_grid_wrapping() {
        let mut grid = Grid::new(10, 10, 0);
        grid.set(-1, -1, 1);
        assert_eq!(grid.get(9, 9), 1);
        grid.set(10, 10, 1);
        assert_eq!(grid.get(0, 0), 1);
    }

    #[test]
    fn test_neighbor_count_wraps_at_origin() {
        let mut grid = Grid::new(5, 4, 0);
        // All four wrap-around neighbors of (0, 0).
        grid.set(4, 3, 1);
        grid.set(4, 0, 1);
        grid.set(0, 3, 1);
        grid.set(1, 1, 1);
        assert_eq!(grid.count_neighbors(0, 0, set_of(&[1])), 4);
    }

    #[test]
    fn test_neighbor_count_excludes_center() {
        let mut grid = Grid::new(5, 5, 0);
        grid.set(2, 2, 1);
        assert_eq!(grid.count_neighbors(2, 2, set_of(&[1])), 0);
    }

    #[test]
    fn test_neighbor_count_filters_by_set() {
        let mut grid = Grid::new(5, 5, 0);
        grid.set(1, 1, 1);
        grid.set(3, 1, 2);
        grid.set(2, 3, 3);
        assert_eq!(grid.count_neighbors(2, 2, set_of(&[1])), 1);
        assert_eq!(grid.count_neighbors(2, 2, set_of(&[1, 2])), 2);
        assert_eq!(grid.count_neighbors(2, 2, set_of(&[1, 2, 3])), 3);
    }

    #[test]
    fn test_grid_fill_and_population() {
        let mut grid = Grid::new(4, 4, 0);
        grid.fill(2);
        assert_eq!(grid.population(0), 16);
        grid.fill(0);
        assert_eq!(grid.population(0), 0);
    }
}
