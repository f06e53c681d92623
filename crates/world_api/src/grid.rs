use serde::{Deserialize, Serialize};
use std::fmt;

/// Row-major index of a grid cell.
pub type Position = usize;

/// Width and height of the city grid, in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridDims {
    pub width: u32,
    pub height: u32,
}

impl GridDims {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of cells, or `None` if it does not fit in a `usize`.
    pub fn checked_cell_count(&self) -> Option<usize> {
        (self.width as usize).checked_mul(self.height as usize)
    }

    pub fn cell_count(&self) -> usize {
        self.checked_cell_count().unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, position: Position) -> bool {
        position < self.cell_count()
    }

    /// Converts a row-major index into `(x, y)`.
    pub fn coordinates(&self, position: Position) -> Option<(u32, u32)> {
        if self.is_empty() || !self.contains(position) {
            return None;
        }
        let width = self.width as usize;
        Some(((position % width) as u32, (position / width) as u32))
    }

    /// Converts `(x, y)` back into a row-major index.
    pub fn index(&self, x: u32, y: u32) -> Option<Position> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(x as usize + self.width as usize * y as usize)
    }
}

impl fmt::Display for GridDims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
