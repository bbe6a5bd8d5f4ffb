use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::Position;

/// Represents errors that can occur within the grid operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("Coordinates {pos} are out of bounds for grid size ({width}, {height})")]
    OutOfBounds {
        pos: Position,
        width: usize,
        height: usize,
    },
}

/// A generic 2D grid structure.
///
/// Stores elements of type `T` in a flat vector using row-major order. The
/// world keeps one `Grid<Option<_>>` per index, so an empty cell is an
/// explicit `None` rather than a synthesized default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Creates a new grid with the specified dimensions, filled with default values.
    ///
    /// # Panics
    ///
    /// Panics if `width * height` overflows `usize`.
    pub fn new(width: usize, height: usize) -> Self
    where
        T: Default + Clone,
    {
        let size = width.checked_mul(height).expect("Grid size overflow");
        Grid {
            width,
            height,
            cells: vec![T::default(); size],
        }
    }

    /// Returns the width of the grid.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the height of the grid.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Converts a position to a flat vector index.
    ///
    /// Returns `None` if the position is out of bounds.
    #[inline]
    fn to_index(&self, pos: Position) -> Option<usize> {
        if self.contains(pos) {
            Some(pos.y * self.width + pos.x)
        } else {
            None
        }
    }

    /// Checks if the given position is within the grid boundaries.
    #[inline]
    pub fn contains(&self, pos: Position) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    /// Gets an immutable reference to the cell at the given position.
    ///
    /// Returns `None` if the position is out of bounds.
    pub fn get(&self, pos: Position) -> Option<&T> {
        self.to_index(pos).and_then(|index| self.cells.get(index))
    }

    /// Gets a mutable reference to the cell at the given position.
    pub fn get_mut(&mut self, pos: Position) -> Option<&mut T> {
        let index = self.to_index(pos)?;
        self.cells.get_mut(index)
    }

    /// Sets the value of the cell at the given position.
    ///
    /// Returns `Err(GridError::OutOfBounds)` if the position is invalid.
    pub fn set(&mut self, pos: Position, value: T) -> Result<(), GridError> {
        let index = self.to_index(pos).ok_or(GridError::OutOfBounds {
            pos,
            width: self.width,
            height: self.height,
        })?;
        self.cells[index] = value;
        Ok(())
    }

    /// Returns an iterator that yields `(Position, &T)` for each cell in row-major order.
    pub fn enumerate(&self) -> impl Iterator<Item = (Position, &T)> {
        let width = self.width;
        self.cells
            .iter()
            .enumerate()
            .map(move |(index, cell)| (Position::new(index % width, index / width), cell))
    }
}

impl<T> Grid<Option<T>> {
    /// Takes the value out of a cell, leaving it empty.
    pub fn take(&mut self, pos: Position) -> Option<T> {
        self.get_mut(pos).and_then(Option::take)
    }

    /// Iterates over the occupied cells only.
    pub fn occupied(&self) -> impl Iterator<Item = (Position, &T)> {
        self.enumerate()
            .filter_map(|(pos, cell)| cell.as_ref().map(|value| (pos, value)))
    }
}

/// Indexing using Position coordinates for access
impl<T> Index<Position> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, pos: Position) -> &Self::Output {
        match self.to_index(pos) {
            Some(idx) => &self.cells[idx],
            None => panic!(
                "Grid index {} out of bounds for grid size ({}, {})",
                pos, self.width, self.height
            ),
        }
    }
}
