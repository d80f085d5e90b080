use rustc_hash::FxHashSet;

use crate::simulation::coords::Cell;

/// Sparse live-cell set. Membership means alive; dead cells are never stored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LifeGrid {
    alive: FxHashSet<Cell>,
}

impl LifeGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_set(alive: FxHashSet<Cell>) -> Self {
        Self { alive }
    }

    pub fn from_cells<I: IntoIterator<Item = Cell>>(cells: I) -> Self {
        Self {
            alive: cells.into_iter().collect(),
        }
    }

    /// Order is unspecified; compare grids, not lists.
    pub fn to_cells(&self) -> Vec<Cell> {
        self.alive.iter().copied().collect()
    }

    /// Cells in row-major order, for stable output.
    pub fn sorted_cells(&self) -> Vec<Cell> {
        let mut cells = self.to_cells();
        cells.sort_unstable();
        cells
    }

    #[inline]
    pub fn is_alive(&self, cell: Cell) -> bool {
        self.alive.contains(&cell)
    }

    #[inline]
    pub fn population(&self) -> u64 {
        self.alive.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.alive.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Cell> + '_ {
        self.alive.iter().copied()
    }

    pub fn set_cell(&mut self, cell: Cell, alive: bool) {
        if alive {
            self.alive.insert(cell);
        } else {
            self.alive.remove(&cell);
        }
    }

    /// Flips `cell` in place and returns the new population.
    pub fn toggle(&mut self, cell: Cell) -> u64 {
        if !self.alive.remove(&cell) {
            self.alive.insert(cell);
        }
        self.population()
    }

    /// Copy of the grid with `cell` flipped.
    pub fn toggled(&self, cell: Cell) -> Self {
        let mut next = self.clone();
        next.toggle(cell);
        next
    }

    pub fn clear(&mut self) {
        self.alive.clear();
    }

    /// Inclusive `(top_left, bottom_right)` corners, `None` when empty.
    pub fn bounds(&self) -> Option<(Cell, Cell)> {
        let mut it = self.alive.iter();
        let first = *it.next()?;
        Some(it.fold((first, first), |(min, max), c| {
            (
                Cell::new(min.row.min(c.row), min.col.min(c.col)),
                Cell::new(max.row.max(c.row), max.col.max(c.col)),
            )
        }))
    }
}

impl FromIterator<Cell> for LifeGrid {
    fn from_iter<I: IntoIterator<Item = Cell>>(iter: I) -> Self {
        Self::from_cells(iter)
    }
}
