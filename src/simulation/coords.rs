use serde::{Deserialize, Serialize};

/// Offsets of the Moore neighbourhood, row-major, center excluded.
pub const NEIGHBOR_OFFSETS: [(i64, i64); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// A grid coordinate on the unbounded plane.
///
/// Rows grow downwards and columns grow to the right, matching pixel space.
/// Serialized as a `[row, col]` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(i64, i64)", into = "(i64, i64)")]
pub struct Cell {
    pub row: i64,
    pub col: i64,
}

impl Cell {
    pub const ORIGIN: Cell = Cell { row: 0, col: 0 };

    #[inline(always)]
    pub const fn new(row: i64, col: i64) -> Self {
        Self { row, col }
    }

    /// `None` when the result would leave the `i64` plane.
    #[inline(always)]
    pub const fn checked_offset(self, d_row: i64, d_col: i64) -> Option<Self> {
        match (self.row.checked_add(d_row), self.col.checked_add(d_col)) {
            (Some(row), Some(col)) => Some(Self::new(row, col)),
            _ => None,
        }
    }

    /// The surrounding coordinates. There is no wraparound: a cell on the
    /// edge of the `i64` range simply has fewer than eight.
    #[inline]
    pub fn neighbors(self) -> impl Iterator<Item = Cell> {
        NEIGHBOR_OFFSETS
            .into_iter()
            .filter_map(move |(dr, dc)| self.checked_offset(dr, dc))
    }
}

impl From<(i64, i64)> for Cell {
    fn from((row, col): (i64, i64)) -> Self {
        Self::new(row, col)
    }
}

impl From<Cell> for (i64, i64) {
    fn from(cell: Cell) -> Self {
        (cell.row, cell.col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbors_exclude_center_and_are_distinct() {
        let c = Cell::new(-3, 7);
        let n: Vec<Cell> = c.neighbors().collect();
        assert_eq!(n.len(), 8);
        assert!(!n.contains(&c));
        for (i, a) in n.iter().enumerate() {
            assert!((a.row - c.row).abs() <= 1 && (a.col - c.col).abs() <= 1);
            assert!(n[i + 1..].iter().all(|b| b != a));
        }
    }

    #[test]
    fn edge_cells_have_no_neighbours_past_the_range() {
        assert_eq!(Cell::new(0, i64::MIN).neighbors().count(), 5);
        assert_eq!(Cell::new(i64::MAX, i64::MAX).neighbors().count(), 3);
        assert!(
            Cell::new(i64::MAX, 0)
                .neighbors()
                .all(|n| n.row >= i64::MAX - 1)
        );
        assert_eq!(Cell::new(i64::MIN, 0).checked_offset(-1, 0), None);
    }

    #[test]
    fn serializes_as_pair() {
        let json = serde_json::to_string(&Cell::new(2, -5)).unwrap();
        assert_eq!(json, "[2,-5]");
        let back: Cell = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Cell::new(2, -5));
    }
}
