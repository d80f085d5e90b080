use crate::simulation::coords::Cell;
use crate::simulation::grid::LifeGrid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatternKind {
    StillLife,
    Oscillator,
    Spaceship,
}

/// A built-in starting pattern, drawn as rows of `0`/`1`.
#[derive(Debug, PartialEq, Eq)]
pub struct Preset {
    pub key: &'static str,
    pub name: &'static str,
    pub kind: PatternKind,
    pub rows: &'static [&'static str],
}

pub const PRESETS: &[Preset] = &[
    Preset {
        key: "block",
        name: "Block",
        kind: PatternKind::StillLife,
        rows: &["0000", "0110", "0110", "0000"],
    },
    Preset {
        key: "beehive",
        name: "Beehive",
        kind: PatternKind::StillLife,
        rows: &["0110", "1001", "0110"],
    },
    Preset {
        key: "blinker",
        name: "Blinker",
        kind: PatternKind::Oscillator,
        rows: &["010", "010", "010"],
    },
    Preset {
        key: "beacon",
        name: "Beacon",
        kind: PatternKind::Oscillator,
        rows: &["1100", "1100", "0011", "0011"],
    },
    Preset {
        key: "glider",
        name: "Glider",
        kind: PatternKind::Spaceship,
        rows: &["010", "001", "111"],
    },
];

pub fn find_preset(key: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.key.eq_ignore_ascii_case(key))
}

impl Preset {
    pub fn height(&self) -> i64 {
        self.rows.len() as i64
    }

    pub fn width(&self) -> i64 {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0) as i64
    }

    /// Live cells relative to the pattern's top-left corner.
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        self.rows.iter().enumerate().flat_map(|(row, line)| {
            line.bytes()
                .enumerate()
                .filter(|&(_, b)| b == b'1')
                .map(move |(col, _)| Cell::new(row as i64, col as i64))
        })
    }

    /// The pattern with its bounding box centred on `center`. Cells that
    /// would fall off the `i64` plane are dropped.
    pub fn placed_at(&self, center: Cell) -> LifeGrid {
        let Some(top_left) = center.checked_offset(-(self.height() / 2), -(self.width() / 2)) else {
            return LifeGrid::new();
        };
        self.cells()
            .filter_map(|c| top_left.checked_offset(c.row, c.col))
            .collect()
    }
}
