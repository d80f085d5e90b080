use bevy::prelude::*;

use crate::persistence::{GameSnapshot, PanOffset};
use crate::simulation::coords::Cell;
use crate::simulation::engine;
use crate::simulation::grid::LifeGrid;
use crate::simulation::patterns::Preset;

/// The live game: current generation and how many steps produced it.
///
/// Only systems holding `ResMut<LifeSession>` can change it, so a step and a
/// pointer toggle never interleave.
#[derive(Resource, Clone, Debug, Default, PartialEq, Eq)]
pub struct LifeSession {
    grid: LifeGrid,
    generation: u64,
}

impl LifeSession {
    pub fn new(grid: LifeGrid) -> Self {
        Self {
            grid,
            generation: 0,
        }
    }

    pub fn grid(&self) -> &LifeGrid {
        &self.grid
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn population(&self) -> u64 {
        self.grid.population()
    }

    /// One generation forward. Returns the new population.
    pub fn advance(&mut self) -> u64 {
        self.grid = engine::step(&self.grid);
        self.generation += 1;
        self.grid.population()
    }

    pub fn advance_by(&mut self, generations: u64) -> u64 {
        for _ in 0..generations {
            self.advance();
        }
        self.grid.population()
    }

    /// Flips one cell. Returns the refreshed population.
    pub fn toggle(&mut self, cell: Cell) -> u64 {
        self.grid.toggle(cell)
    }

    pub fn reset(&mut self) {
        self.grid.clear();
        self.generation = 0;
    }

    /// Replaces the board and restarts counting from generation 0.
    pub fn load_grid(&mut self, grid: LifeGrid) {
        self.grid = grid;
        self.generation = 0;
    }

    pub fn load_preset(&mut self, preset: &Preset, center: Cell) {
        self.load_grid(preset.placed_at(center));
    }

    pub fn snapshot(&self, pan: PanOffset, cell_size: f64) -> GameSnapshot {
        GameSnapshot {
            live_cells: self.grid.sorted_cells(),
            pan,
            cell_size,
            generation: self.generation,
            population: self.grid.population(),
        }
    }

    pub fn restore(&mut self, snapshot: &GameSnapshot) {
        self.grid = LifeGrid::from_cells(snapshot.live_cells.iter().copied());
        self.generation = snapshot.generation;
        if self.grid.population() != snapshot.population {
            debug!(
                "snapshot population {} disagrees with {} stored cells",
                snapshot.population,
                self.grid.population()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::patterns::find_preset;

    #[test]
    fn generation_counts_every_step_even_when_nothing_changes() {
        let mut session = LifeSession::default();
        session.advance();
        session.advance();
        assert_eq!(session.generation(), 2);
        assert_eq!(session.population(), 0);
    }

    #[test]
    fn batch_of_zero_is_a_no_op() {
        let mut session = LifeSession::new(find_preset("glider").unwrap().placed_at(Cell::ORIGIN));
        let before = session.clone();
        session.advance_by(0);
        assert_eq!(session, before);
    }

    #[test]
    fn batch_of_23_equals_23_single_steps() {
        let start = find_preset("glider").unwrap().placed_at(Cell::ORIGIN);
        let mut batched = LifeSession::new(start.clone());
        let mut stepped = LifeSession::new(start);

        batched.advance_by(23);
        for _ in 0..23 {
            stepped.advance();
        }

        assert_eq!(batched, stepped);
        assert_eq!(batched.generation(), 23);
    }

    #[test]
    fn toggle_reports_population() {
        let mut session = LifeSession::default();
        assert_eq!(session.toggle(Cell::new(3, 3)), 1);
        assert_eq!(session.toggle(Cell::new(3, 3)), 0);
    }

    #[test]
    fn snapshot_round_trip() {
        let mut session = LifeSession::new(find_preset("beacon").unwrap().placed_at(Cell::new(-7, 2)));
        session.advance_by(5);
        let snapshot = session.snapshot(PanOffset { x: 12.5, y: -3.0 }, 30.0);
        assert_eq!(snapshot.population, session.population());

        let mut restored = LifeSession::default();
        restored.restore(&snapshot);
        assert_eq!(restored, session);
    }

    #[test]
    fn reset_clears_board_and_counter() {
        let mut session = LifeSession::new(find_preset("block").unwrap().placed_at(Cell::ORIGIN));
        session.advance();
        session.reset();
        assert_eq!(session, LifeSession::default());
    }
}
