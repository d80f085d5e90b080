use rayon::prelude::*;
use rustc_hash::FxHashSet;

use crate::simulation::coords::Cell;
use crate::simulation::grid::LifeGrid;

/// Below this many candidates the rayon fan-out costs more than it saves.
const PARALLEL_THRESHOLD: usize = 4096;

/// B3/S23.
#[inline(always)]
pub fn next_state(alive: bool, live_neighbors: usize) -> bool {
    matches!((alive, live_neighbors), (true, 2 | 3) | (false, 3))
}

#[inline]
pub fn live_neighbors(grid: &LifeGrid, cell: Cell) -> usize {
    cell.neighbors().filter(|&n| grid.is_alive(n)).count()
}

/// Every live cell plus its Moore neighbourhood. Nothing outside this set
/// can change state in one generation.
pub fn candidate_set(grid: &LifeGrid) -> FxHashSet<Cell> {
    let mut to_evaluate =
        FxHashSet::with_capacity_and_hasher(grid.population() as usize * 9, Default::default());
    for pos in grid.iter() {
        to_evaluate.insert(pos);
        to_evaluate.extend(pos.neighbors());
    }
    to_evaluate
}

/// Computes the next generation.
///
/// All neighbour counts read from `grid`, the untouched previous generation;
/// the result is built in a fresh set.
pub fn step(grid: &LifeGrid) -> LifeGrid {
    if grid.is_empty() {
        return LifeGrid::new();
    }

    let survives = |&pos: &Cell| next_state(grid.is_alive(pos), live_neighbors(grid, pos));
    let to_evaluate = candidate_set(grid);

    if to_evaluate.len() < PARALLEL_THRESHOLD {
        return LifeGrid::from_set(to_evaluate.into_iter().filter(survives).collect());
    }

    let eval_list: Vec<Cell> = to_evaluate.into_iter().collect();
    let results: Vec<Cell> = eval_list.par_iter().filter(|c| survives(*c)).copied().collect();

    let mut next = FxHashSet::with_capacity_and_hasher(results.len(), Default::default());
    next.extend(results);
    LifeGrid::from_set(next)
}

/// Applies [`step`] `generations` times in sequence.
pub fn advance(grid: &LifeGrid, generations: u64) -> LifeGrid {
    let mut current = grid.clone();
    for _ in 0..generations {
        current = step(&current);
    }
    current
}
