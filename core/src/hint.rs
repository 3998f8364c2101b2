use alloc::vec::Vec;
use rand::RngExt;

use crate::*;

impl Game {
    /// Suggests a covered safe cell, preferring cells the player could
    /// reason about from visible numbers:
    ///
    /// - cells with a nonzero warning next to a disclosed cell,
    /// - then cells with a nonzero warning anywhere,
    /// - then any remaining covered safe cell.
    ///
    /// The pick is uniform within the best non-empty tier. On a pristine
    /// grid this seeds the mine field around a random cell and returns that
    /// cell. `None` when the game is over, not prepared, or no covered safe
    /// cell is left.
    pub fn hint(&mut self) -> Option<Coord2> {
        match self.state {
            GameState::Initialized | GameState::Exploded | GameState::Solved => return None,
            GameState::Pristine => {
                let (x_size, y_size) = self.size();
                let point = (
                    self.rng.random_range(0..x_size),
                    self.rng.random_range(0..y_size),
                );
                self.place_mines(point);
                return Some(point);
            }
            GameState::Playing => {}
        }

        let bounds = self.size();
        let mut tiers: [Vec<Coord2>; 3] = [Vec::new(), Vec::new(), Vec::new()];

        for ((row, col), &cell) in self.cells.indexed_iter() {
            if cell.is_disclosed() || cell.is_flagged() || cell.is_mine() {
                continue;
            }
            let point = (col as Coord, row as Coord);

            if cell.warning() == 0 {
                tiers[2].push(point);
            } else if neighbors(point, bounds)
                .any(|near| self.cells[near.to_nd_index()].is_disclosed())
            {
                tiers[0].push(point);
            } else {
                tiers[1].push(point);
            }
        }

        let tier = tiers.iter().find(|tier| !tier.is_empty())?;
        Some(tier[self.rng.random_range(0..tier.len())])
    }
}
