use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::fmt;
use ndarray::Array2;
use rand::rngs::SmallRng;
use rand::{RngExt, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::*;

pub const MINIMUM_X_SIZE: Coord = 4;
pub const MINIMUM_Y_SIZE: Coord = 4;
pub const MINIMUM_MINE_COUNT: CellCount = 2;

/// Lifecycle of a game.
///
/// Valid transitions:
/// - Initialized -> Pristine (on prepare)
/// - Pristine -> Playing (mine placement, on the first disclosure or hint)
/// - Playing -> Exploded | Solved (on disclosure outcome)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameState {
    Initialized,
    Pristine,
    Playing,
    Exploded,
    Solved,
}

impl GameState {
    /// Indicates the game has ended and no moves can be made anymore.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exploded | Self::Solved)
    }

    /// Whether a snapshot of this state carries the cell array.
    pub const fn carries_cells(self) -> bool {
        matches!(self, Self::Playing | Self::Exploded | Self::Solved)
    }

    pub const fn to_wire(self) -> u8 {
        match self {
            Self::Initialized => 0,
            Self::Pristine => 1,
            Self::Playing => 2,
            Self::Exploded => 3,
            Self::Solved => 4,
        }
    }

    pub const fn from_wire(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Initialized,
            1 => Self::Pristine,
            2 => Self::Playing,
            3 => Self::Exploded,
            4 => Self::Solved,
            _ => return None,
        })
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::Initialized
    }
}

/// Outcome of a [`Game::disclose`] call. Outcomes are signals the caller
/// branches on, not errors.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disclosure {
    /// One or more safe cells were revealed and the game continues.
    Disclosed,
    AlreadyDisclosed,
    IsFlag,
    MineFound,
    Solved,
}

impl Disclosure {
    /// Whether this outcome changed any cell.
    pub const fn has_update(self) -> bool {
        match self {
            Self::Disclosed | Self::MineFound | Self::Solved => true,
            Self::AlreadyDisclosed | Self::IsFlag => false,
        }
    }
}

/// Outcome of a [`Game::toggle_flag`] call.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlagOutcome {
    AlreadyDisclosed,
    Flagged,
    Unflagged,
}

impl FlagOutcome {
    /// New flag state, `None` when the cell was already disclosed.
    pub const fn flag_state(self) -> Option<bool> {
        match self {
            Self::AlreadyDisclosed => None,
            Self::Flagged => Some(true),
            Self::Unflagged => Some(false),
        }
    }
}

/// Synchronous notification of a stored-cell change.
///
/// The engine is mutably borrowed while the callback runs, so the callback
/// cannot re-enter the game object.
pub type CellUpdated = Box<dyn FnMut(Coord2, Cell)>;

/// The single owning game-state object: grid, counters, lifecycle state and
/// the randomness source feeding mine placement and hints.
pub struct Game {
    pub(crate) cells: Array2<Cell>,
    pub(crate) mine_count: CellCount,
    pub(crate) remaining_count: CellCount,
    pub(crate) flag_count: CellCount,
    pub(crate) state: GameState,
    pub(crate) rng: SmallRng,
    pub(crate) cell_updated: Option<CellUpdated>,
}

impl Game {
    pub fn new(seed: u64) -> Self {
        Self::with_rng(SmallRng::seed_from_u64(seed))
    }

    pub fn with_rng(rng: SmallRng) -> Self {
        Self {
            cells: Array2::default((0, 0)),
            mine_count: 0,
            remaining_count: 0,
            flag_count: 0,
            state: GameState::default(),
            rng,
            cell_updated: None,
        }
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    /// Grid dimensions `(x, y)`, `(0, 0)` before the first prepare.
    pub fn size(&self) -> Coord2 {
        let (rows, cols) = self.cells.dim();
        (cols as Coord, rows as Coord)
    }

    pub fn total_cells(&self) -> CellCount {
        self.cells.len()
    }

    pub fn mine_count(&self) -> CellCount {
        self.mine_count
    }

    pub fn flag_count(&self) -> CellCount {
        self.flag_count
    }

    pub fn cell_at(&self, coords: Coord2) -> Cell {
        self.cells[coords.to_nd_index()]
    }

    pub fn covered_count(&self) -> CellCount {
        self.total_cells() - self.disclosed_count()
    }

    pub fn disclosed_count(&self) -> CellCount {
        (self.total_cells() - self.mine_count) - self.remaining_count
    }

    /// Registers (or clears) the observer invoked after every stored-cell
    /// change.
    pub fn set_cell_updated(&mut self, callback: Option<CellUpdated>) {
        self.cell_updated = callback;
    }

    /// Sizes and zeroes the grid for a new game. On failure the previous
    /// state is left untouched.
    pub fn prepare(&mut self, size: Coord2, mine_count: CellCount) -> Result<()> {
        if size.0 < MINIMUM_X_SIZE || size.1 < MINIMUM_Y_SIZE {
            return Err(GameError::TooSmall);
        }
        let cell_count = area(size).ok_or(GameError::TooBig)?;
        if mine_count < MINIMUM_MINE_COUNT || mine_count > cell_count - 9 {
            return Err(GameError::InvalidArgument);
        }

        self.reshape(size)?;
        self.state = GameState::Pristine;
        self.mine_count = mine_count;
        self.flag_count = 0;
        self.remaining_count = cell_count - mine_count;
        Ok(())
    }

    /// Reveals a cell. A first disclosure on a pristine grid seeds the mine
    /// field around `coords` beforehand, so the first move never explodes.
    pub fn disclose(&mut self, coords: Coord2) -> Result<Disclosure> {
        let coords = self.validate_coords(coords)?;
        self.check_not_ended()?;

        if self.state == GameState::Pristine {
            self.place_mines(coords);
        }

        let cell = self.cells[coords.to_nd_index()];
        if cell.is_disclosed() {
            return Ok(Disclosure::AlreadyDisclosed);
        }
        if cell.is_flagged() {
            return Ok(Disclosure::IsFlag);
        }

        if cell.is_mine() {
            let target = &mut self.cells[coords.to_nd_index()];
            target.explode();
            let value = *target;
            self.state = GameState::Exploded;
            self.notify(coords, value);
            return Ok(Disclosure::MineFound);
        }

        self.flood_disclose(coords);

        if self.remaining_count == 0 {
            self.state = GameState::Solved;
            return Ok(Disclosure::Solved);
        }
        Ok(Disclosure::Disclosed)
    }

    /// Flips the flag on a covered cell. Valid in any non-terminal state,
    /// including before the first disclosure; flagging never seeds mines.
    pub fn toggle_flag(&mut self, coords: Coord2) -> Result<FlagOutcome> {
        let coords = self.validate_coords(coords)?;
        self.check_not_ended()?;

        let cell = &mut self.cells[coords.to_nd_index()];
        if cell.is_disclosed() {
            return Ok(FlagOutcome::AlreadyDisclosed);
        }

        let outcome = if cell.is_flagged() {
            cell.set_flag(false);
            self.flag_count -= 1;
            FlagOutcome::Unflagged
        } else {
            cell.set_flag(true);
            self.flag_count += 1;
            FlagOutcome::Flagged
        };

        let value = self.cells[coords.to_nd_index()];
        self.notify(coords, value);
        Ok(outcome)
    }

    /// Reveals every covered, unflagged mine, for end-of-game presentation.
    /// Counters are left untouched.
    pub fn disclose_all_mines(&mut self) {
        self.sweep(
            |cell| cell.is_mine() && !cell.is_disclosed() && !cell.is_flagged(),
            Cell::disclose,
        );
    }

    /// Flags every covered, unflagged mine, for end-of-game presentation.
    /// Counters are left untouched.
    pub fn flag_all_mines(&mut self) {
        self.sweep(
            |cell| cell.is_mine() && !cell.is_flagged() && !cell.is_disclosed(),
            |cell: &mut Cell| cell.set_flag(true),
        );
    }

    /// Force-discloses every remaining safe cell, clearing stale flags, and
    /// zeroes the win counter.
    pub fn resolve(&mut self) {
        self.sweep(
            |cell| !cell.is_mine() && !cell.is_disclosed(),
            |cell: &mut Cell| {
                cell.set_flag(false);
                cell.disclose();
            },
        );
        self.remaining_count = 0;
    }

    /// Seeds `mine_count` mines by rejection sampling, keeping a safe zone
    /// around `but`, and raises the warning count of every neighbor of each
    /// placed mine. Transitions the game to `Playing`.
    pub(crate) fn place_mines(&mut self, but: Coord2) {
        let bounds = self.size();
        let total = self.cells.len();
        // The full first-move exclusion needs up to 9 free cells; a restored
        // pristine snapshot may carry a mine count too high for that, so
        // fall back to excluding the start cell alone.
        let exclude_neighbors = self.mine_count + 9 <= total;
        if !exclude_neighbors {
            log::warn!(
                "{} mines in {} cells, shrinking the safe zone to the start cell",
                self.mine_count,
                total
            );
        }

        let mut left = self.mine_count;
        while left > 0 {
            let point = (
                self.rng.random_range(0..bounds.0),
                self.rng.random_range(0..bounds.1),
            );
            if point == but {
                continue;
            }
            if exclude_neighbors && in_safe_zone(point, but) {
                continue;
            }

            let cell = &mut self.cells[point.to_nd_index()];
            if cell.is_mine() {
                continue;
            }
            cell.set_mine();

            for near in neighbors(point, bounds) {
                self.cells[near.to_nd_index()].bump_warning();
            }
            left -= 1;
        }

        log::debug!("{} mines placed around safe cell {:?}", self.mine_count, but);
        self.state = GameState::Playing;
    }

    /// Iterative flood fill. The `disclosed | flag` test doubles as the
    /// visited check, so re-queued cells are skipped when popped.
    fn flood_disclose(&mut self, origin: Coord2) {
        let bounds = self.size();
        let mut queue = VecDeque::from([origin]);

        while let Some(point) = queue.pop_front() {
            let cell = &mut self.cells[point.to_nd_index()];
            if cell.is_disclosed() || cell.is_flagged() {
                continue;
            }

            cell.disclose();
            let value = *cell;
            self.remaining_count -= 1;
            self.notify(point, value);

            if value.warning() == 0 {
                queue.extend(neighbors(point, bounds));
            }
        }

        log::trace!(
            "flood fill from {:?} left {} safe cells covered",
            origin,
            self.remaining_count
        );
    }

    /// Marks every cell selected by `wants`, notifying the observer once per
    /// changed cell.
    fn sweep(&mut self, wants: fn(Cell) -> bool, mark: fn(&mut Cell)) {
        let mut callback = self.cell_updated.take();
        for ((row, col), cell) in self.cells.indexed_iter_mut() {
            if wants(*cell) {
                mark(cell);
                if let Some(callback) = callback.as_mut() {
                    callback((col as Coord, row as Coord), *cell);
                }
            }
        }
        self.cell_updated = callback;
    }

    fn notify(&mut self, coords: Coord2, cell: Cell) {
        if let Some(callback) = self.cell_updated.as_mut() {
            callback(coords, cell);
        }
    }

    /// (Re)sizes the cell array, reusing the existing allocation when the
    /// shape is unchanged. All cells end up zeroed.
    pub(crate) fn reshape(&mut self, size: Coord2) -> Result<()> {
        let dim = (size.1 as usize, size.0 as usize);
        if self.cells.dim() == dim {
            self.cells.fill(Cell::EMPTY);
        } else {
            self.cells = alloc_cells(dim)?;
        }
        Ok(())
    }

    fn validate_coords(&self, coords: Coord2) -> Result<Coord2> {
        let (x_size, y_size) = self.size();
        if coords.0 < x_size && coords.1 < y_size {
            Ok(coords)
        } else {
            Err(GameError::InvalidCoords)
        }
    }

    fn check_not_ended(&self) -> Result<()> {
        if self.state.is_terminal() {
            Err(GameError::AlreadyEnded)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Game")
            .field("size", &self.size())
            .field("state", &self.state)
            .field("mine_count", &self.mine_count)
            .field("flag_count", &self.flag_count)
            .field("remaining_count", &self.remaining_count)
            .finish_non_exhaustive()
    }
}

fn in_safe_zone(point: Coord2, but: Coord2) -> bool {
    point.0.abs_diff(but.0) <= 1 && point.1.abs_diff(but.1) <= 1
}

fn alloc_cells(dim: (usize, usize)) -> Result<Array2<Cell>> {
    let len = dim.0 * dim.1;
    let mut buf: Vec<Cell> = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| GameError::OutOfMemory)?;
    buf.resize(len, Cell::EMPTY);
    Ok(Array2::from_shape_vec(dim, buf).expect("buffer length matches shape"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use alloc::vec::Vec;
    use core::cell::RefCell;

    /// A playing-state game with a hand-placed mine layout.
    fn fixed_game(size: Coord2, mines: &[Coord2]) -> Game {
        let mut game = Game::new(0);
        game.prepare(size, mines.len()).unwrap();
        for &point in mines {
            game.cells[point.to_nd_index()].set_mine();
            for near in neighbors(point, size) {
                game.cells[near.to_nd_index()].bump_warning();
            }
        }
        game.state = GameState::Playing;
        game
    }

    fn count_mines(game: &Game) -> usize {
        game.cells.iter().filter(|cell| cell.is_mine()).count()
    }

    #[test]
    fn prepare_sets_up_a_pristine_grid() {
        let mut game = Game::new(1);

        game.prepare((9, 9), 10).unwrap();

        assert_eq!(game.state(), GameState::Pristine);
        assert_eq!(game.size(), (9, 9));
        assert_eq!(game.mine_count(), 10);
        assert_eq!(game.covered_count(), 81);
        assert_eq!(game.disclosed_count(), 0);
        assert_eq!(game.flag_count(), 0);
        assert_eq!(count_mines(&game), 0);
    }

    #[test]
    fn prepare_rejects_bad_arguments() {
        let mut game = Game::new(1);

        assert_eq!(game.prepare((3, 9), 10), Err(GameError::TooSmall));
        assert_eq!(game.prepare((9, 3), 10), Err(GameError::TooSmall));
        assert_eq!(game.prepare((9, 9), 1), Err(GameError::InvalidArgument));
        assert_eq!(game.prepare((9, 9), 73), Err(GameError::InvalidArgument));
        assert!(game.prepare((9, 9), 72).is_ok());
    }

    #[test]
    fn failed_prepare_keeps_existing_state() {
        let mut game = Game::new(1);
        game.prepare((9, 9), 10).unwrap();

        assert_eq!(game.prepare((9, 9), 999), Err(GameError::InvalidArgument));

        assert_eq!(game.state(), GameState::Pristine);
        assert_eq!(game.size(), (9, 9));
        assert_eq!(game.mine_count(), 10);
    }

    #[test]
    fn first_disclosure_keeps_its_neighborhood_clear() {
        let mut game = Game::new(1234);
        game.prepare((9, 9), 10).unwrap();

        let outcome = game.disclose((4, 4)).unwrap();

        assert_ne!(game.state(), GameState::Exploded);
        assert_ne!(outcome, Disclosure::MineFound);
        assert!(!game.cell_at((4, 4)).is_mine());
        for near in neighbors((4, 4), (9, 9)) {
            assert!(!game.cell_at(near).is_mine());
        }
        assert_eq!(count_mines(&game), 10);
        assert!(game.covered_count() < 81);
    }

    #[test]
    fn disclosing_again_reports_already_disclosed() {
        let mut game = Game::new(7);
        game.prepare((9, 9), 10).unwrap();
        game.disclose((4, 4)).unwrap();

        let before = game.disclosed_count();
        assert_eq!(game.disclose((4, 4)), Ok(Disclosure::AlreadyDisclosed));
        assert_eq!(game.disclosed_count(), before);
    }

    #[test]
    fn flagged_cell_is_not_disclosed() {
        let mut game = Game::new(7);
        game.prepare((9, 9), 10).unwrap();
        game.toggle_flag((0, 0)).unwrap();

        let outcome = game.disclose((0, 0)).unwrap();

        // The first disclosure still seeds the field, then bounces off the
        // flag.
        assert_eq!(outcome, Disclosure::IsFlag);
        assert_eq!(game.state(), GameState::Playing);
        assert_eq!(game.covered_count(), 81);
        assert_eq!(game.flag_count(), 1);
    }

    #[test]
    fn flagging_before_first_disclosure_keeps_the_grid_pristine() {
        let mut game = Game::new(7);
        game.prepare((9, 9), 10).unwrap();

        assert_eq!(game.toggle_flag((2, 2)), Ok(FlagOutcome::Flagged));

        assert_eq!(game.state(), GameState::Pristine);
        assert_eq!(count_mines(&game), 0);
    }

    #[test]
    fn toggle_flag_flips_and_counts() {
        let mut game = fixed_game((4, 4), &[(0, 0), (1, 0)]);

        assert_eq!(game.toggle_flag((2, 2)), Ok(FlagOutcome::Flagged));
        assert_eq!(game.flag_count(), 1);

        // With (2, 2) flagged the fill cannot finish the board, so the game
        // stays in progress.
        game.disclose((3, 3)).unwrap();
        assert_eq!(game.toggle_flag((3, 3)), Ok(FlagOutcome::AlreadyDisclosed));
        assert_eq!(game.flag_count(), 1);

        assert_eq!(game.toggle_flag((2, 2)), Ok(FlagOutcome::Unflagged));
        assert_eq!(game.flag_count(), 0);
    }

    #[test]
    fn flood_fill_discloses_the_connected_zero_region() {
        let mut game = fixed_game((4, 4), &[(0, 0), (1, 0)]);

        let outcome = game.disclose((3, 3)).unwrap();

        // Every safe cell is reachable from (3, 3), so the fill wins the
        // game outright.
        assert_eq!(outcome, Disclosure::Solved);
        assert_eq!(game.state(), GameState::Solved);
        assert_eq!(game.disclosed_count(), 14);
        assert_eq!(game.covered_count(), 2);
    }

    #[test]
    fn flood_fill_stops_at_flags() {
        let mut game = fixed_game((4, 4), &[(0, 0), (1, 0)]);
        game.toggle_flag((2, 2)).unwrap();

        let outcome = game.disclose((3, 3)).unwrap();

        assert_eq!(outcome, Disclosure::Disclosed);
        assert!(!game.cell_at((2, 2)).is_disclosed());
        assert_eq!(game.disclosed_count(), 13);

        game.toggle_flag((2, 2)).unwrap();
        assert_eq!(game.disclose((2, 2)), Ok(Disclosure::Solved));
    }

    #[test]
    fn disclosing_a_mine_ends_the_game() {
        let mut game = fixed_game((4, 4), &[(0, 0), (1, 0)]);

        assert_eq!(game.disclose((0, 0)), Ok(Disclosure::MineFound));

        let cell = game.cell_at((0, 0));
        assert!(cell.is_exploded() && cell.is_disclosed() && cell.is_mine());
        assert_eq!(game.state(), GameState::Exploded);

        assert_eq!(game.disclose((3, 3)), Err(GameError::AlreadyEnded));
        assert_eq!(game.toggle_flag((3, 3)), Err(GameError::AlreadyEnded));
    }

    #[test]
    fn out_of_bounds_coordinates_are_rejected() {
        let mut game = Game::new(3);
        assert_eq!(game.disclose((0, 0)), Err(GameError::InvalidCoords));

        game.prepare((4, 4), 2).unwrap();
        assert_eq!(game.disclose((4, 0)), Err(GameError::InvalidCoords));
        assert_eq!(game.toggle_flag((0, 4)), Err(GameError::InvalidCoords));
    }

    #[test]
    fn disclose_all_mines_reveals_unflagged_mines_only() {
        let mut game = fixed_game((4, 4), &[(0, 0), (1, 0), (3, 0)]);
        game.toggle_flag((1, 0)).unwrap();
        game.disclose((0, 0)).unwrap();

        game.disclose_all_mines();

        assert!(game.cell_at((3, 0)).is_disclosed());
        // A flagged mine keeps its flag instead of being force-disclosed.
        let flagged = game.cell_at((1, 0));
        assert!(flagged.is_flagged() && !flagged.is_disclosed());
    }

    #[test]
    fn flag_all_mines_marks_mines_without_touching_counters() {
        let mut game = fixed_game((4, 4), &[(0, 0), (1, 0)]);
        game.disclose((3, 3)).unwrap();

        game.flag_all_mines();

        assert!(game.cell_at((0, 0)).is_flagged());
        assert!(game.cell_at((1, 0)).is_flagged());
        assert_eq!(game.flag_count(), 0);
    }

    #[test]
    fn resolve_discloses_every_safe_cell() {
        let mut game = fixed_game((4, 4), &[(0, 0), (1, 0)]);
        game.toggle_flag((2, 2)).unwrap();

        game.resolve();

        let cleared = game.cell_at((2, 2));
        assert!(cleared.is_disclosed() && !cleared.is_flagged());
        assert_eq!(game.disclosed_count(), 14);
        assert_eq!(game.covered_count(), 2);
        assert!(!game.cell_at((0, 0)).is_disclosed());
    }

    #[test]
    fn observer_reports_each_cell_change() {
        let updates = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&updates);

        let mut game = fixed_game((4, 4), &[(0, 0), (1, 0)]);
        game.set_cell_updated(Some(Box::new(move |coords, cell| {
            sink.borrow_mut().push((coords, cell));
        })));

        game.toggle_flag((2, 2)).unwrap();
        game.disclose((3, 3)).unwrap();

        {
            let seen = updates.borrow();
            assert_eq!(seen.len(), 14);
            assert_eq!(seen[0].0, (2, 2));
            assert!(seen[0].1.is_flagged());
            assert!(seen[1..].iter().all(|(_, cell)| cell.is_disclosed()));
        }

        game.set_cell_updated(None);
        game.toggle_flag((2, 2)).unwrap();
        assert_eq!(updates.borrow().len(), 14);
    }

    #[test]
    fn state_wire_bytes_round_trip() {
        for state in [
            GameState::Initialized,
            GameState::Pristine,
            GameState::Playing,
            GameState::Exploded,
            GameState::Solved,
        ] {
            assert_eq!(GameState::from_wire(state.to_wire()), Some(state));
        }
        assert_eq!(GameState::from_wire(5), None);
        assert_eq!(serde_json::to_string(&GameState::Playing).unwrap(), "\"Playing\"");
    }
}
