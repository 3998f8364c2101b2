use alloc::vec::Vec;

use crate::*;

/// Byte length of the snapshot header: `x`, `y` and `mine_count` as
/// big-endian `u64`, followed by one state byte.
pub const SNAPSHOT_HEADER_SIZE: usize = 25;

/// Raw header fields of a snapshot buffer, decoded without semantic
/// validation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub size: (u64, u64),
    pub mine_count: u64,
    /// Raw state byte; not checked against the defined states.
    pub state: u8,
}

impl SnapshotInfo {
    /// Length in bytes of a cell-bearing snapshot with these dimensions.
    pub fn expected_size(&self) -> usize {
        let cells = self.size.0.saturating_mul(self.size.1);
        let cells = usize::try_from(cells).unwrap_or(usize::MAX);
        SNAPSHOT_HEADER_SIZE.saturating_add(cells)
    }
}

/// Decodes the header fields of `bytes` without judging them. Only the
/// length needed for the read itself is checked; run [`snapshot_test`]
/// before trusting anything further.
pub fn snapshot_values(bytes: &[u8]) -> Result<SnapshotInfo> {
    if bytes.len() < SNAPSHOT_HEADER_SIZE {
        return Err(GameError::InvalidSize);
    }
    Ok(SnapshotInfo {
        size: (read_u64(bytes, 0), read_u64(bytes, 8)),
        mine_count: read_u64(bytes, 16),
        state: bytes[SNAPSHOT_HEADER_SIZE - 1],
    })
}

/// Validates an untrusted snapshot buffer, structurally and semantically,
/// without ever reading past its end. A buffer that passes can be loaded
/// with [`Game::set_snapshot`].
pub fn snapshot_test(bytes: &[u8]) -> Result<()> {
    if bytes.len() < SNAPSHOT_HEADER_SIZE {
        return Err(GameError::InvalidSize);
    }

    let state_byte = bytes[SNAPSHOT_HEADER_SIZE - 1];
    if state_byte == GameState::Pristine.to_wire() && bytes.len() != SNAPSHOT_HEADER_SIZE {
        return Err(GameError::InvalidSize);
    }

    let state = match GameState::from_wire(state_byte) {
        None | Some(GameState::Initialized) => return Err(GameError::InvalidValue),
        Some(state) => state,
    };

    let x = read_u64(bytes, 0);
    let y = read_u64(bytes, 8);
    let mine_count = read_u64(bytes, 16);

    if x < MINIMUM_X_SIZE as u64
        || y < MINIMUM_Y_SIZE as u64
        || mine_count < MINIMUM_MINE_COUNT as u64
    {
        return Err(GameError::InvalidValue);
    }
    if x > Coord::MAX as u64 || y > Coord::MAX as u64 {
        return Err(GameError::TooBig);
    }
    let cell_count = (x as CellCount)
        .checked_mul(y as CellCount)
        .ok_or(GameError::TooBig)?;
    if mine_count > (cell_count as u64) - 1 {
        return Err(GameError::InvalidValue);
    }

    if state == GameState::Pristine {
        return Ok(());
    }
    if bytes.len() - SNAPSHOT_HEADER_SIZE != cell_count {
        return Err(GameError::InvalidSize);
    }
    test_cell_array(
        &bytes[SNAPSHOT_HEADER_SIZE..],
        (x as Coord, y as Coord),
        mine_count,
    )
}

/// Cross-checks the flat cell array against itself and the declared mine
/// count.
fn test_cell_array(cells: &[u8], size: Coord2, declared_mines: u64) -> Result<()> {
    let x_size = size.0 as usize;
    let mut mines: u64 = 0;
    let mut exploded_seen = false;

    for (index, &bits) in cells.iter().enumerate() {
        let cell = Cell::from_bits(bits);
        let point = ((index % x_size) as Coord, (index / x_size) as Coord);

        // A flag can not be disclosed, and only one exploded cell is
        // allowed.
        if cell.is_flagged() && cell.is_disclosed() {
            return Err(GameError::InvalidData);
        }
        if cell.is_exploded() {
            if exploded_seen {
                return Err(GameError::InvalidData);
            }
            exploded_seen = true;
        }

        // Placement raises the warning of every neighbor of a mine, so a
        // zero-warning cell next to a mine is impossible.
        if cell.is_mine() {
            mines += 1;
            for near in neighbors(point, size) {
                if cell_at(cells, x_size, near).warning() == 0 {
                    return Err(GameError::InvalidData);
                }
            }
        }

        // A nonzero warning must equal the actual number of adjacent mines.
        if cell.warning() != 0 {
            let actual = neighbors(point, size)
                .filter(|&near| cell_at(cells, x_size, near).is_mine())
                .count();
            if actual != cell.warning() as usize {
                return Err(GameError::InvalidData);
            }
        }
    }

    if mines != declared_mines {
        return Err(GameError::InvalidData);
    }
    Ok(())
}

fn cell_at(cells: &[u8], x_size: usize, (x, y): Coord2) -> Cell {
    Cell::from_bits(cells[y as usize * x_size + x as usize])
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    u64::from_be_bytes(bytes[at..at + 8].try_into().unwrap())
}

impl Game {
    /// Exact byte length [`Game::snapshot`] will produce for the current
    /// state.
    pub fn snapshot_size(&self) -> usize {
        if self.state.carries_cells() {
            SNAPSHOT_HEADER_SIZE + self.cells.len()
        } else {
            SNAPSHOT_HEADER_SIZE
        }
    }

    /// Serializes the full game state: the fixed header and, once mines
    /// have been placed, the raw cell array in row-major order.
    pub fn snapshot(&self) -> Vec<u8> {
        let (x_size, y_size) = self.size();
        let mut out = Vec::with_capacity(self.snapshot_size());
        out.extend_from_slice(&(x_size as u64).to_be_bytes());
        out.extend_from_slice(&(y_size as u64).to_be_bytes());
        out.extend_from_slice(&(self.mine_count as u64).to_be_bytes());
        out.push(self.state.to_wire());

        if self.state.carries_cells() {
            out.extend(self.cells.iter().map(|cell| cell.bits()));
        }
        out
    }

    /// Replaces the live state with a validated snapshot. The counters are
    /// recomputed from the restored cells, never taken from the wire. A
    /// buffer that fails validation leaves the live state untouched.
    pub fn set_snapshot(&mut self, bytes: &[u8]) -> Result<()> {
        snapshot_test(bytes)?;

        let x = read_u64(bytes, 0) as Coord;
        let y = read_u64(bytes, 8) as Coord;
        let mine_count = read_u64(bytes, 16) as CellCount;
        let state = GameState::from_wire(bytes[SNAPSHOT_HEADER_SIZE - 1])
            .ok_or(GameError::InvalidValue)?;

        self.reshape((x, y))?;
        self.state = state;
        self.mine_count = mine_count;
        self.flag_count = 0;
        self.remaining_count = self.cells.len() - mine_count;

        if state.carries_cells() {
            let payload = &bytes[SNAPSHOT_HEADER_SIZE..];
            for (cell, &bits) in self.cells.iter_mut().zip(payload) {
                *cell = Cell::from_bits(bits);
            }
            for &cell in self.cells.iter() {
                if cell.is_flagged() {
                    self.flag_count += 1;
                }
                if cell.is_disclosed() && !cell.is_mine() {
                    self.remaining_count -= 1;
                }
            }
        }

        log::debug!("restored a {:?} snapshot of {}x{}", state, x, y);
        Ok(())
    }
}
