use thiserror::Error;

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Grid dimensions below the supported minimum")]
    TooSmall,
    #[error("Cell count overflows size arithmetic")]
    TooBig,
    #[error("Mine count out of range for the grid size")]
    InvalidArgument,
    #[error("Cell array allocation failed")]
    OutOfMemory,
    #[error("Coordinates outside the grid")]
    InvalidCoords,
    #[error("Game already ended, no new moves are accepted")]
    AlreadyEnded,
    #[error("Snapshot length does not match its declared state")]
    InvalidSize,
    #[error("Snapshot header field out of its domain")]
    InvalidValue,
    #[error("Snapshot cell array inconsistent with its header")]
    InvalidData,
}

pub type Result<T> = core::result::Result<T, GameError>;
