//! Error types for the grid composition model.

use thiserror::Error;

/// Errors raised by the cell/grid/bus layer.
#[derive(Error, Debug)]
pub enum GridError {
    #[error("no grid id available from the pool")]
    NoGridIdAvailable,

    #[error("grid id {0} is out of range")]
    GridIdOutOfRange(u8),

    #[error("coordinate ({0}, {1}) is outside the virtual grid space")]
    CoordinateOutOfRange(i32, i32),

    #[error("scene document field '{0}' has an invalid shape")]
    InvalidSceneField(&'static str),
}

/// Result type alias for this crate.
pub type GridResult<T> = Result<T, GridError>;
