//! Error type for the control engine crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("route {0} is out of range (expected 0..16)")]
    RouteOutOfRange(usize),

    #[error("grid index {0} is not registered")]
    UnknownGrid(usize),

    #[error(transparent)]
    Modulation(#[from] grid_modulation::ModulationError),

    #[error(transparent)]
    Pitch(#[from] grid_pitch::PitchError),
}

pub type EngineResult<T> = Result<T, EngineError>;
