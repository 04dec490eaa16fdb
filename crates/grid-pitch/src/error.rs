//! Error type for the logic-matrix pitch engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PitchError {
    #[error("input index {0} out of range (0..6)")]
    InputOutOfRange(usize),

    #[error("accumulator index {0} out of range (0..3)")]
    AccumulatorOutOfRange(usize),

    #[error("poly channel {0} out of range")]
    ChannelOutOfRange(usize),
}

pub type PitchResult<T> = Result<T, PitchError>;
