//! Error type for the MIDI codec crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MidiError {
    #[error("route id {0} is out of range (expected 0..16)")]
    RouteOutOfRange(i32),
    #[error("channel {0} is out of range (expected 0..4 grid)")]
    ChannelOutOfRange(usize),
    #[error("sysex buffer too small: need at least {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },
}

pub type MidiResult<T> = Result<T, MidiError>;
