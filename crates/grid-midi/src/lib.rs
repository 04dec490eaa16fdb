//! MIDI-to-controller codec: Launchpad and encoder note mapping, vendor
//! sysex color writers, and route-id dispatch between them.

pub mod encoder;
pub mod error;
pub mod launchpad;
pub mod raw;
pub mod route;
pub mod yaeltex;

pub use encoder::{EncoderCellState, EncoderMidiWriter};
pub use error::{MidiError, MidiResult};
pub use launchpad::{LaunchpadShape, LpSysexWriter};
pub use raw::{MessageIn, Mode, RawMidi};
pub use route::{RouteType, Router, NUM_ROUTES};
pub use yaeltex::{rgb_to_yaeltex_code, YaeltexSysexWriter};
