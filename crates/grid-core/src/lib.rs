//! Cell and grid composition model: colors, coordinates, the `Cell`
//! capability interface, fader/encoder building blocks, the shared
//! controller bus, and the round-robin voice allocator.

pub mod bus;
pub mod cell;
pub mod color;
pub mod coord;
pub mod encoder;
pub mod error;
pub mod fader;
pub mod grid;
pub mod voice;

pub use bus::{Bus, BusTable, GridHandle, SENTINEL_GRID_ID};
pub use cell::{ButtonCell, Cell};
pub use color::Color;
pub use coord::{Coord, GRID_ID_POOL_SIZE};
pub use encoder::EncoderAcceleration;
pub use error::{GridError, GridResult};
pub use fader::{FaderCell, FaderColumn, Mode as FaderMode, Structure as FaderStructure};
pub use grid::{CompositeGrid, Grid, MenuButtonMode, MenuGrid, MenuRow, Message, PlainGrid, SwitcherGrid};
pub use voice::{Voice, VoiceAllocator};
