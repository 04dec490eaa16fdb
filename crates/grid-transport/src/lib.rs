//! Wire transport: the nonblocking socket, the delta-compressed event
//! protocol, the lock-free SPSC rings that hand events between threads,
//! and the background session file writer.

pub mod error;
pub mod event;
pub mod file_writer;
pub mod protocol;
pub mod ring;
pub mod socket;

pub use error::{TransportError, TransportResult};
pub use event::{to_index, to_x, to_y, ColorRemember, Event, EventType, GRID_HEIGHT, GRID_WIDTH};
pub use file_writer::{read_session, FileWriter, FileWriterConfig};
pub use protocol::{MultiWriter, Protocol};
pub use ring::{ChunkRing, Ring};
pub use socket::Socket;
