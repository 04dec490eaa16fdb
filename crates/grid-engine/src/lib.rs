//! Ties the wire-level message bus to the per-frame control loop: the
//! pitch matrix, the encoder modulation tree, the grid layer, and the
//! voice allocator all advance together from [`control_engine::ControlEngine::process_frame`].

pub mod control_engine;
pub mod error;
pub mod message_bus;

pub use control_engine::{ControlEngine, RouteTarget, MAX_ROUTES};
pub use error::{EngineError, EngineResult};
pub use message_bus::{InputBus, INPUT_BUS_CAPACITY};
