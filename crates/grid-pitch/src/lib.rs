//! The LameJuis logic-matrix pitch engine: six cascading input bits,
//! six boolean operations, three interval accumulators, co-mute-driven
//! per-output pitch enumeration, and the IndexArp sub-sequencer used to
//! walk a sorted pitch list by clocked index.

pub mod error;
pub mod index_arp;
pub mod matrix;
pub mod output;

pub use error::{PitchError, PitchResult};
pub use index_arp::{IndexArp, IndexArpConfig, NonagonIndexArp, NUM_CLOCKS, NUM_TRIOS, NUM_VOICES, VOICES_PER_TRIO};
pub use matrix::{
    Accumulator, InputBit, Interval, InputVector, LameJuis, LogicOperation, MatrixEvalResult, MatrixEvalResultWithPitch, MatrixSwitch,
    Operator, SwitchVal, NUM_ACCUMULATORS, NUM_INPUTS, NUM_OPERATIONS,
};
pub use output::{ChannelSelection, InputVectorIterator, Output, MAX_POLY};
