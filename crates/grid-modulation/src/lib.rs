//! Encoder modulation tree: scene blending, per-cell state storage, the
//! modulator/gesture tree, the 4x4 encoder bank, and the scene document
//! JSON layer used to save/load a bank's full state.

pub mod bank;
pub mod document;
pub mod error;
pub mod modulator;
pub mod scene;
pub mod state_cell;

pub use bank::{EncoderBank, BANK_HEIGHT, BANK_WIDTH};
pub use document::{apply_document, bank_to_document, from_json, to_json, BankDocument, CellDocument, NonagonDocument};
pub use error::{ModulationError, ModulationResult};
pub use modulator::{Bits16, EncoderType, ModulatorNode, ModulatorValues, SharedEncoderState, NUM_GESTURES, NUM_MODULATORS};
pub use scene::{scene_value, SceneManager, NUM_SCENES};
pub use state_cell::{StateCell, MAX_POLY};
