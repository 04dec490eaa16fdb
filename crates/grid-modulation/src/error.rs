//! Error types for the modulation tree and scene document layers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModulationError {
    #[error("scene index {0} out of range (0..8)")]
    SceneOutOfRange(usize),

    #[error("track index {0} out of range")]
    TrackOutOfRange(usize),

    #[error("scene document error: {0}")]
    Document(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ModulationResult<T> = Result<T, ModulationError>;
