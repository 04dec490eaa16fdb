//! Error types for the wire transport layer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection closed")]
    Closed,
}

pub type TransportResult<T> = Result<T, TransportError>;
