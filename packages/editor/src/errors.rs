//! Error types for the editor

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("Invalid range: from {from} is after to {to}")]
    InvalidRange { from: usize, to: usize },

    #[error("Offset {offset} is out of bounds (length {len})")]
    OutOfBounds { offset: usize, len: usize },

    #[error("Document is read-only")]
    ReadOnly,

    #[error("Invalid heading level: {0}")]
    InvalidHeading(u8),

    #[error("Corrupt document state: {0}")]
    CorruptState(String),
}
