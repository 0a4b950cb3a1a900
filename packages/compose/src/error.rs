//! Error types for the composition engine

use crate::editor::OperationKind;
use scribe_editor::DocumentError;
use thiserror::Error;

/// Request rejected before any network call; nothing was changed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Nothing is selected")]
    EmptySelection,

    #[error("Selection is stale: taken at version {captured}, document is at {current}")]
    StaleSelection { captured: u64, current: u64 },

    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    #[error("Missing required field '{field}' for template '{template}'")]
    MissingField { template: String, field: String },
}

/// The stream ran but its content cannot be used
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Stream reported an error: {0}")]
    Sentinel(String),

    #[error("Stream produced no content")]
    Empty,

    #[error("Stream was cancelled")]
    Cancelled,
}

/// The Generation Service could not be reached or refused the request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Service returned status {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Atomic decrement is not supported by this store")]
    Unsupported,

    #[error("Ledger store error: {0}")]
    Store(String),
}

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Why a started generation or rewrite did not produce usable content
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("A {active} operation is already in progress")]
    Busy { active: OperationKind },

    #[error("Insufficient credits: balance is {balance}")]
    InsufficientCredits { balance: i64 },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),
}
