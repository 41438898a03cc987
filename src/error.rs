//! # Errors
//!
//! One error family per layer. Graph errors are raised at the mutation API and
//! leave the workspace untouched; generation errors abort a single run; device
//! errors always return the session to `Idle`.

use crate::workspace::BlockId;
use thiserror::Error;

/// Board registry lookup failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    #[error("Unknown board '{0}'")]
    UnknownBoard(String),
}

/// Rejected workspace mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Block {0} is a root block and cannot be deleted")]
    ProtectedBlock(BlockId),

    #[error("Invalid field '{field}' on block {block}: {reason}")]
    InvalidField {
        block: BlockId,
        field: String,
        reason: String,
    },

    #[error("Invalid graph operation: {0}")]
    InvalidGraphOperation(String),

    #[error("Block kind '{0}' is not registered")]
    UnknownBlockKind(String),

    #[error("Block {0} does not exist")]
    BlockNotFound(BlockId),
}

/// A failed code generation run. The caller keeps the previous output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Block {block} has an unregistered kind '{kind}'")]
    UnknownBlockKind { block: BlockId, kind: String },

    #[error("Workspace is missing its '{0}' root block")]
    MissingRoot(&'static str),

    #[error("Block {from} references missing block {missing}")]
    DanglingReference { from: BlockId, missing: BlockId },

    #[error("Block {0} was reached twice while generating")]
    Cycle(BlockId),
}

/// Snapshot and project store failures.
#[derive(Error, Debug, Clone)]
pub enum PersistenceError {
    #[error("Snapshot JSON error: {0}")]
    Json(String),

    #[error("Snapshot could not be reconstructed: {0}")]
    Reconstruct(String),

    #[error("Project '{0}' not found")]
    NotFound(String),

    #[error("Project store error: {0}")]
    Store(String),
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Json(err.to_string())
    }
}

impl From<GraphError> for PersistenceError {
    fn from(err: GraphError) -> Self {
        PersistenceError::Reconstruct(err.to_string())
    }
}

/// User-visible, retryable device failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Device session is busy ({0})")]
    Busy(&'static str),

    #[error("Unknown board '{0}'")]
    UnknownBoard(String),

    #[error("Port {0} is not available")]
    PortUnavailable(String),

    #[error("Your code has an error:\n{0}")]
    Compile(String),

    #[error("Upload to port {port} failed. Is the board connected?\nDetails: {details}")]
    Upload { port: String, details: String },

    #[error("Could not open serial monitor on {port}: {details}")]
    Monitor { port: String, details: String },

    #[error("Device bridge error: {0}")]
    Bridge(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for DeviceError {
    fn from(err: std::io::Error) -> Self {
        DeviceError::Io(err.to_string())
    }
}

impl From<BoardError> for DeviceError {
    fn from(err: BoardError) -> Self {
        match err {
            BoardError::UnknownBoard(id) => DeviceError::UnknownBoard(id),
        }
    }
}

/// Configuration loading failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unknown default board '{0}'")]
    UnknownBoard(String),
}
