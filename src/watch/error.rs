//! Watch registry error types.

use crate::memory::{MemoryError, ValueType};

/// Errors returned by registry and loop operations.
#[derive(thiserror::Error, Debug)]
pub enum WatchError {
    /// A watch with this name is already registered.
    #[error("Watch already exists: {0}")]
    DuplicateName(String),

    /// No watch with this name is registered.
    #[error("Watch not found: {0}")]
    NotFound(String),

    /// The watch loop is already running.
    #[error("Watch already running: {0}")]
    AlreadyRunning(String),

    /// The watch loop is not running.
    #[error("Watch not running: {0}")]
    NotRunning(String),

    /// No process is attached.
    #[error("No process attached")]
    NoProcess,

    /// The watch address cannot be resolved right now.
    #[error("Address of watch {0} is unresolved")]
    Unresolved(String),

    /// A value of the wrong type was written.
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: ValueType,
        actual: ValueType,
    },

    /// Memory access failed.
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),
}
