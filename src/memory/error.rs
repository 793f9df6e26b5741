//! Memory access error types.

use super::Address;

/// Errors that can occur while touching target-process memory.
#[derive(thiserror::Error, Debug)]
pub enum MemoryError {
    /// The bytes at the address could not be read.
    #[error("Failed to read {size} bytes at {address}")]
    Read { address: Address, size: usize },

    /// The bytes at the address could not be written.
    #[error("Failed to write {size} bytes at {address}")]
    Write { address: Address, size: usize },

    /// The handle was closed after the process exited or was replaced.
    #[error("Process handle is closed")]
    Closed,

    /// The process does not exist (anymore).
    #[error("Process not found: {0}")]
    ProcessNotFound(u32),

    /// A buffer did not have the width the value type requires.
    #[error("Expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// The operation is not available on this platform.
    #[error("Unsupported on this platform: {0}")]
    Unsupported(&'static str),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
