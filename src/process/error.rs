//! Process discovery errors.

use crate::memory::MemoryError;

/// Errors that can occur while locating or opening a target process.
#[derive(thiserror::Error, Debug)]
pub enum ProcessError {
    /// No process with this name or pid is running.
    #[error("Process not found: {0}")]
    NotFound(String),

    /// The process exists but its memory could not be opened.
    #[error("Failed to open process {pid}: {source}")]
    Open {
        pid: u32,
        #[source]
        source: MemoryError,
    },

    /// Process discovery is not available on this platform.
    #[error("Process discovery is unsupported on this platform")]
    Unsupported,

    /// I/O error while scanning processes.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
