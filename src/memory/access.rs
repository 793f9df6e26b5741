//! The memory access seam.

use std::fmt::Debug;

use super::{Address, MemoryError, PointerWidth};

/// Byte-level access to the address space of one target process.
///
/// Implementations must be safe to share across the watch tasks that poll a
/// process concurrently.
pub trait ProcessMemory: Send + Sync + Debug {
    /// Read `len` bytes starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::Read` when any byte of the range is unreadable.
    fn read_raw(&self, address: Address, len: usize) -> Result<Vec<u8>, MemoryError>;

    /// Write `bytes` starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::Write` when the range is not writable.
    fn write_raw(&self, address: Address, bytes: &[u8]) -> Result<(), MemoryError>;

    /// Load address of the named module, or `None` if it is not mapped.
    ///
    /// # Errors
    ///
    /// Returns an error if the module table itself cannot be read.
    fn module_base(&self, module: &str) -> Result<Option<Address>, MemoryError>;

    /// Whether the target process is still running.
    fn is_alive(&self) -> bool;

    /// Pointer width of the target, if the backend can tell.
    fn pointer_width(&self) -> Option<PointerWidth> {
        None
    }
}
