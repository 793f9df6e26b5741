//! Shared process handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::memory::{Address, MemoryError, PointerWidth, ProcessMemory, Value, ValueType};

/// Cheap-clone reference to an attached target process.
///
/// Every clone shares one `closed` flag. Once the tracker closes a handle
/// (process exited or was replaced) all reads and writes through any clone
/// fail with [`MemoryError::Closed`].
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pid: u32,
    name: Arc<str>,
    memory: Arc<dyn ProcessMemory>,
    closed: Arc<AtomicBool>,
}

impl ProcessHandle {
    #[must_use]
    pub fn new(pid: u32, name: impl Into<Arc<str>>, memory: Arc<dyn ProcessMemory>) -> Self {
        Self {
            pid,
            name: name.into(),
            memory,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open a live process by pid through `/proc`.
    ///
    /// # Errors
    ///
    /// Returns an error if the process does not exist or its memory cannot be
    /// opened.
    #[cfg(target_os = "linux")]
    pub fn open_linux(pid: u32, name: impl Into<Arc<str>>) -> Result<Self, MemoryError> {
        let memory = crate::memory::LinuxProcess::open(pid)?;
        Ok(Self::new(pid, name, Arc::new(memory)))
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invalidate this handle and all of its clones.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(pid = self.pid, name = %self.name, "Process handle closed");
        }
    }

    /// Whether `other` is a clone of this handle.
    #[must_use]
    pub fn is_same(&self, other: &ProcessHandle) -> bool {
        Arc::ptr_eq(&self.closed, &other.closed)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Pointer width of the target, or the host width if it cannot be detected.
    #[must_use]
    pub fn target_width(&self) -> PointerWidth {
        self.memory.pointer_width().unwrap_or_else(PointerWidth::host)
    }

    /// Read and decode a typed value.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is closed or the memory is unreadable.
    pub fn read_value(&self, address: Address, ty: ValueType) -> Result<Value, MemoryError> {
        let bytes = self.read_raw(address, ty.size())?;
        ty.decode(&bytes)
    }

    /// Encode and write a typed value.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is closed or the memory is not writable.
    pub fn write_value(&self, address: Address, value: &Value) -> Result<(), MemoryError> {
        self.write_raw(address, &value.to_bytes())
    }

    /// Read one pointer of the target's width.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is closed or the memory is unreadable.
    pub fn read_pointer(&self, address: Address) -> Result<Address, MemoryError> {
        let width = self.target_width();
        let bytes = self.read_raw(address, width.size())?;
        width.decode(&bytes).ok_or(MemoryError::SizeMismatch {
            expected: width.size(),
            actual: bytes.len(),
        })
    }

    fn ensure_open(&self) -> Result<(), MemoryError> {
        if self.is_closed() {
            Err(MemoryError::Closed)
        } else {
            Ok(())
        }
    }
}

impl ProcessMemory for ProcessHandle {
    fn read_raw(&self, address: Address, len: usize) -> Result<Vec<u8>, MemoryError> {
        self.ensure_open()?;
        self.memory.read_raw(address, len)
    }

    fn write_raw(&self, address: Address, bytes: &[u8]) -> Result<(), MemoryError> {
        self.ensure_open()?;
        self.memory.write_raw(address, bytes)
    }

    fn module_base(&self, module: &str) -> Result<Option<Address>, MemoryError> {
        self.ensure_open()?;
        self.memory.module_base(module)
    }

    fn is_alive(&self) -> bool {
        !self.is_closed() && self.memory.is_alive()
    }

    fn pointer_width(&self) -> Option<PointerWidth> {
        self.memory.pointer_width()
    }
}
