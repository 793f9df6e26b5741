//! In-memory target process for tests and demos.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use super::{Address, MemoryError, PointerWidth, ProcessMemory, Value};

/// A scripted address space.
///
/// Bytes that were never written are unreadable, just like unmapped pages in
/// a real process. Individual addresses can be marked as failing to simulate
/// pages that are swapped out or freed.
#[derive(Debug)]
pub struct FakeMemory {
    bytes: RwLock<HashMap<u64, u8>>,
    failing: RwLock<HashSet<u64>>,
    modules: RwLock<HashMap<String, Address>>,
    alive: AtomicBool,
    width: PointerWidth,
    reads: AtomicUsize,
}

impl Default for FakeMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeMemory {
    /// Empty 64-bit address space.
    #[must_use]
    pub fn new() -> Self {
        Self::with_width(PointerWidth::Bits64)
    }

    /// Empty address space with the given pointer width.
    #[must_use]
    pub fn with_width(width: PointerWidth) -> Self {
        Self {
            bytes: RwLock::new(HashMap::new()),
            failing: RwLock::new(HashSet::new()),
            modules: RwLock::new(HashMap::new()),
            alive: AtomicBool::new(true),
            width,
            reads: AtomicUsize::new(0),
        }
    }

    /// Store raw bytes at `address`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn write_bytes(&self, address: Address, bytes: &[u8]) {
        let mut map = self.bytes.write().expect("RwLock poisoned");
        for (addr, byte) in (address.as_u64()..).zip(bytes) {
            map.insert(addr, *byte);
        }
    }

    /// Store a typed value at `address`.
    pub fn put_value(&self, address: Address, value: &Value) {
        self.write_bytes(address, &value.to_bytes());
    }

    /// Store a pointer of this memory's width at `address`.
    pub fn put_pointer(&self, address: Address, target: Address) {
        let raw = target.as_u64();
        match self.width {
            PointerWidth::Bits64 => self.write_bytes(address, &raw.to_le_bytes()),
            PointerWidth::Bits32 => {
                #[allow(clippy::cast_possible_truncation)]
                let narrow = raw as u32;
                self.write_bytes(address, &narrow.to_le_bytes());
            }
        }
    }

    /// Unmap `len` bytes at `address`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn remove(&self, address: Address, len: usize) {
        let mut map = self.bytes.write().expect("RwLock poisoned");
        for addr in (address.as_u64()..).take(len) {
            map.remove(&addr);
        }
    }

    /// Make every access touching `address` fail until cleared.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn fail_reads_at(&self, address: Address) {
        self.failing
            .write()
            .expect("RwLock poisoned")
            .insert(address.as_u64());
    }

    /// Undo [`fail_reads_at`](Self::fail_reads_at).
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn clear_failure(&self, address: Address) {
        self.failing
            .write()
            .expect("RwLock poisoned")
            .remove(&address.as_u64());
    }

    /// Register a loaded module.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn add_module(&self, name: impl Into<String>, base: Address) {
        self.modules
            .write()
            .expect("RwLock poisoned")
            .insert(name.into(), base);
    }

    /// Unload a module.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn remove_module(&self, name: &str) {
        self.modules.write().expect("RwLock poisoned").remove(name);
    }

    /// Simulate process exit.
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Number of `read_raw` calls served so far.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn range_fails(&self, start: u64, len: usize) -> bool {
        let failing = self.failing.read().expect("RwLock poisoned");
        (start..).take(len).any(|addr| failing.contains(&addr))
    }
}

impl ProcessMemory for FakeMemory {
    fn read_raw(&self, address: Address, len: usize) -> Result<Vec<u8>, MemoryError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let error = || MemoryError::Read { address, size: len };

        if !self.is_alive() || self.range_fails(address.as_u64(), len) {
            return Err(error());
        }

        let map = self.bytes.read().expect("RwLock poisoned");
        (address.as_u64()..)
            .take(len)
            .map(|addr| map.get(&addr).copied())
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(error)
    }

    fn write_raw(&self, address: Address, bytes: &[u8]) -> Result<(), MemoryError> {
        if !self.is_alive() || self.range_fails(address.as_u64(), bytes.len()) {
            return Err(MemoryError::Write {
                address,
                size: bytes.len(),
            });
        }
        self.write_bytes(address, bytes);
        Ok(())
    }

    fn module_base(&self, module: &str) -> Result<Option<Address>, MemoryError> {
        let modules = self.modules.read().expect("RwLock poisoned");
        Ok(modules
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(module))
            .map(|(_, base)| *base))
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn pointer_width(&self) -> Option<PointerWidth> {
        Some(self.width)
    }
}
