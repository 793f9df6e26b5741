//! Pointer-chain resolution.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{parse_offset, Address, AddressParseError, ProcessMemory};

/// Width of a pointer in the target process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PointerWidth {
    /// 4-byte pointers.
    Bits32,
    /// 8-byte pointers.
    Bits64,
}

impl PointerWidth {
    /// Pointer size in bytes.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Bits32 => 4,
            Self::Bits64 => 8,
        }
    }

    /// Pointer width of the running binary.
    #[must_use]
    pub const fn host() -> Self {
        if cfg!(target_pointer_width = "32") {
            Self::Bits32
        } else {
            Self::Bits64
        }
    }

    /// Decode a little-endian pointer of this width.
    ///
    /// Returns `None` if `bytes` is not exactly `size()` long.
    #[must_use]
    pub fn decode(self, bytes: &[u8]) -> Option<Address> {
        let raw = match self {
            Self::Bits32 => u64::from(u32::from_le_bytes(bytes.try_into().ok()?)),
            Self::Bits64 => u64::from_le_bytes(bytes.try_into().ok()?),
        };
        Some(Address::new(raw))
    }
}

impl fmt::Display for PointerWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bits32 => f.write_str("32"),
            Self::Bits64 => f.write_str("64"),
        }
    }
}

impl FromStr for PointerWidth {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "32" | "x86" => Ok(Self::Bits32),
            "64" | "x64" | "x86_64" => Ok(Self::Bits64),
            other => Err(AddressParseError(format!("pointer width {other}"))),
        }
    }
}

impl TryFrom<String> for PointerWidth {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PointerWidth> for String {
    fn from(width: PointerWidth) -> Self {
        width.to_string()
    }
}

/// Walk a pointer chain starting at `module_base + first_offset`.
///
/// For every entry in `offsets` a pointer is read at the current address and
/// the entry is added to it. A failed read, a null pointer or an arithmetic
/// overflow anywhere in the chain yields `None`; partial addresses are never
/// returned.
pub fn resolve_chain<M>(
    memory: &M,
    module_base: Address,
    first_offset: i64,
    offsets: &[i64],
    width: PointerWidth,
) -> Option<Address>
where
    M: ProcessMemory + ?Sized,
{
    let mut current = module_base.checked_offset(first_offset)?;

    for (depth, offset) in offsets.iter().enumerate() {
        let pointer = match memory.read_raw(current, width.size()) {
            Ok(bytes) => width.decode(&bytes)?,
            Err(err) => {
                tracing::trace!(depth, address = %current, error = %err, "Pointer read failed");
                return None;
            }
        };
        if pointer.is_null() {
            tracing::trace!(depth, address = %current, "Null pointer in chain");
            return None;
        }
        current = pointer.checked_offset(*offset)?;
    }

    Some(current)
}

/// A module-relative pointer chain such as `game+0x1A0 -> 0x10 -> 0x20`.
///
/// Without a module the base offset is an absolute address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointerChain {
    /// Module whose load address anchors the chain.
    pub module: Option<String>,
    /// Offset added to the module base before the first dereference.
    pub base_offset: i64,
    /// Offsets applied after each dereference.
    pub offsets: Vec<i64>,
}

impl PointerChain {
    /// Create a chain anchored at `module`.
    #[must_use]
    pub fn new(module: impl Into<String>, base_offset: i64, offsets: Vec<i64>) -> Self {
        Self {
            module: Some(module.into()),
            base_offset,
            offsets,
        }
    }

    /// Create a chain anchored at an absolute address.
    #[must_use]
    pub fn absolute(base: Address, offsets: Vec<i64>) -> Self {
        Self {
            module: None,
            // Addresses above i64::MAX are kernel space and never valid targets.
            base_offset: i64::try_from(base.as_u64()).unwrap_or(i64::MAX),
            offsets,
        }
    }

    /// Resolve the chain against `memory`.
    ///
    /// A module that is not loaded (or a failing module lookup) is unresolved.
    pub fn resolve<M>(&self, memory: &M, width: PointerWidth) -> Option<Address>
    where
        M: ProcessMemory + ?Sized,
    {
        let base = match &self.module {
            Some(module) => match memory.module_base(module) {
                Ok(Some(base)) => base,
                Ok(None) => {
                    tracing::trace!(module = %module, "Module not loaded");
                    return None;
                }
                Err(err) => {
                    tracing::trace!(module = %module, error = %err, "Module lookup failed");
                    return None;
                }
            },
            None => Address::NULL,
        };
        resolve_chain(memory, base, self.base_offset, &self.offsets, width)
    }
}

impl fmt::Display for PointerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(module) => write!(f, "{module}+{}", Offset(self.base_offset))?,
            None => write!(f, "{}", Offset(self.base_offset))?,
        }
        for offset in &self.offsets {
            write!(f, " -> {}", Offset(*offset))?;
        }
        Ok(())
    }
}

struct Offset(i64);

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < 0 {
            write!(f, "-0x{:X}", self.0.unsigned_abs())
        } else {
            write!(f, "0x{:X}", self.0)
        }
    }
}

impl FromStr for PointerChain {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.replace("->", ",");
        let mut parts = normalized.split(',').map(str::trim);

        let head = parts
            .next()
            .filter(|head| !head.is_empty())
            .ok_or_else(|| AddressParseError(s.to_string()))?;

        let (module, base_offset) = match head.rsplit_once('+') {
            Some((module, offset)) if !module.trim().is_empty() => {
                (Some(module.trim().to_string()), parse_offset(offset)?)
            }
            _ => (None, parse_offset(head)?),
        };

        let offsets = parts.map(parse_offset).collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            module,
            base_offset,
            offsets,
        })
    }
}
