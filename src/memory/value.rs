//! Typed values and their byte-level marshaling.
//!
//! All multi-byte values are little-endian, matching the targets this tool is
//! used against (x86, x86-64, aarch64).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::MemoryError;

/// Error returned when a value type or value literal cannot be parsed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueParseError {
    /// Unknown value type name.
    #[error("Unknown value type: {0}")]
    UnknownType(String),

    /// A byte array longer than [`MAX_BYTES_LEN`].
    #[error("Byte array of {len} bytes exceeds the {max} byte limit")]
    TooLong { len: usize, max: usize },

    /// The literal does not fit the requested type.
    #[error("Invalid {ty} literal: {literal}")]
    InvalidLiteral { ty: ValueType, literal: String },
}

/// Longest byte array a `bytes/<len>` type may name (one page).
pub const MAX_BYTES_LEN: usize = 4096;

/// A fixed-width value type that can be read from target memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ValueType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    /// A raw byte array of the given length.
    Bytes(usize),
}

impl ValueType {
    /// Width of the value in bytes.
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
            Self::Bytes(len) => len,
        }
    }

    /// Decode a value of this type from exactly `size()` bytes.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::SizeMismatch` if the buffer has the wrong length.
    pub fn decode(self, bytes: &[u8]) -> Result<Value, MemoryError> {
        if bytes.len() != self.size() {
            return Err(MemoryError::SizeMismatch {
                expected: self.size(),
                actual: bytes.len(),
            });
        }

        Ok(match self {
            Self::U8 => Value::U8(bytes[0]),
            Self::I8 => Value::I8(i8::from_le_bytes(array(bytes)?)),
            Self::U16 => Value::U16(u16::from_le_bytes(array(bytes)?)),
            Self::I16 => Value::I16(i16::from_le_bytes(array(bytes)?)),
            Self::U32 => Value::U32(u32::from_le_bytes(array(bytes)?)),
            Self::I32 => Value::I32(i32::from_le_bytes(array(bytes)?)),
            Self::U64 => Value::U64(u64::from_le_bytes(array(bytes)?)),
            Self::I64 => Value::I64(i64::from_le_bytes(array(bytes)?)),
            Self::F32 => Value::F32(f32::from_le_bytes(array(bytes)?)),
            Self::F64 => Value::F64(f64::from_le_bytes(array(bytes)?)),
            Self::Bytes(_) => Value::Bytes(bytes.to_vec()),
        })
    }
}

fn array<const N: usize>(bytes: &[u8]) -> Result<[u8; N], MemoryError> {
    bytes.try_into().map_err(|_| MemoryError::SizeMismatch {
        expected: N,
        actual: bytes.len(),
    })
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8 => f.write_str("u8"),
            Self::I8 => f.write_str("i8"),
            Self::U16 => f.write_str("u16"),
            Self::I16 => f.write_str("i16"),
            Self::U32 => f.write_str("u32"),
            Self::I32 => f.write_str("i32"),
            Self::U64 => f.write_str("u64"),
            Self::I64 => f.write_str("i64"),
            Self::F32 => f.write_str("f32"),
            Self::F64 => f.write_str("f64"),
            Self::Bytes(len) => write!(f, "bytes/{len}"),
        }
    }
}

impl FromStr for ValueType {
    type Err = ValueParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let ty = match lower.as_str() {
            "u8" | "byte" => Self::U8,
            "i8" => Self::I8,
            "u16" => Self::U16,
            "i16" | "short" => Self::I16,
            "u32" => Self::U32,
            "i32" | "int" => Self::I32,
            "u64" => Self::U64,
            "i64" | "long" => Self::I64,
            "f32" | "float" => Self::F32,
            "f64" | "double" => Self::F64,
            other => {
                let len = other
                    .strip_prefix("bytes/")
                    .and_then(|len| len.parse::<usize>().ok())
                    .filter(|len| *len > 0)
                    .ok_or_else(|| ValueParseError::UnknownType(s.to_string()))?;
                if len > MAX_BYTES_LEN {
                    return Err(ValueParseError::TooLong {
                        len,
                        max: MAX_BYTES_LEN,
                    });
                }
                Self::Bytes(len)
            }
        };
        Ok(ty)
    }
}

impl TryFrom<String> for ValueType {
    type Error = ValueParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ValueType> for String {
    fn from(ty: ValueType) -> Self {
        ty.to_string()
    }
}

/// A value read from, or to be written to, target memory.
///
/// Floats compare by bit pattern, so a NaN that stays put is not reported as
/// a change on every poll.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Bytes(Vec<u8>),
}

impl Value {
    /// The type of this value.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::U8(_) => ValueType::U8,
            Self::I8(_) => ValueType::I8,
            Self::U16(_) => ValueType::U16,
            Self::I16(_) => ValueType::I16,
            Self::U32(_) => ValueType::U32,
            Self::I32(_) => ValueType::I32,
            Self::U64(_) => ValueType::U64,
            Self::I64(_) => ValueType::I64,
            Self::F32(_) => ValueType::F32,
            Self::F64(_) => ValueType::F64,
            Self::Bytes(bytes) => ValueType::Bytes(bytes.len()),
        }
    }

    /// Encode the value into little-endian bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::U8(v) => vec![*v],
            Self::I8(v) => v.to_le_bytes().to_vec(),
            Self::U16(v) => v.to_le_bytes().to_vec(),
            Self::I16(v) => v.to_le_bytes().to_vec(),
            Self::U32(v) => v.to_le_bytes().to_vec(),
            Self::I32(v) => v.to_le_bytes().to_vec(),
            Self::U64(v) => v.to_le_bytes().to_vec(),
            Self::I64(v) => v.to_le_bytes().to_vec(),
            Self::F32(v) => v.to_le_bytes().to_vec(),
            Self::F64(v) => v.to_le_bytes().to_vec(),
            Self::Bytes(bytes) => bytes.clone(),
        }
    }

    /// Parse a literal as a value of the given type.
    ///
    /// Integers accept decimal or `0x` hexadecimal; byte arrays accept hex
    /// digits with optional whitespace (`"DE AD BE EF"`).
    ///
    /// # Errors
    ///
    /// Returns `ValueParseError::InvalidLiteral` if the literal does not fit.
    pub fn parse(ty: ValueType, literal: &str) -> Result<Self, ValueParseError> {
        let invalid = || ValueParseError::InvalidLiteral {
            ty,
            literal: literal.to_string(),
        };
        let text = literal.trim();

        let value = match ty {
            ValueType::U8 => Self::U8(parse_int(text).ok_or_else(invalid)?),
            ValueType::I8 => Self::I8(parse_int(text).ok_or_else(invalid)?),
            ValueType::U16 => Self::U16(parse_int(text).ok_or_else(invalid)?),
            ValueType::I16 => Self::I16(parse_int(text).ok_or_else(invalid)?),
            ValueType::U32 => Self::U32(parse_int(text).ok_or_else(invalid)?),
            ValueType::I32 => Self::I32(parse_int(text).ok_or_else(invalid)?),
            ValueType::U64 => Self::U64(parse_int(text).ok_or_else(invalid)?),
            ValueType::I64 => Self::I64(parse_int(text).ok_or_else(invalid)?),
            ValueType::F32 => Self::F32(text.parse().map_err(|_| invalid())?),
            ValueType::F64 => Self::F64(text.parse().map_err(|_| invalid())?),
            ValueType::Bytes(len) => {
                let bytes = parse_hex_bytes(text).ok_or_else(invalid)?;
                if bytes.len() != len {
                    return Err(invalid());
                }
                Self::Bytes(bytes)
            }
        };
        Ok(value)
    }
}

fn parse_int<T: TryFrom<i128>>(text: &str) -> Option<T> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let magnitude = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i128::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i128>().ok()?,
    };
    T::try_from(if negative { -magnitude } else { magnitude }).ok()
}

fn parse_hex_bytes(text: &str) -> Option<Vec<u8>> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.is_empty() || !digits.is_ascii() || digits.len() % 2 != 0 {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
        .collect()
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::U8(a), Self::U8(b)) => a == b,
            (Self::I8(a), Self::I8(b)) => a == b,
            (Self::U16(a), Self::U16(b)) => a == b,
            (Self::I16(a), Self::I16(b)) => a == b,
            (Self::U32(a), Self::U32(b)) => a == b,
            (Self::I32(a), Self::I32(b)) => a == b,
            (Self::U64(a), Self::U64(b)) => a == b,
            (Self::I64(a), Self::I64(b)) => a == b,
            (Self::F32(a), Self::F32(b)) => a.to_bits() == b.to_bits(),
            (Self::F64(a), Self::F64(b)) => a.to_bits() == b.to_bits(),
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8(v) => write!(f, "{v}"),
            Self::I8(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::I16(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
            Self::Bytes(bytes) => {
                let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02X}")).collect();
                f.write_str(&hex.join(" "))
            }
        }
    }
}
