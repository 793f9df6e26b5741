//! Raw access to the memory of another process.
//!
//! Everything above this module talks to target memory through the
//! [`ProcessMemory`] trait. The Linux backend reads `/proc/<pid>/mem`; the
//! in-memory [`FakeMemory`] backend drives tests.

mod access;
mod address;
mod error;
mod fake;
#[cfg(target_os = "linux")]
mod linux;
mod pointer;
mod value;

pub use access::*;
pub use address::*;
pub use error::*;
pub use fake::*;
#[cfg(target_os = "linux")]
pub use linux::*;
pub use pointer::*;
pub use value::*;
