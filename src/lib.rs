//! Memwatch - watch and edit the memory of a live process.

pub mod address;
pub mod config;
pub mod display;
pub mod memory;
pub mod process;
pub mod watch;
