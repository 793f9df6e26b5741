//! Target-process attachment and lifecycle tracking.

mod error;
mod finder;
mod handle;
mod tracker;

pub use error::*;
pub use finder::*;
pub use handle::*;
pub use tracker::*;
