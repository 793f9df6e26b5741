//! Address sources: static, dynamically computed, or computed on attach.

mod resolver;
mod source;

pub use resolver::*;
pub use source::*;
