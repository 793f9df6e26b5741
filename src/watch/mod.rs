//! Polling engine: watch loops, the registry and their events.
//!
//! A watch pairs a name and value type with an address source. Its loop
//! samples the value at a fixed interval and publishes a [`WatchEvent`]
//! whenever consecutive samples differ.

mod descriptor;
mod error;
mod events;
mod pause;
mod registry;
mod sample;
mod state;
mod watch_loop;

pub use descriptor::*;
pub use error::*;
pub use events::*;
pub use pause::*;
pub use registry::*;
pub use sample::*;
pub use state::*;
pub use watch_loop::*;
