//! Events published by the watch engine.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::memory::{Address, Value};

/// Default capacity of the event broadcast channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// A transition between two consecutive samples of one watch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    /// Watch name.
    pub name: String,
    pub previous_success: bool,
    pub current_success: bool,
    pub previous_value: Option<Value>,
    pub current_value: Option<Value>,
    /// Address of the current sample, or the last known one on loss.
    pub address: Option<Address>,
    /// When the change was observed.
    pub observed_at: DateTime<Utc>,
}

/// Everything subscribers can observe.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WatchEvent {
    /// A watched value changed or became (un)available.
    Changed(ChangeEvent),
    /// An updatable address was recomputed to a new location.
    AddressUpdated { name: String, address: Address },
    /// The attached process exited.
    ProcessExited { pid: u32 },
    /// A process was attached (first time or after an exit).
    ProcessReacquired { pid: u32 },
}

impl WatchEvent {
    /// Watch name for per-watch events.
    #[must_use]
    pub fn watch_name(&self) -> Option<&str> {
        match self {
            Self::Changed(change) => Some(&change.name),
            Self::AddressUpdated { name, .. } => Some(name),
            Self::ProcessExited { .. } | Self::ProcessReacquired { .. } => None,
        }
    }
}
