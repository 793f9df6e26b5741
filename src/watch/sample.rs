//! Poll results and change detection.

use chrono::Utc;
use serde::Serialize;

use super::ChangeEvent;
use crate::memory::{Address, Value};

/// Outcome of one poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sample {
    /// Whether the address resolved and the read succeeded.
    pub success: bool,
    /// Decoded value, present only on success.
    pub value: Option<Value>,
    /// Address polled, if it resolved.
    pub address: Option<Address>,
}

impl Sample {
    /// The address could not be resolved.
    #[must_use]
    pub fn unresolved() -> Self {
        Self {
            success: false,
            value: None,
            address: None,
        }
    }

    /// The address resolved but the read failed.
    #[must_use]
    pub fn failed(address: Address) -> Self {
        Self {
            success: false,
            value: None,
            address: Some(address),
        }
    }

    /// A successful read.
    #[must_use]
    pub fn ok(address: Address, value: Value) -> Self {
        Self {
            success: true,
            value: Some(value),
            address: Some(address),
        }
    }

    /// Compare with the following sample.
    ///
    /// A change is a flip of `success`, or a different value between two
    /// successful samples. Two failed samples never differ.
    #[must_use]
    pub fn diff(&self, name: &str, current: &Sample) -> Option<ChangeEvent> {
        let changed = self.success != current.success
            || (self.success && current.success && self.value != current.value);
        if !changed {
            return None;
        }

        Some(ChangeEvent {
            name: name.to_string(),
            previous_success: self.success,
            current_success: current.success,
            previous_value: self.value.clone(),
            current_value: current.value.clone(),
            address: current.address.or(self.address),
            observed_at: Utc::now(),
        })
    }
}
