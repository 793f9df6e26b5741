//! Configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::address::RefreshMode;
use crate::memory::{Address, PointerChain, PointerWidth, ValueType};
use crate::process::TrackerConfig;
use crate::watch::WatchDescriptor;

/// Top-level configuration loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemwatchConfig {
    /// Name of the process to attach to.
    #[serde(default)]
    pub process: Option<String>,
    /// Pointer width override; detected from the target when absent.
    #[serde(default)]
    pub pointer_width: Option<PointerWidth>,
    /// Reattach when the process restarts.
    #[serde(default = "default_auto_reacquire")]
    pub auto_reacquire: bool,
    #[serde(default = "default_reacquire_interval_ms")]
    pub reacquire_interval_ms: u64,
    #[serde(default = "default_exit_poll_interval_ms")]
    pub exit_poll_interval_ms: u64,
    /// Watches to register.
    #[serde(default, rename = "watch")]
    pub watches: Vec<WatchSpec>,
}

fn default_auto_reacquire() -> bool {
    true
}

fn default_reacquire_interval_ms() -> u64 {
    500
}

fn default_exit_poll_interval_ms() -> u64 {
    250
}

impl Default for MemwatchConfig {
    fn default() -> Self {
        Self {
            process: None,
            pointer_width: None,
            auto_reacquire: default_auto_reacquire(),
            reacquire_interval_ms: default_reacquire_interval_ms(),
            exit_poll_interval_ms: default_exit_poll_interval_ms(),
            watches: Vec::new(),
        }
    }
}

impl MemwatchConfig {
    /// Tracker settings derived from this configuration.
    #[must_use]
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            process_name: self.process.clone(),
            auto_reacquire: self.auto_reacquire,
            reacquire_interval: Duration::from_millis(self.reacquire_interval_ms),
            exit_poll_interval: Duration::from_millis(self.exit_poll_interval_ms),
        }
    }

    /// Watch descriptors for every configured watch.
    #[must_use]
    pub fn descriptors(&self) -> Vec<WatchDescriptor> {
        self.watches
            .iter()
            .map(|spec| spec.descriptor(self.pointer_width))
            .collect()
    }
}

/// One `[[watch]]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Start polling as soon as the watch is registered.
    #[serde(default = "default_start")]
    pub start: bool,
    pub address: AddressSpec,
}

fn default_interval_ms() -> u64 {
    100
}

fn default_start() -> bool {
    true
}

impl WatchSpec {
    /// Build the descriptor for this watch.
    #[must_use]
    pub fn descriptor(&self, width: Option<PointerWidth>) -> WatchDescriptor {
        let descriptor = match &self.address {
            AddressSpec::Static { address } => {
                WatchDescriptor::fixed(&self.name, self.value_type, *address)
            }
            AddressSpec::Pointer {
                module,
                base,
                offsets,
                refresh,
            } => {
                let chain = PointerChain {
                    module: module.clone(),
                    base_offset: *base,
                    offsets: offsets.clone(),
                };
                WatchDescriptor::pointer_chain(&self.name, self.value_type, chain, width, *refresh)
            }
        };
        descriptor.with_interval(Duration::from_millis(self.interval_ms))
    }
}

/// Address of a configured watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AddressSpec {
    /// A fixed address.
    Static { address: Address },
    /// A pointer chain, optionally anchored at a module.
    Pointer {
        #[serde(default)]
        module: Option<String>,
        base: i64,
        #[serde(default)]
        offsets: Vec<i64>,
        #[serde(default)]
        refresh: RefreshMode,
    },
}
