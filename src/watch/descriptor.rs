//! Watch definitions.

use std::time::Duration;

use serde::Serialize;

use super::{Sample, WatchState};
use crate::address::{AddressResolver, AddressSource, RefreshMode, UpdatableAddress};
use crate::memory::{Address, PointerChain, PointerWidth, ValueType};

/// Poll interval used when none is given.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shortest accepted poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A named request to watch one value.
#[derive(Debug, Clone)]
pub struct WatchDescriptor {
    name: String,
    value_type: ValueType,
    interval: Duration,
    source: AddressSource,
}

impl WatchDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, value_type: ValueType, source: AddressSource) -> Self {
        Self {
            name: name.into(),
            value_type,
            interval: DEFAULT_POLL_INTERVAL,
            source,
        }
    }

    /// Watch a fixed address.
    #[must_use]
    pub fn fixed(name: impl Into<String>, value_type: ValueType, address: Address) -> Self {
        Self::new(name, value_type, AddressSource::Static(address))
    }

    /// Watch an address recomputed on every poll.
    #[must_use]
    pub fn dynamic(
        name: impl Into<String>,
        value_type: ValueType,
        resolver: AddressResolver,
    ) -> Self {
        Self::new(name, value_type, AddressSource::Dynamic(resolver))
    }

    /// Watch an address recomputed whenever a process is attached.
    #[must_use]
    pub fn updatable(
        name: impl Into<String>,
        value_type: ValueType,
        resolver: AddressResolver,
    ) -> Self {
        Self::new(
            name,
            value_type,
            AddressSource::Updatable(UpdatableAddress::new(resolver)),
        )
    }

    /// Watch the target of a pointer chain.
    #[must_use]
    pub fn pointer_chain(
        name: impl Into<String>,
        value_type: ValueType,
        chain: PointerChain,
        width: Option<PointerWidth>,
        mode: RefreshMode,
    ) -> Self {
        Self::new(name, value_type, AddressSource::pointer_chain(chain, width, mode))
    }

    /// Set the poll interval, clamped to [`MIN_POLL_INTERVAL`].
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub fn source(&self) -> &AddressSource {
        &self.source
    }

    pub(crate) fn into_parts(self) -> (String, ValueType, Duration, AddressSource) {
        (self.name, self.value_type, self.interval, self.source)
    }
}

/// Point-in-time view of a registered watch.
#[derive(Debug, Clone, Serialize)]
pub struct WatchInfo {
    pub name: String,
    pub value_type: ValueType,
    #[serde(with = "millis")]
    pub interval: Duration,
    /// Display form of the address source.
    pub source: String,
    pub state: WatchState,
    /// Last sample taken by the most recent loop run.
    pub last_sample: Option<Sample>,
}

mod millis {
    use std::time::Duration;

    use serde::Serializer;

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u128(duration.as_millis())
    }
}
