//! Where a watch reads from.

use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use super::AddressResolver;
use crate::memory::{Address, PointerChain, PointerWidth};
use crate::process::ProcessHandle;

/// How often a computed address is recomputed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    /// Recompute on every poll.
    #[default]
    EveryPoll,
    /// Recompute only when a process is attached.
    OnAttach,
}

/// The address source of a watch.
#[derive(Debug, Clone)]
pub enum AddressSource {
    /// A fixed address.
    Static(Address),
    /// Recomputed on every poll.
    Dynamic(AddressResolver),
    /// Recomputed on demand and cached between polls.
    Updatable(UpdatableAddress),
}

impl AddressSource {
    /// Source for a pointer chain.
    #[must_use]
    pub fn pointer_chain(chain: PointerChain, width: Option<PointerWidth>, mode: RefreshMode) -> Self {
        let resolver = AddressResolver::pointer_chain(chain, width);
        match mode {
            RefreshMode::EveryPoll => Self::Dynamic(resolver),
            RefreshMode::OnAttach => Self::Updatable(UpdatableAddress::new(resolver)),
        }
    }

    /// Current address, or `None` if it cannot be determined right now.
    #[must_use]
    pub fn resolve(&self, handle: Option<&ProcessHandle>) -> Option<Address> {
        match self {
            Self::Static(address) => Some(*address).filter(|a| !a.is_null()),
            Self::Dynamic(resolver) => handle.and_then(|handle| resolver.call(handle)),
            Self::Updatable(updatable) => updatable.cached(),
        }
    }

    /// Recompute an updatable address against `handle`.
    ///
    /// Returns the new address if it changed. Static and dynamic sources never
    /// change here.
    #[must_use]
    pub fn refresh(&self, handle: &ProcessHandle) -> Option<Address> {
        match self {
            Self::Updatable(updatable) => updatable.refresh(handle),
            Self::Static(_) | Self::Dynamic(_) => None,
        }
    }

    #[must_use]
    pub fn is_updatable(&self) -> bool {
        matches!(self, Self::Updatable(_))
    }
}

impl fmt::Display for AddressSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(address) => write!(f, "{address}"),
            Self::Dynamic(resolver) => write!(f, "dynamic({})", resolver.label()),
            Self::Updatable(updatable) => match updatable.cached() {
                Some(address) => write!(f, "updatable({}) = {address}", updatable.resolver.label()),
                None => write!(f, "updatable({}) = ?", updatable.resolver.label()),
            },
        }
    }
}

/// A resolver with a cached result.
///
/// Clones share the cache.
#[derive(Debug, Clone)]
pub struct UpdatableAddress {
    resolver: AddressResolver,
    cached: Arc<RwLock<Option<Address>>>,
}

impl UpdatableAddress {
    /// Start with an empty cache; the address is unresolved until refreshed.
    #[must_use]
    pub fn new(resolver: AddressResolver) -> Self {
        Self {
            resolver,
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// Start with a known address.
    #[must_use]
    pub fn with_initial(resolver: AddressResolver, address: Address) -> Self {
        Self {
            resolver,
            cached: Arc::new(RwLock::new(Some(address))),
        }
    }

    /// # Panics
    ///
    /// Panics if the cache lock is poisoned.
    #[must_use]
    pub fn cached(&self) -> Option<Address> {
        *self.cached.read().expect("RwLock poisoned")
    }

    /// Recompute and cache. A resolver that comes back empty keeps the
    /// previous address.
    ///
    /// # Panics
    ///
    /// Panics if the cache lock is poisoned.
    #[must_use]
    pub fn refresh(&self, handle: &ProcessHandle) -> Option<Address> {
        let Some(address) = self.resolver.call(handle) else {
            tracing::debug!(resolver = %self.resolver.label(), "Refresh unresolved, keeping cached address");
            return None;
        };

        let mut cached = self.cached.write().expect("RwLock poisoned");
        if *cached == Some(address) {
            return None;
        }
        *cached = Some(address);
        Some(address)
    }
}
