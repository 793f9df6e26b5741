//! Caller-supplied address computations.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::memory::{Address, PointerChain, PointerWidth};
use crate::process::ProcessHandle;

type ResolveFn = dyn Fn(&ProcessHandle) -> Option<Address> + Send + Sync;

/// A function that computes an address against the current process.
///
/// Resolvers are infallible from the caller's point of view: `None`, a null
/// address and a panic inside the function all mean "unresolved right now".
#[derive(Clone)]
pub struct AddressResolver {
    label: Arc<str>,
    func: Arc<ResolveFn>,
}

impl AddressResolver {
    /// Wrap a closure. The label is used in logs and displays.
    pub fn new<F>(label: impl Into<Arc<str>>, func: F) -> Self
    where
        F: Fn(&ProcessHandle) -> Option<Address> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            func: Arc::new(func),
        }
    }

    /// Resolver that walks a pointer chain.
    ///
    /// With `width: None` the target's detected width is used.
    #[must_use]
    pub fn pointer_chain(chain: PointerChain, width: Option<PointerWidth>) -> Self {
        let label = chain.to_string();
        Self::new(label, move |handle| {
            let width = width.unwrap_or_else(|| handle.target_width());
            chain.resolve(handle, width)
        })
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run the resolver once.
    #[must_use]
    pub fn call(&self, handle: &ProcessHandle) -> Option<Address> {
        match catch_unwind(AssertUnwindSafe(|| (self.func)(handle))) {
            Ok(address) => address.filter(|address| !address.is_null()),
            Err(_) => {
                tracing::warn!(resolver = %self.label, "Address resolver panicked");
                None
            }
        }
    }
}

impl fmt::Debug for AddressResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressResolver")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}
