//! Named watches and their loops.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{broadcast, watch, Mutex};

use super::{
    LoopContext, Sample, WatchDescriptor, WatchError, WatchEvent, WatchInfo, WatchLoop,
    DEFAULT_EVENT_CHANNEL_CAPACITY,
};
use crate::address::AddressSource;
use crate::memory::{Address, Value, ValueType};
use crate::process::ProcessHandle;

struct WatchEntry {
    value_type: ValueType,
    interval: Duration,
    source: watch::Sender<AddressSource>,
    watch_loop: WatchLoop,
    last_sample: Option<Sample>,
}

impl WatchEntry {
    fn info(&self, name: &str) -> WatchInfo {
        WatchInfo {
            name: name.to_string(),
            value_type: self.value_type,
            interval: self.interval,
            source: self.source.borrow().to_string(),
            state: self.watch_loop.state(),
            last_sample: self.last_sample.clone(),
        }
    }

    async fn stop(&mut self) {
        if let Some(sample) = self.watch_loop.stop().await {
            self.last_sample = Some(sample);
        }
    }
}

/// Registry of named watches sharing one process handle and one event
/// channel.
///
/// All map operations take the same async lock, so `add` and `remove`
/// serialize against the bulk operations.
pub struct WatchRegistry {
    entries: Mutex<HashMap<String, WatchEntry>>,
    handle: watch::Receiver<Option<ProcessHandle>>,
    events: broadcast::Sender<WatchEvent>,
}

impl WatchRegistry {
    /// Create a registry that follows the handle published on `handle`.
    #[must_use]
    pub fn new(handle: watch::Receiver<Option<ProcessHandle>>) -> Self {
        Self::with_capacity(handle, DEFAULT_EVENT_CHANNEL_CAPACITY)
    }

    /// Like [`new`](Self::new) with a custom event buffer size.
    #[must_use]
    pub fn with_capacity(handle: watch::Receiver<Option<ProcessHandle>>, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            entries: Mutex::new(HashMap::new()),
            handle,
            events,
        }
    }

    /// Registry bound to one fixed handle, for one-shot use without a tracker.
    #[must_use]
    pub fn with_handle(handle: ProcessHandle) -> Self {
        let (_, rx) = watch::channel(Some(handle));
        Self::new(rx)
    }

    /// Subscribe to all events. Dropping the receiver unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }

    /// The currently published handle, if any.
    #[must_use]
    pub fn handle(&self) -> Option<ProcessHandle> {
        self.handle.borrow().clone()
    }

    pub(crate) fn emit(&self, event: WatchEvent) {
        let _ = self.events.send(event);
    }

    /// Register a watch without starting it.
    ///
    /// An updatable address with nothing cached is computed right away when a
    /// process is attached.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::DuplicateName` if the name is taken; the existing
    /// watch is left untouched.
    pub async fn add(&self, descriptor: WatchDescriptor) -> Result<(), WatchError> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(descriptor.name()) {
            return Err(WatchError::DuplicateName(descriptor.name().to_string()));
        }

        let (name, value_type, interval, source) = descriptor.into_parts();
        if let (AddressSource::Updatable(updatable), Some(handle)) = (&source, self.handle()) {
            if updatable.cached().is_none() {
                if let Some(address) = updatable.refresh(&handle) {
                    self.emit(WatchEvent::AddressUpdated {
                        name: name.clone(),
                        address,
                    });
                }
            }
        }
        tracing::debug!(name = %name, value_type = %value_type, source = %source, "Watch added");
        let (source, _) = watch::channel(source);
        entries.insert(
            name,
            WatchEntry {
                value_type,
                interval,
                source,
                watch_loop: WatchLoop::new(),
                last_sample: None,
            },
        );
        Ok(())
    }

    /// Stop (waiting for the loop to finish) and unregister a watch.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::NotFound` for an unknown name.
    pub async fn remove(&self, name: &str) -> Result<(), WatchError> {
        let mut entries = self.entries.lock().await;
        let mut entry = entries
            .remove(name)
            .ok_or_else(|| WatchError::NotFound(name.to_string()))?;
        entry.stop().await;
        tracing::debug!(name, "Watch removed");
        Ok(())
    }

    /// Start polling a watch.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::NotFound` or `WatchError::AlreadyRunning`.
    pub async fn start(&self, name: &str) -> Result<(), WatchError> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| WatchError::NotFound(name.to_string()))?;
        let context = self.context(name, entry);
        entry.watch_loop.start(context)
    }

    /// Stop polling a watch and wait for its loop to finish.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::NotFound` or `WatchError::NotRunning`.
    pub async fn stop(&self, name: &str) -> Result<(), WatchError> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| WatchError::NotFound(name.to_string()))?;
        if !entry.watch_loop.is_running() {
            return Err(WatchError::NotRunning(name.to_string()));
        }
        entry.stop().await;
        Ok(())
    }

    /// Start every idle watch. Returns the names started.
    pub async fn start_all(&self) -> Vec<String> {
        let mut entries = self.entries.lock().await;
        let mut started = Vec::new();
        for (name, entry) in entries.iter_mut() {
            if entry.watch_loop.is_running() {
                continue;
            }
            let context = self.context(name, entry);
            if entry.watch_loop.start(context).is_ok() {
                started.push(name.clone());
            }
        }
        started.sort();
        started
    }

    /// Stop every running watch, waiting for all of them. Returns the names
    /// stopped.
    pub async fn stop_all(&self) -> Vec<String> {
        let mut entries = self.entries.lock().await;
        let stops = entries
            .iter_mut()
            .filter(|(_, entry)| entry.watch_loop.is_running())
            .map(|(name, entry)| async move {
                entry.stop().await;
                name.clone()
            });
        let mut stopped = join_all(stops).await;
        stopped.sort();
        stopped
    }

    /// Stop every running watch after the process is gone.
    ///
    /// Each stopped watch ends on an unresolved sample; a watch whose last
    /// sample was still successful publishes the loss. Returns the names
    /// stopped.
    pub(crate) async fn halt_all(&self) -> Vec<String> {
        let mut entries = self.entries.lock().await;
        let halts = entries
            .iter_mut()
            .filter(|(_, entry)| entry.watch_loop.is_running())
            .map(|(name, entry)| async move {
                entry.stop().await;
                let lost = Sample::unresolved();
                let change = entry
                    .last_sample
                    .as_ref()
                    .and_then(|last| last.diff(name, &lost));
                entry.last_sample = Some(lost);
                (name.clone(), change)
            });
        let mut stopped = Vec::new();
        for (name, change) in join_all(halts).await {
            if let Some(change) = change {
                self.emit(WatchEvent::Changed(change));
            }
            stopped.push(name);
        }
        stopped.sort();
        stopped
    }

    /// Snapshot of one watch.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::NotFound` for an unknown name.
    pub async fn get(&self, name: &str) -> Result<WatchInfo, WatchError> {
        let entries = self.entries.lock().await;
        entries
            .get(name)
            .map(|entry| entry.info(name))
            .ok_or_else(|| WatchError::NotFound(name.to_string()))
    }

    /// Registered names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let entries = self.entries.lock().await;
        let mut names: Vec<String> = entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Names of running watches, sorted.
    pub async fn running(&self) -> Vec<String> {
        let entries = self.entries.lock().await;
        let mut names: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.watch_loop.is_running())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Replace the address source of a watch. A running loop picks it up on
    /// its next poll.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::NotFound` for an unknown name.
    pub async fn set_source(&self, name: &str, source: AddressSource) -> Result<(), WatchError> {
        let entries = self.entries.lock().await;
        let entry = entries
            .get(name)
            .ok_or_else(|| WatchError::NotFound(name.to_string()))?;
        tracing::debug!(name, source = %source, "Address source replaced");
        entry.source.send_replace(source);
        Ok(())
    }

    /// Recompute every updatable address against `handle` and announce the
    /// ones that moved. Returns the number of changed addresses.
    pub async fn refresh_updatable(&self, handle: &ProcessHandle) -> usize {
        let entries = self.entries.lock().await;
        let mut changed = 0;
        for (name, entry) in entries.iter() {
            let Some(address) = entry.source.borrow().refresh(handle) else {
                continue;
            };
            tracing::debug!(name = %name, address = %address, "Address updated");
            self.emit(WatchEvent::AddressUpdated {
                name: name.clone(),
                address,
            });
            changed += 1;
        }
        changed
    }

    /// Read the current value of a watch once.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `NoProcess`, `Unresolved` or `Memory`.
    pub async fn read(&self, name: &str) -> Result<Value, WatchError> {
        let (handle, address, value_type) = self.locate(name).await?;
        Ok(handle.read_value(address, value_type)?)
    }

    /// Write a value through a watch's address.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if `value` is not of the watch's type, and
    /// otherwise the same errors as [`read`](Self::read).
    pub async fn write(&self, name: &str, value: &Value) -> Result<(), WatchError> {
        let (handle, address, value_type) = self.locate(name).await?;
        if value.value_type() != value_type {
            return Err(WatchError::TypeMismatch {
                expected: value_type,
                actual: value.value_type(),
            });
        }
        handle.write_value(address, value)?;
        tracing::debug!(name, address = %address, value = %value, "Value written");
        Ok(())
    }

    async fn locate(&self, name: &str) -> Result<(ProcessHandle, Address, ValueType), WatchError> {
        let entries = self.entries.lock().await;
        let entry = entries
            .get(name)
            .ok_or_else(|| WatchError::NotFound(name.to_string()))?;
        let handle = self.handle().ok_or(WatchError::NoProcess)?;
        let source = entry.source.borrow().clone();
        let address = source
            .resolve(Some(&handle))
            .ok_or_else(|| WatchError::Unresolved(name.to_string()))?;
        Ok((handle, address, entry.value_type))
    }

    fn context(&self, name: &str, entry: &WatchEntry) -> LoopContext {
        LoopContext {
            name: name.to_string(),
            value_type: entry.value_type,
            interval: entry.interval,
            handle: self.handle.clone(),
            source: entry.source.subscribe(),
            events: self.events.clone(),
        }
    }
}

impl std::fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("subscribers", &self.events.receiver_count())
            .finish_non_exhaustive()
    }
}
