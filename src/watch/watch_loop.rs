//! The per-watch polling task.

use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{pause, Sample, WatchError, WatchEvent, WatchState};
use crate::address::AddressSource;
use crate::memory::ValueType;
use crate::process::ProcessHandle;

/// Everything a running loop needs. Handle and source are read from their
/// channels on every poll so replacements apply on the next poll.
#[derive(Debug)]
pub struct LoopContext {
    pub name: String,
    pub value_type: ValueType,
    pub interval: Duration,
    pub handle: watch::Receiver<Option<ProcessHandle>>,
    pub source: watch::Receiver<AddressSource>,
    pub events: broadcast::Sender<WatchEvent>,
}

impl LoopContext {
    /// Resolve and read once. Never fails; problems become failed samples.
    fn poll(&self) -> Sample {
        match self.handle.borrow().clone() {
            Some(handle) => self.poll_with(&handle),
            None => Sample::unresolved(),
        }
    }

    /// Poll through `handle`. If it was closed because another process
    /// replaced it, poll once more through the replacement.
    fn poll_with(&self, handle: &ProcessHandle) -> Sample {
        let sample = self.read_through(handle);
        if sample.success || !handle.is_closed() {
            return sample;
        }
        match self.handle.borrow().clone() {
            Some(next) if !next.is_same(handle) => {
                tracing::trace!(name = %self.name, pid = next.pid(), "Handle replaced, polling again");
                self.read_through(&next)
            }
            _ => sample,
        }
    }

    fn read_through(&self, handle: &ProcessHandle) -> Sample {
        let source = self.source.borrow().clone();
        let Some(address) = source.resolve(Some(handle)) else {
            return Sample::unresolved();
        };

        match handle.read_value(address, self.value_type) {
            Ok(value) => Sample::ok(address, value),
            Err(err) => {
                tracing::trace!(name = %self.name, address = %address, error = %err, "Read failed");
                Sample::failed(address)
            }
        }
    }

    fn publish(&self, previous: &Sample, current: &Sample) {
        if let Some(change) = previous.diff(&self.name, current) {
            tracing::trace!(
                name = %self.name,
                from = ?change.previous_value,
                to = ?change.current_value,
                "Value changed"
            );
            // No subscribers is not an error.
            let _ = self.events.send(WatchEvent::Changed(change));
        }
    }

    async fn wait_for_address(&self, cancel: &CancellationToken) -> Option<Sample> {
        tracing::debug!(name = %self.name, "Address unresolved, waiting");
        while pause(cancel, self.interval).await {
            let sample = self.poll();
            if sample.address.is_some() {
                tracing::debug!(name = %self.name, "Address resolved");
                return Some(sample);
            }
        }
        None
    }

    async fn run(self, cancel: CancellationToken) -> Sample {
        let mut previous = self.poll();
        tracing::debug!(name = %self.name, success = previous.success, "Baseline sample taken");

        while pause(&cancel, self.interval).await {
            let current = self.poll();
            self.publish(&previous, &current);
            let resolved = current.address.is_some();
            previous = current;

            if !resolved {
                let Some(current) = self.wait_for_address(&cancel).await else {
                    break;
                };
                self.publish(&previous, &current);
                previous = current;
            }
        }

        previous
    }
}

/// Owner of one polling task.
///
/// Dropping a running loop cancels its task without waiting for it.
#[derive(Debug, Default)]
pub struct WatchLoop {
    name: String,
    state: WatchState,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<Sample>>,
}

impl WatchLoop {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> WatchState {
        self.state
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == WatchState::Running
    }

    fn transition(&mut self, to: WatchState) {
        tracing::debug!(name = %self.name, from = ?self.state, to = ?to, "Watch state transition");
        self.state = to;
    }

    /// Spawn the polling task.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::AlreadyRunning` unless the loop is idle.
    pub fn start(&mut self, context: LoopContext) -> Result<(), WatchError> {
        if self.state != WatchState::Idle {
            return Err(WatchError::AlreadyRunning(context.name));
        }

        let cancel = CancellationToken::new();
        self.name.clone_from(&context.name);
        self.task = Some(tokio::spawn(context.run(cancel.clone())));
        self.cancel = Some(cancel);
        self.transition(WatchState::Running);
        Ok(())
    }

    /// Cancel the task and wait until it has finished.
    ///
    /// Returns the last sample the task took. A no-op on an idle loop.
    pub async fn stop(&mut self) -> Option<Sample> {
        if self.state == WatchState::Idle {
            return None;
        }
        self.transition(WatchState::Stopping);

        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        let last = match self.task.take() {
            Some(task) => match task.await {
                Ok(sample) => Some(sample),
                Err(err) => {
                    tracing::warn!(name = %self.name, error = %err, "Watch task ended abnormally");
                    None
                }
            },
            None => None,
        };

        self.transition(WatchState::Idle);
        last
    }
}

impl Drop for WatchLoop {
    fn drop(&mut self) {
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
    }
}
