//! Process lifecycle tracking.
//!
//! The tracker owns the current [`ProcessHandle`] and publishes it to every
//! watch loop. When the process exits it stops the loops, and when a process
//! is attached again it refreshes updatable addresses before resuming them.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use super::{ProcessError, ProcessFinder, ProcessHandle};
use crate::memory::ProcessMemory;
use crate::watch::{pause, WatchError, WatchEvent, WatchRegistry, MIN_POLL_INTERVAL};

/// Default delay between reacquire attempts.
pub const DEFAULT_REACQUIRE_INTERVAL: Duration = Duration::from_millis(500);

/// Default delay between liveness checks.
pub const DEFAULT_EXIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Tracker settings.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Name to look for when reacquiring after an exit.
    pub process_name: Option<String>,
    /// Reattach automatically when a process of the same name appears.
    pub auto_reacquire: bool,
    pub reacquire_interval: Duration,
    pub exit_poll_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            process_name: None,
            auto_reacquire: true,
            reacquire_interval: DEFAULT_REACQUIRE_INTERVAL,
            exit_poll_interval: DEFAULT_EXIT_POLL_INTERVAL,
        }
    }
}

struct Inner {
    config: TrackerConfig,
    finder: Arc<dyn ProcessFinder>,
    registry: Arc<WatchRegistry>,
    handle: watch::Sender<Option<ProcessHandle>>,
    /// Watches that were running when the last process exited.
    resume: Mutex<Vec<String>>,
    /// Serializes attach, exit handling and detach.
    transition: Mutex<()>,
    monitor: StdMutex<Option<CancellationToken>>,
    reacquire: StdMutex<Option<CancellationToken>>,
    shutdown: CancellationToken,
}

/// Tracks one target process across exits and restarts.
#[derive(Clone)]
pub struct ProcessTracker {
    inner: Arc<Inner>,
}

impl ProcessTracker {
    /// Create a tracker with no process attached and an empty registry.
    ///
    /// Both intervals are clamped to [`MIN_POLL_INTERVAL`].
    #[must_use]
    pub fn new(mut config: TrackerConfig, finder: Arc<dyn ProcessFinder>) -> Self {
        config.reacquire_interval = config.reacquire_interval.max(MIN_POLL_INTERVAL);
        config.exit_poll_interval = config.exit_poll_interval.max(MIN_POLL_INTERVAL);
        let (handle, handle_rx) = watch::channel(None);
        let registry = Arc::new(WatchRegistry::new(handle_rx));
        Self {
            inner: Arc::new(Inner {
                config,
                finder,
                registry,
                handle,
                resume: Mutex::new(Vec::new()),
                transition: Mutex::new(()),
                monitor: StdMutex::new(None),
                reacquire: StdMutex::new(None),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// The registry whose loops follow this tracker's handle.
    #[must_use]
    pub fn registry(&self) -> Arc<WatchRegistry> {
        Arc::clone(&self.inner.registry)
    }

    /// The currently attached process.
    #[must_use]
    pub fn handle(&self) -> Option<ProcessHandle> {
        self.inner.handle.borrow().clone()
    }

    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    /// Attach to `handle`, replacing any current process.
    ///
    /// Updatable addresses are refreshed before the handle is published, so
    /// resumed loops never poll the new process with stale addresses.
    pub async fn attach(&self, handle: ProcessHandle) {
        let _guard = self.inner.transition.lock().await;
        cancel_slot(&self.inner.reacquire);
        cancel_slot(&self.inner.monitor);

        self.inner.registry.refresh_updatable(&handle).await;

        if let Some(old) = self.inner.handle.send_replace(Some(handle.clone())) {
            if !old.is_same(&handle) {
                old.close();
            }
        }
        tracing::info!(pid = handle.pid(), name = %handle.name(), "Process attached");
        self.inner
            .registry
            .emit(WatchEvent::ProcessReacquired { pid: handle.pid() });

        let resume = std::mem::take(&mut *self.inner.resume.lock().await);
        for name in resume {
            match self.inner.registry.start(&name).await {
                Ok(()) => tracing::debug!(name = %name, "Watch resumed"),
                Err(WatchError::AlreadyRunning(_) | WatchError::NotFound(_)) => {}
                Err(err) => tracing::warn!(name = %name, error = %err, "Failed to resume watch"),
            }
        }

        self.spawn_monitor(handle);
    }

    /// Handle an exit of the current process reported from outside.
    pub async fn notify_exit(&self) {
        if let Some(handle) = self.handle() {
            self.handle_exit(&handle).await;
        }
    }

    /// Poll for a process named `name` until it appears, then attach to it.
    ///
    /// Returns `Ok(None)` if the tracker was shut down while waiting.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::Unsupported` if processes cannot be enumerated
    /// on this platform.
    pub async fn wait_for_process(&self, name: &str) -> Result<Option<ProcessHandle>, ProcessError> {
        let cancel = self.inner.shutdown.child_token();
        let Some(handle) = self.poll_for(name, &cancel).await? else {
            return Ok(None);
        };
        self.attach(handle.clone()).await;
        Ok(Some(handle))
    }

    /// Stop all watches and drop the current process without reacquiring.
    pub async fn detach(&self) {
        let _guard = self.inner.transition.lock().await;
        cancel_slot(&self.inner.reacquire);
        cancel_slot(&self.inner.monitor);

        self.inner.registry.stop_all().await;
        self.inner.resume.lock().await.clear();
        if let Some(old) = self.inner.handle.send_replace(None) {
            tracing::info!(pid = old.pid(), "Process detached");
            old.close();
        }
    }

    /// Detach and cancel every background task for good.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.detach().await;
    }

    async fn handle_exit(&self, handle: &ProcessHandle) {
        let _guard = self.inner.transition.lock().await;
        let current = self.handle();
        if !current.is_some_and(|current| current.is_same(handle)) {
            return;
        }
        cancel_slot(&self.inner.monitor);

        tracing::warn!(pid = handle.pid(), name = %handle.name(), "Process exited");
        handle.close();
        self.inner.handle.send_replace(None);

        let stopped = self.inner.registry.halt_all().await;
        *self.inner.resume.lock().await = stopped;
        self.inner
            .registry
            .emit(WatchEvent::ProcessExited { pid: handle.pid() });

        if !self.inner.config.auto_reacquire || self.inner.shutdown.is_cancelled() {
            return;
        }
        let name = self
            .inner
            .config
            .process_name
            .clone()
            .unwrap_or_else(|| handle.name().to_string());
        self.spawn_reacquire(name);
    }

    async fn poll_for(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ProcessHandle>, ProcessError> {
        loop {
            match self.inner.finder.find_by_name(name).await {
                Ok(Some(handle)) => return Ok(Some(handle)),
                Ok(None) => {}
                Err(ProcessError::Unsupported) => return Err(ProcessError::Unsupported),
                Err(err) => tracing::debug!(name, error = %err, "Process lookup failed"),
            }
            if !pause(cancel, self.inner.config.reacquire_interval).await {
                return Ok(None);
            }
        }
    }

    fn spawn_monitor(&self, handle: ProcessHandle) {
        let cancel = self.inner.shutdown.child_token();
        replace_slot(&self.inner.monitor, cancel.clone());

        let tracker = self.clone();
        let interval = self.inner.config.exit_poll_interval;
        tokio::spawn(async move {
            while pause(&cancel, interval).await {
                if !handle.is_alive() {
                    tracker.handle_exit(&handle).await;
                    break;
                }
            }
        });
    }

    fn spawn_reacquire(&self, name: String) {
        let cancel = self.inner.shutdown.child_token();
        replace_slot(&self.inner.reacquire, cancel.clone());

        let tracker = self.clone();
        tokio::spawn(async move {
            tracing::info!(name = %name, "Waiting for process to reappear");
            match tracker.poll_for(&name, &cancel).await {
                Ok(Some(handle)) => tracker.attach(handle).await,
                Ok(None) => tracing::debug!(name = %name, "Reacquire cancelled"),
                Err(err) => tracing::warn!(name = %name, error = %err, "Reacquire abandoned"),
            }
        });
    }
}

impl std::fmt::Debug for ProcessTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessTracker")
            .field("config", &self.inner.config)
            .field("handle", &self.handle())
            .finish_non_exhaustive()
    }
}

/// # Panics
///
/// Panics if the slot lock is poisoned.
fn replace_slot(slot: &StdMutex<Option<CancellationToken>>, token: CancellationToken) {
    let previous = slot.lock().expect("Mutex poisoned").replace(token);
    if let Some(previous) = previous {
        previous.cancel();
    }
}

fn cancel_slot(slot: &StdMutex<Option<CancellationToken>>) {
    if let Some(token) = slot.lock().expect("Mutex poisoned").take() {
        token.cancel();
    }
}
