//! Shared helpers for integration tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

use memwatch::memory::FakeMemory;
use memwatch::process::ProcessHandle;
use memwatch::watch::{ChangeEvent, WatchEvent};

/// Poll interval used by fast test watches.
pub const FAST: Duration = Duration::from_millis(5);

/// Upper bound for waiting on any expected event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// Long enough for several fast polls.
pub const SETTLE: Duration = Duration::from_millis(60);

pub fn fake_process(pid: u32, name: &str) -> (ProcessHandle, Arc<FakeMemory>) {
    let memory = Arc::new(FakeMemory::new());
    (ProcessHandle::new(pid, name, memory.clone()), memory)
}

/// Receive the next event, failing the test after [`EVENT_TIMEOUT`].
pub async fn next_event(events: &mut broadcast::Receiver<WatchEvent>) -> WatchEvent {
    tokio::time::timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Receive the next change event.
pub async fn next_change(events: &mut broadcast::Receiver<WatchEvent>) -> ChangeEvent {
    match next_event(events).await {
        WatchEvent::Changed(change) => change,
        other => panic!("expected change event, got {other:?}"),
    }
}

/// Skip events until one matches `predicate`; returns the skipped events and
/// the match.
pub async fn wait_for<F>(
    events: &mut broadcast::Receiver<WatchEvent>,
    predicate: F,
) -> (Vec<WatchEvent>, WatchEvent)
where
    F: Fn(&WatchEvent) -> bool,
{
    let mut skipped = Vec::new();
    loop {
        let event = next_event(events).await;
        if predicate(&event) {
            return (skipped, event);
        }
        skipped.push(event);
    }
}

/// Assert that nothing is queued.
pub fn assert_quiet(events: &mut broadcast::Receiver<WatchEvent>) {
    match events.try_recv() {
        Err(TryRecvError::Empty) => {}
        other => panic!("expected no events, got {other:?}"),
    }
}
