use std::sync::Arc;
use std::time::Duration;

use memwatch::address::RefreshMode;
use memwatch::memory::{Address, FakeMemory, PointerChain, Value, ValueType};
use memwatch::process::{FakeFinder, ProcessHandle, ProcessTracker, TrackerConfig};
use memwatch::watch::{Sample, WatchDescriptor, WatchEvent, WatchState};
use tokio_test::assert_ok;

use crate::common::{fake_process, next_change, wait_for, FAST, SETTLE};

const MODULE_BASE: Address = Address::new(0x40_0000);

fn fast_config(auto_reacquire: bool) -> TrackerConfig {
    TrackerConfig {
        process_name: Some("game".to_string()),
        auto_reacquire,
        reacquire_interval: FAST,
        exit_poll_interval: FAST,
    }
}

/// A process whose `game+0x10 -> 0x8` chain lands on `object + 8`.
fn process_with_object(pid: u32, object: Address, value: u32) -> (ProcessHandle, Arc<FakeMemory>) {
    let (handle, memory) = fake_process(pid, "game");
    memory.add_module("game", MODULE_BASE);
    memory.put_pointer(Address::new(0x40_0010), object);
    memory.put_value(Address::new(object.as_u64() + 8), &Value::U32(value));
    (handle, memory)
}

fn ammo_watch() -> WatchDescriptor {
    WatchDescriptor::pointer_chain(
        "ammo",
        ValueType::U32,
        PointerChain::new("game", 0x10, vec![0x8]),
        None,
        RefreshMode::OnAttach,
    )
    .with_interval(FAST)
}

#[tokio::test]
async fn exit_stops_loops_and_reacquire_resumes_with_new_handle() {
    let finder = Arc::new(FakeFinder::new());
    let tracker = ProcessTracker::new(fast_config(true), finder.clone());
    let registry = tracker.registry();
    let mut events = registry.subscribe();

    assert_ok!(registry.add(ammo_watch()).await);

    // First process.
    let (first, first_memory) = process_with_object(100, Address::new(0x5000), 30);
    tracker.attach(first.clone()).await;
    let (before, attached) = wait_for(&mut events, |e| {
        matches!(e, WatchEvent::ProcessReacquired { .. })
    })
    .await;
    assert_eq!(attached, WatchEvent::ProcessReacquired { pid: 100 });
    assert_eq!(
        before,
        vec![WatchEvent::AddressUpdated {
            name: "ammo".to_string(),
            address: Address::new(0x5008),
        }]
    );

    assert_ok!(registry.start("ammo").await);
    tokio::time::sleep(SETTLE).await;
    first_memory.put_value(Address::new(0x5008), &Value::U32(29));
    let change = next_change(&mut events).await;
    assert_eq!(change.current_value, Some(Value::U32(29)));

    // The process exits; a new one with a different layout starts later.
    finder.remove("game");
    first_memory.kill();
    wait_for(&mut events, |e| {
        matches!(e, WatchEvent::ProcessExited { pid: 100 })
    })
    .await;
    assert!(first.is_closed());
    assert!(registry.running().await.is_empty());
    assert!(tracker.handle().is_none());

    let (second, second_memory) = process_with_object(200, Address::new(0x9000), 60);
    finder.insert(second);

    // Updatable address is refreshed before the loops resume.
    let (before, attached) = wait_for(&mut events, |e| {
        matches!(e, WatchEvent::ProcessReacquired { .. })
    })
    .await;
    assert_eq!(attached, WatchEvent::ProcessReacquired { pid: 200 });
    assert!(before.contains(&WatchEvent::AddressUpdated {
        name: "ammo".to_string(),
        address: Address::new(0x9008),
    }));
    assert_eq!(registry.running().await, vec!["ammo".to_string()]);

    // Polling continues against the new process.
    tokio::time::sleep(SETTLE).await;
    second_memory.put_value(Address::new(0x9008), &Value::U32(59));
    let change = wait_for(&mut events, |e| matches!(e, WatchEvent::Changed(_))).await.1;
    let WatchEvent::Changed(change) = change else {
        unreachable!()
    };
    assert_eq!(change.previous_value, Some(Value::U32(60)));
    assert_eq!(change.current_value, Some(Value::U32(59)));
    assert_eq!(change.address, Some(Address::new(0x9008)));

    tracker.shutdown().await;
    assert!(registry.running().await.is_empty());
}

#[tokio::test]
async fn without_auto_reacquire_loops_stay_stopped() {
    let finder = Arc::new(FakeFinder::new());
    let tracker = ProcessTracker::new(fast_config(false), finder.clone());
    let registry = tracker.registry();
    let mut events = registry.subscribe();

    let (first, first_memory) = process_with_object(1, Address::new(0x5000), 1);
    finder.insert(first.clone());
    assert_ok!(registry.add(ammo_watch()).await);
    tracker.attach(first).await;
    assert_ok!(registry.start("ammo").await);

    first_memory.kill();
    wait_for(&mut events, |e| matches!(e, WatchEvent::ProcessExited { .. })).await;

    let (second, _) = process_with_object(2, Address::new(0x6000), 2);
    finder.insert(second);
    tokio::time::sleep(SETTLE).await;

    assert!(tracker.handle().is_none());
    assert!(registry.running().await.is_empty());

    // A manual attach resumes what was running at exit.
    let found = assert_ok!(tracker.wait_for_process("game").await).unwrap();
    assert_eq!(found.pid(), 2);
    assert_eq!(registry.running().await, vec!["ammo".to_string()]);

    tracker.shutdown().await;
}

#[tokio::test]
async fn watches_idle_at_exit_are_not_started_on_reattach() {
    let finder = Arc::new(FakeFinder::new());
    let tracker = ProcessTracker::new(fast_config(true), finder.clone());
    let registry = tracker.registry();
    let mut events = registry.subscribe();

    assert_ok!(registry.add(ammo_watch()).await);
    let (first, first_memory) = process_with_object(1, Address::new(0x5000), 1);
    tracker.attach(first).await;

    first_memory.kill();
    wait_for(&mut events, |e| matches!(e, WatchEvent::ProcessExited { .. })).await;
    let (second, _) = process_with_object(2, Address::new(0x5000), 1);
    finder.insert(second);
    wait_for(&mut events, |e| {
        matches!(e, WatchEvent::ProcessReacquired { pid: 2 })
    })
    .await;

    assert!(registry.running().await.is_empty());
    tracker.shutdown().await;
}

#[tokio::test]
async fn detach_clears_handle_and_stops_everything() {
    let tracker = ProcessTracker::new(fast_config(true), Arc::new(FakeFinder::new()));
    let registry = tracker.registry();
    let (handle, _) = process_with_object(5, Address::new(0x5000), 1);

    assert_ok!(registry.add(ammo_watch()).await);
    tracker.attach(handle.clone()).await;
    assert_ok!(registry.start("ammo").await);

    tracker.detach().await;
    assert!(handle.is_closed());
    assert!(tracker.handle().is_none());
    assert!(registry.running().await.is_empty());
}

#[tokio::test]
async fn exit_leaves_running_watches_on_a_lost_sample() {
    let tracker = ProcessTracker::new(fast_config(false), Arc::new(FakeFinder::new()));
    let registry = tracker.registry();
    let mut events = registry.subscribe();
    let (handle, memory) = fake_process(3, "game");
    memory.put_value(Address::new(0x10), &Value::U8(1));

    assert_ok!(
        registry
            .add(
                WatchDescriptor::fixed("flag", ValueType::U8, Address::new(0x10))
                    .with_interval(Duration::from_secs(60))
            )
            .await
    );
    tracker.attach(handle).await;
    assert_ok!(registry.start("flag").await);
    tokio::time::sleep(SETTLE).await;

    memory.kill();
    tracker.notify_exit().await;
    let (before, _) = wait_for(&mut events, |e| {
        matches!(e, WatchEvent::ProcessExited { pid: 3 })
    })
    .await;

    let losses: Vec<_> = before
        .into_iter()
        .filter_map(|e| match e {
            WatchEvent::Changed(change) => Some(change),
            _ => None,
        })
        .collect();
    assert_eq!(losses.len(), 1);
    assert!(losses[0].previous_success);
    assert_eq!(losses[0].previous_value, Some(Value::U8(1)));
    assert!(!losses[0].current_success);
    assert_eq!(losses[0].address, Some(Address::new(0x10)));

    let info = assert_ok!(registry.get("flag").await);
    assert_eq!(info.state, WatchState::Idle);
    assert_eq!(info.last_sample, Some(Sample::unresolved()));
}
