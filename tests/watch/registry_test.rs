use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use memwatch::address::{AddressResolver, AddressSource, RefreshMode};
use memwatch::memory::{Address, PointerChain, Value, ValueType};
use memwatch::watch::{WatchDescriptor, WatchError, WatchEvent, WatchRegistry, WatchState};
use tokio_test::{assert_err, assert_ok};

use crate::common::{assert_quiet, fake_process, next_change, next_event, FAST, SETTLE};

const ADDR: Address = Address::new(0x1000);

#[tokio::test]
async fn stop_is_prompt_regardless_of_interval() {
    let (handle, memory) = fake_process(1, "game");
    memory.put_value(ADDR, &Value::I64(1));
    let registry = WatchRegistry::with_handle(handle);
    assert_ok!(
        registry
            .add(
                WatchDescriptor::fixed("slow", ValueType::I64, ADDR)
                    .with_interval(Duration::from_secs(60))
            )
            .await
    );
    assert_ok!(registry.start("slow").await);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let started = Instant::now();
    assert_ok!(registry.stop("slow").await);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(registry.get("slow").await.unwrap().state, WatchState::Idle);
}

#[tokio::test]
async fn stop_is_prompt_while_waiting_for_address() {
    let (handle, _memory) = fake_process(1, "game");
    let registry = WatchRegistry::with_handle(handle);
    assert_ok!(
        registry
            .add(
                WatchDescriptor::dynamic("never", ValueType::U8, AddressResolver::new("never", |_| None))
                    .with_interval(Duration::from_secs(60))
            )
            .await
    );
    assert_ok!(registry.start("never").await);

    let started = Instant::now();
    assert_ok!(registry.stop("never").await);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn duplicate_add_leaves_running_watch_untouched() {
    let (handle, memory) = fake_process(1, "game");
    memory.put_value(ADDR, &Value::I32(1));
    let registry = WatchRegistry::with_handle(handle);
    let mut events = registry.subscribe();

    assert_ok!(
        registry
            .add(WatchDescriptor::fixed("hp", ValueType::I32, ADDR).with_interval(FAST))
            .await
    );
    assert_ok!(registry.start("hp").await);

    let err = assert_err!(
        registry
            .add(WatchDescriptor::fixed("hp", ValueType::U8, Address::new(0x2000)))
            .await
    );
    assert!(matches!(err, WatchError::DuplicateName(name) if name == "hp"));

    let info = registry.get("hp").await.unwrap();
    assert_eq!(info.state, WatchState::Running);
    assert_eq!(info.value_type, ValueType::I32);

    // Still polling the original address.
    memory.put_value(ADDR, &Value::I32(2));
    let change = next_change(&mut events).await;
    assert_eq!(change.current_value, Some(Value::I32(2)));

    registry.stop_all().await;
}

#[tokio::test]
async fn removed_watch_emits_nothing_more() {
    let (handle, memory) = fake_process(1, "game");
    memory.put_value(ADDR, &Value::U32(1));
    let registry = WatchRegistry::with_handle(handle);

    assert_ok!(
        registry
            .add(WatchDescriptor::fixed("gone", ValueType::U32, ADDR).with_interval(FAST))
            .await
    );
    assert_ok!(registry.start("gone").await);
    tokio::time::sleep(SETTLE).await;

    assert_ok!(registry.remove("gone").await);
    let mut events = registry.subscribe();

    for v in 2..10 {
        memory.put_value(ADDR, &Value::U32(v));
        tokio::time::sleep(FAST).await;
    }
    tokio::time::sleep(SETTLE).await;
    assert_quiet(&mut events);
    assert!(registry.is_empty().await);
    assert!(matches!(
        registry.get("gone").await,
        Err(WatchError::NotFound(_))
    ));
}

#[tokio::test]
async fn stop_all_joins_every_loop() {
    let (handle, _memory) = fake_process(1, "game");
    let registry = WatchRegistry::with_handle(handle);
    for i in 0..8u64 {
        assert_ok!(
            registry
                .add(
                    WatchDescriptor::fixed(format!("w{i}"), ValueType::U8, Address::new(0x100 + i))
                        .with_interval(Duration::from_secs(30))
                )
                .await
        );
    }
    assert_eq!(registry.start_all().await.len(), 8);

    let stopped = registry.stop_all().await;
    assert_eq!(stopped.len(), 8);
    for name in registry.names().await {
        assert_eq!(registry.get(&name).await.unwrap().state, WatchState::Idle);
    }
}

#[tokio::test]
async fn set_source_applies_on_next_poll() {
    let (handle, memory) = fake_process(1, "game");
    memory.put_value(ADDR, &Value::I16(-1));
    memory.put_value(Address::new(0x2000), &Value::I16(-2));
    let registry = WatchRegistry::with_handle(handle);
    let mut events = registry.subscribe();

    assert_ok!(
        registry
            .add(WatchDescriptor::fixed("s", ValueType::I16, ADDR).with_interval(FAST))
            .await
    );
    assert_ok!(registry.start("s").await);
    tokio::time::sleep(SETTLE).await;

    assert_ok!(
        registry
            .set_source("s", AddressSource::Static(Address::new(0x2000)))
            .await
    );
    let change = next_change(&mut events).await;
    assert_eq!(change.previous_value, Some(Value::I16(-1)));
    assert_eq!(change.current_value, Some(Value::I16(-2)));
    assert_eq!(change.address, Some(Address::new(0x2000)));

    registry.stop_all().await;
}

#[tokio::test]
async fn refresh_announces_only_moved_addresses() {
    let (handle, _memory) = fake_process(1, "game");
    let registry = WatchRegistry::with_handle(handle.clone());
    let mut events = registry.subscribe();
    let target = Arc::new(AtomicU64::new(0x500));
    let resolver_target = Arc::clone(&target);

    assert_ok!(
        registry
            .add(WatchDescriptor::updatable(
                "u",
                ValueType::U8,
                AddressResolver::new("moving", move |_| {
                    Some(Address::new(resolver_target.load(Ordering::SeqCst)))
                }),
            ))
            .await
    );
    assert_ok!(
        registry
            .add(WatchDescriptor::fixed("f", ValueType::U8, ADDR))
            .await
    );
    assert_eq!(
        next_event(&mut events).await,
        WatchEvent::AddressUpdated {
            name: "u".to_string(),
            address: Address::new(0x500),
        }
    );
    assert_eq!(registry.refresh_updatable(&handle).await, 0);

    target.store(0x600, Ordering::SeqCst);
    assert_eq!(registry.refresh_updatable(&handle).await, 1);
    assert_eq!(
        next_event(&mut events).await,
        WatchEvent::AddressUpdated {
            name: "u".to_string(),
            address: Address::new(0x600),
        }
    );
    assert_eq!(registry.refresh_updatable(&handle).await, 0);
    assert_quiet(&mut events);
}

#[tokio::test]
async fn one_shot_read_and_write() {
    let (handle, memory) = fake_process(1, "game");
    memory.put_value(ADDR, &Value::F64(0.5));
    let registry = WatchRegistry::with_handle(handle);
    assert_ok!(
        registry
            .add(WatchDescriptor::fixed("speed", ValueType::F64, ADDR))
            .await
    );

    assert_eq!(assert_ok!(registry.read("speed").await), Value::F64(0.5));
    assert_ok!(registry.write("speed", &Value::F64(2.0)).await);
    assert_eq!(assert_ok!(registry.read("speed").await), Value::F64(2.0));

    memory.fail_reads_at(ADDR);
    assert!(matches!(
        registry.read("speed").await,
        Err(WatchError::Memory(_))
    ));
    assert!(matches!(
        registry.write("missing", &Value::F64(1.0)).await,
        Err(WatchError::NotFound(_))
    ));
}

#[tokio::test]
async fn updatable_added_while_attached_resolves_immediately() {
    let (handle, memory) = fake_process(1, "game");
    memory.add_module("game", Address::new(0x40_0000));
    memory.put_pointer(Address::new(0x40_0010), Address::new(0x5000));
    memory.put_value(Address::new(0x5008), &Value::U32(30));
    let registry = WatchRegistry::with_handle(handle);
    let mut events = registry.subscribe();

    assert_ok!(
        registry
            .add(
                WatchDescriptor::pointer_chain(
                    "ammo",
                    ValueType::U32,
                    PointerChain::new("game", 0x10, vec![0x8]),
                    None,
                    RefreshMode::OnAttach,
                )
                .with_interval(FAST)
            )
            .await
    );
    assert_eq!(
        next_event(&mut events).await,
        WatchEvent::AddressUpdated {
            name: "ammo".to_string(),
            address: Address::new(0x5008),
        }
    );
    assert_eq!(assert_ok!(registry.read("ammo").await), Value::U32(30));

    assert_ok!(registry.start("ammo").await);
    tokio::time::sleep(SETTLE).await;
    memory.put_value(Address::new(0x5008), &Value::U32(29));
    let change = next_change(&mut events).await;
    assert_eq!(change.previous_value, Some(Value::U32(30)));
    assert_eq!(change.current_value, Some(Value::U32(29)));

    registry.stop_all().await;
}
