use memwatch::memory::{
    resolve_chain, Address, FakeMemory, PointerChain, PointerWidth, ProcessMemory, Value,
};

const BASE: Address = Address::new(0x40_0000);
const P1: Address = Address::new(0x7000_1000);
const P2: Address = Address::new(0x7000_8000);

/// base+0x10 -> p1; p1+0x20 -> p2; p2+0x4 is the final address.
fn three_level_memory() -> FakeMemory {
    let memory = FakeMemory::new();
    memory.add_module("game", BASE);
    memory.put_pointer(Address::new(0x40_0010), P1);
    memory.put_pointer(Address::new(0x7000_1020), P2);
    memory.put_value(Address::new(0x7000_8004), &Value::I32(1337));
    memory
}

#[test]
fn chain_resolves_to_final_address() {
    let memory = three_level_memory();
    let resolved = resolve_chain(&memory, BASE, 0x10, &[0x20, 0x4], PointerWidth::Bits64);
    assert_eq!(resolved, Some(Address::new(0x7000_8004)));

    let bytes = memory.read_raw(resolved.unwrap(), 4).unwrap();
    assert_eq!(i32::from_le_bytes(bytes.try_into().unwrap()), 1337);
}

#[test]
fn failing_intermediate_read_is_unresolved() {
    let memory = three_level_memory();
    memory.fail_reads_at(Address::new(0x7000_1020));
    let resolved = resolve_chain(&memory, BASE, 0x10, &[0x20, 0x4], PointerWidth::Bits64);
    assert_eq!(resolved, None);
}

#[test]
fn final_address_is_not_dereferenced() {
    let memory = three_level_memory();
    // The final target is unreadable, but resolution only reads intermediate pointers.
    memory.fail_reads_at(Address::new(0x7000_8004));
    let resolved = resolve_chain(&memory, BASE, 0x10, &[0x20, 0x4], PointerWidth::Bits64);
    assert_eq!(resolved, Some(Address::new(0x7000_8004)));
}

#[test]
fn parsed_chain_matches_manual_walk() {
    let memory = three_level_memory();
    let chain: PointerChain = "game+0x10 -> 0x20 -> 0x4".parse().unwrap();
    assert_eq!(
        chain.resolve(&memory, PointerWidth::Bits64),
        Some(Address::new(0x7000_8004))
    );
}

#[test]
fn unloaded_module_is_unresolved() {
    let memory = three_level_memory();
    memory.remove_module("game");
    let chain = PointerChain::new("game", 0x10, vec![0x20, 0x4]);
    assert_eq!(chain.resolve(&memory, PointerWidth::Bits64), None);
}

#[test]
fn repointing_changes_result() {
    let memory = three_level_memory();
    let chain = PointerChain::new("game", 0x10, vec![0x20, 0x4]);

    memory.put_pointer(Address::new(0x7000_1020), Address::new(0x7100_0000));
    assert_eq!(
        chain.resolve(&memory, PointerWidth::Bits64),
        Some(Address::new(0x7100_0004))
    );
}
