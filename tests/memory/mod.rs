//! Memory module tests.

mod pointer_test;

/// Verify all public memory types are exported from the library.
#[test]
fn test_all_memory_types_exported() {
    use memwatch::memory::{
        parse_offset, resolve_chain, Address, AddressParseError, FakeMemory, MemoryError,
        PointerChain, PointerWidth, ProcessMemory, Value, ValueParseError, ValueType,
    };

    let memory = FakeMemory::new();
    let _: &dyn ProcessMemory = &memory;
    let _ = resolve_chain(&memory, Address::NULL, 0, &[], PointerWidth::host());
    let _ = PointerChain::new("game", 0, vec![]);
    let _ = Value::U8(0).value_type() == ValueType::U8;
    let _: fn() -> MemoryError = || MemoryError::Closed;
    let _: Result<i64, AddressParseError> = parse_offset("0x10");
    let _: Result<Value, ValueParseError> = Value::parse(ValueType::U8, "1");
}
