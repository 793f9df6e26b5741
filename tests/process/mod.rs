//! Process tracking tests.

mod reattach_test;

/// Verify all public process types are exported from the library.
#[test]
fn test_all_process_types_exported() {
    use memwatch::process::{
        FakeFinder, ProcessError, ProcessFinder, SystemFinder, TrackerConfig,
        DEFAULT_EXIT_POLL_INTERVAL, DEFAULT_REACQUIRE_INTERVAL,
    };

    let _: &dyn ProcessFinder = &SystemFinder;
    let _: &dyn ProcessFinder = &FakeFinder::new();
    let _: fn() -> ProcessError = || ProcessError::Unsupported;
    let config = TrackerConfig::default();
    assert!(config.auto_reacquire);
    assert_eq!(config.reacquire_interval, DEFAULT_REACQUIRE_INTERVAL);
    assert_eq!(config.exit_poll_interval, DEFAULT_EXIT_POLL_INTERVAL);
}
