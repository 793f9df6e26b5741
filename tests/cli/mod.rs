//! CLI binary tests.

use std::process::Command;

fn memwatch() -> Command {
    Command::new(env!("CARGO_BIN_EXE_memwatch"))
}

#[test]
fn test_help_lists_subcommands() {
    let output = memwatch()
        .arg("--help")
        .output()
        .expect("Failed to execute command");
    let stdout = String::from_utf8_lossy(&output.stdout);

    for subcommand in ["watch", "read", "write", "resolve"] {
        assert!(
            stdout.contains(subcommand),
            "Help should mention the {subcommand} subcommand"
        );
    }
}

#[test]
fn test_read_requires_a_target() {
    let output = memwatch()
        .args(["read", "--address", "0x1000", "--type", "i32"])
        .output()
        .expect("Failed to execute command");
    assert!(!output.status.success());
}

#[test]
fn test_rejects_bad_pointer_chain() {
    let output = memwatch()
        .args(["resolve", "--pid", "1", "--pointer", "game+zz"])
        .output()
        .expect("Failed to execute command");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid address or offset"));
}

#[test]
fn test_watch_without_process_name_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("memwatch.toml");
    std::fs::write(&config, "auto_reacquire = false\n").unwrap();

    let output = memwatch()
        .args(["watch", "--config"])
        .arg(&config)
        .output()
        .expect("Failed to execute command");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No process name given"));
}
