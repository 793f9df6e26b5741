//! Colored CLI display utilities for watch output.
//!
//! Every line starts with a timestamp and a bracketed tag, so output from
//! several watches stays readable when interleaved.

use std::io::{self, Write};

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::memory::{Address, PointerChain, Value};
use crate::watch::{ChangeEvent, WatchEvent, WatchInfo};

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

fn format_value(value: Option<&Value>) -> String {
    value.map_or_else(|| "-".to_string(), ToString::to_string)
}

fn format_address(address: Option<Address>) -> String {
    address.map_or_else(|| "?".to_string(), |address| address.to_string())
}

/// Format a change as `old -> new`, marking unavailable sides.
#[must_use]
pub fn format_change(change: &ChangeEvent) -> String {
    let previous = if change.previous_success {
        format_value(change.previous_value.as_ref())
    } else {
        "<unavailable>".to_string()
    };
    let current = if change.current_success {
        format_value(change.current_value.as_ref())
    } else {
        "<unavailable>".to_string()
    };
    format!("{previous} -> {current}")
}

/// Print one event in colored text form.
pub fn print_event(event: &WatchEvent) {
    let ts = timestamp();
    match event {
        WatchEvent::Changed(change) => {
            let tag = if change.current_success {
                "[CHANGE]".green().bold().to_string()
            } else {
                "[LOST]".red().bold().to_string()
            };
            println!(
                "{} {} {} {} {}",
                ts.dimmed(),
                tag,
                change.name.bold(),
                format_change(change),
                format!("@ {}", format_address(change.address)).dimmed()
            );
        }
        WatchEvent::AddressUpdated { name, address } => {
            println!(
                "{} {} {} -> {}",
                ts.dimmed(),
                "[ADDRESS]".cyan().bold(),
                name.bold(),
                address
            );
        }
        WatchEvent::ProcessExited { pid } => {
            println!(
                "{} {} pid={}",
                ts.dimmed(),
                "[EXITED]".yellow().bold(),
                pid
            );
        }
        WatchEvent::ProcessReacquired { pid } => {
            println!(
                "{} {} pid={}",
                ts.dimmed(),
                "[ATTACHED]".blue().bold(),
                pid
            );
        }
    }
    let _ = io::stdout().flush();
}

/// Print one event as a JSON line.
pub fn print_event_json(event: &WatchEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(err) => tracing::warn!(error = %err, "Failed to serialize event"),
    }
    let _ = io::stdout().flush();
}

/// Print a value read from memory.
pub fn print_value(address: Address, value: &Value) {
    println!("{} {}", address.to_string().cyan(), value.bold());
    let _ = io::stdout().flush();
}

/// Print a successful write.
pub fn print_written(address: Address, value: &Value) {
    println!(
        "{} {} <- {}",
        "[WRITE]".green().bold(),
        address.to_string().cyan(),
        value
    );
    let _ = io::stdout().flush();
}

/// Print the result of resolving a pointer chain.
pub fn print_resolved(chain: &PointerChain, address: Option<Address>) {
    match address {
        Some(address) => println!("{} = {}", chain, address.to_string().cyan().bold()),
        None => println!("{} = {}", chain, "unresolved".red()),
    }
    let _ = io::stdout().flush();
}

/// Print the registered watches.
pub fn print_watches(watches: &[WatchInfo]) {
    for info in watches {
        println!(
            "{} {} {} every {}ms {}",
            "[WATCH]".magenta().bold(),
            info.name.bold(),
            info.value_type,
            info.interval.as_millis(),
            info.source.dimmed()
        );
    }
    let _ = io::stdout().flush();
}
