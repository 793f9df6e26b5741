//! Process discovery.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ProcessError, ProcessHandle};

/// Locates target processes and opens handles to them.
#[async_trait]
pub trait ProcessFinder: Send + Sync {
    /// Find a running process by name and open it.
    ///
    /// Returns `Ok(None)` when no such process is running yet.
    async fn find_by_name(&self, name: &str) -> Result<Option<ProcessHandle>, ProcessError>;

    /// Open a running process by pid.
    async fn open(&self, pid: u32) -> Result<ProcessHandle, ProcessError>;
}

/// Finds processes of the running system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemFinder;

/// Length limit of `/proc/<pid>/comm` (TASK_COMM_LEN - 1).
#[cfg(target_os = "linux")]
const COMM_LEN: usize = 15;

#[cfg(target_os = "linux")]
impl SystemFinder {
    async fn process_name(pid: u32) -> Option<String> {
        let comm = tokio::fs::read_to_string(format!("/proc/{pid}/comm"))
            .await
            .ok()?;
        Some(comm.trim_end().to_string())
    }

    async fn exe_name(pid: u32) -> Option<String> {
        let exe = tokio::fs::read_link(format!("/proc/{pid}/exe")).await.ok()?;
        exe.file_name()?.to_str().map(str::to_string)
    }

    async fn matches(pid: u32, name: &str) -> bool {
        if let Some(comm) = Self::process_name(pid).await {
            let truncated = name.get(..COMM_LEN).unwrap_or(name);
            if comm.eq_ignore_ascii_case(truncated) {
                return true;
            }
        }
        Self::exe_name(pid)
            .await
            .is_some_and(|exe| exe.eq_ignore_ascii_case(name))
    }

    fn open_pid(pid: u32, name: String) -> Result<ProcessHandle, ProcessError> {
        ProcessHandle::open_linux(pid, name).map_err(|source| match source {
            crate::memory::MemoryError::ProcessNotFound(pid) => {
                ProcessError::NotFound(pid.to_string())
            }
            source => ProcessError::Open { pid, source },
        })
    }
}

#[cfg(target_os = "linux")]
#[async_trait]
impl ProcessFinder for SystemFinder {
    async fn find_by_name(&self, name: &str) -> Result<Option<ProcessHandle>, ProcessError> {
        let own_pid = std::process::id();
        let mut entries = tokio::fs::read_dir("/proc").await?;
        let mut found: Option<u32> = None;

        while let Some(entry) = entries.next_entry().await? {
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok())
            else {
                continue;
            };
            if pid == own_pid || found.is_some_and(|best| best < pid) {
                continue;
            }
            if Self::matches(pid, name).await {
                found = Some(pid);
            }
        }

        match found {
            Some(pid) => {
                tracing::debug!(pid, name, "Found process");
                Self::open_pid(pid, name.to_string()).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn open(&self, pid: u32) -> Result<ProcessHandle, ProcessError> {
        let name = Self::process_name(pid)
            .await
            .ok_or_else(|| ProcessError::NotFound(pid.to_string()))?;
        Self::open_pid(pid, name)
    }
}

#[cfg(not(target_os = "linux"))]
#[async_trait]
impl ProcessFinder for SystemFinder {
    async fn find_by_name(&self, _name: &str) -> Result<Option<ProcessHandle>, ProcessError> {
        Err(ProcessError::Unsupported)
    }

    async fn open(&self, _pid: u32) -> Result<ProcessHandle, ProcessError> {
        Err(ProcessError::Unsupported)
    }
}

/// A finder over a fixed table of handles, for tests and demos.
#[derive(Debug, Default)]
pub struct FakeFinder {
    processes: Mutex<HashMap<String, ProcessHandle>>,
}

impl FakeFinder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `handle` discoverable under its name.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn insert(&self, handle: ProcessHandle) {
        self.processes
            .lock()
            .expect("Mutex poisoned")
            .insert(handle.name().to_string(), handle);
    }

    /// Hide the process registered under `name`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn remove(&self, name: &str) -> Option<ProcessHandle> {
        self.processes.lock().expect("Mutex poisoned").remove(name)
    }
}

#[async_trait]
impl ProcessFinder for FakeFinder {
    async fn find_by_name(&self, name: &str) -> Result<Option<ProcessHandle>, ProcessError> {
        let processes = self.processes.lock().expect("Mutex poisoned");
        Ok(processes.get(name).cloned())
    }

    async fn open(&self, pid: u32) -> Result<ProcessHandle, ProcessError> {
        let processes = self.processes.lock().expect("Mutex poisoned");
        processes
            .values()
            .find(|handle| handle.pid() == pid)
            .cloned()
            .ok_or_else(|| ProcessError::NotFound(pid.to_string()))
    }
}
