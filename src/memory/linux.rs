//! `/proc`-backed memory access for Linux targets.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

use super::{Address, MemoryError, PointerWidth, ProcessMemory};

/// ELF identification byte holding the file class.
const EI_CLASS: usize = 4;
const ELFCLASS32: u8 = 1;
const ELFCLASS64: u8 = 2;

/// A live Linux process accessed through `/proc/<pid>/mem`.
///
/// Requires ptrace permission over the target (same user with
/// `kernel.yama.ptrace_scope = 0`, or `CAP_SYS_PTRACE`).
#[derive(Debug)]
pub struct LinuxProcess {
    pid: u32,
    mem: File,
    writable: bool,
}

impl LinuxProcess {
    /// Open the memory of process `pid`.
    ///
    /// Falls back to read-only access if the memory file cannot be opened for
    /// writing.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::ProcessNotFound` if no such process exists, or
    /// `MemoryError::Io` if access is denied.
    pub fn open(pid: u32) -> Result<Self, MemoryError> {
        let path = proc_path(pid, "mem");
        let not_found = |err: std::io::Error| {
            if err.kind() == ErrorKind::NotFound {
                MemoryError::ProcessNotFound(pid)
            } else {
                MemoryError::Io(err)
            }
        };

        match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(mem) => Ok(Self {
                pid,
                mem,
                writable: true,
            }),
            Err(err) if err.kind() == ErrorKind::PermissionDenied => {
                tracing::debug!(pid, "Opening process memory read-only");
                let mem = File::open(&path).map_err(not_found)?;
                Ok(Self {
                    pid,
                    mem,
                    writable: false,
                })
            }
            Err(err) => Err(not_found(err)),
        }
    }

    /// Process id.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether writes are possible.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

fn proc_path(pid: u32, entry: &str) -> PathBuf {
    Path::new("/proc").join(pid.to_string()).join(entry)
}

/// Lowest start address of any mapping backed by a file named `module`.
fn find_module_base(maps: &str, module: &str) -> Option<Address> {
    maps.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let range = fields.next()?;
            let path = fields.nth(4)?;
            let file_name = Path::new(path).file_name()?.to_str()?;
            if !file_name.eq_ignore_ascii_case(module) {
                return None;
            }
            let start = range.split('-').next()?;
            u64::from_str_radix(start, 16).ok().map(Address::new)
        })
        .min()
}

fn elf_class(header: &[u8]) -> Option<PointerWidth> {
    if header.len() <= EI_CLASS || &header[..4] != b"\x7fELF" {
        return None;
    }
    match header[EI_CLASS] {
        ELFCLASS32 => Some(PointerWidth::Bits32),
        ELFCLASS64 => Some(PointerWidth::Bits64),
        _ => None,
    }
}

impl ProcessMemory for LinuxProcess {
    fn read_raw(&self, address: Address, len: usize) -> Result<Vec<u8>, MemoryError> {
        let mut buf = vec![0u8; len];
        self.mem
            .read_exact_at(&mut buf, address.as_u64())
            .map_err(|_| MemoryError::Read { address, size: len })?;
        Ok(buf)
    }

    fn write_raw(&self, address: Address, bytes: &[u8]) -> Result<(), MemoryError> {
        if !self.writable {
            return Err(MemoryError::Write {
                address,
                size: bytes.len(),
            });
        }
        self.mem
            .write_all_at(bytes, address.as_u64())
            .map_err(|_| MemoryError::Write {
                address,
                size: bytes.len(),
            })
    }

    fn module_base(&self, module: &str) -> Result<Option<Address>, MemoryError> {
        let maps = std::fs::read_to_string(proc_path(self.pid, "maps")).map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                MemoryError::ProcessNotFound(self.pid)
            } else {
                MemoryError::Io(err)
            }
        })?;
        Ok(find_module_base(&maps, module))
    }

    fn is_alive(&self) -> bool {
        let Ok(raw) = i32::try_from(self.pid) else {
            return false;
        };
        // A zombie still answers signal 0, so check its state as well.
        let running = matches!(kill(Pid::from_raw(raw), None), Ok(()) | Err(Errno::EPERM));
        running && !is_zombie(self.pid)
    }

    fn pointer_width(&self) -> Option<PointerWidth> {
        let mut header = [0u8; 16];
        File::open(proc_path(self.pid, "exe"))
            .and_then(|mut exe| exe.read_exact(&mut header))
            .ok()?;
        elf_class(&header)
    }
}

fn is_zombie(pid: u32) -> bool {
    std::fs::read_to_string(proc_path(pid, "stat"))
        .ok()
        .and_then(|stat| {
            // The command name may contain spaces; the state follows the last ')'.
            let (_, rest) = stat.rsplit_once(')')?;
            rest.split_whitespace().next().map(|state| state == "Z")
        })
        .unwrap_or(false)
}
