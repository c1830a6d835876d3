//! Access to a process's address space through procfs. A child must be
//! stopped while its memory is captured or patched.

use std::{
    fmt,
    fs::{File, OpenOptions},
    io,
    os::unix::fs::FileExt,
};

use nix::unistd::Pid;
use procfs::process::{MemoryMap, Process};

use crate::{Error, Result};

/// Reads are issued in chunks of this size so a large capture only
/// allocates what is actually mapped.
const READ_CHUNK: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessId {
    Myself,
    Child(Pid),
}

impl ProcessId {
    fn procfs(self) -> procfs::ProcResult<Process> {
        match self {
            ProcessId::Myself => Process::myself(),
            ProcessId::Child(pid) => Process::new(pid.as_raw()),
        }
    }

    fn mem_path(self) -> String {
        match self {
            ProcessId::Myself => "/proc/self/mem".into(),
            ProcessId::Child(pid) => format!("/proc/{}/mem", pid),
        }
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessId::Myself => write!(f, "self"),
            ProcessId::Child(pid) => write!(f, "{}", pid),
        }
    }
}

fn mappings(pid: ProcessId) -> Result<Vec<MemoryMap>> {
    pid.procfs()
        .and_then(|process| process.maps())
        .map_err(|err| Error::MappingUnavailable {
            pid,
            reason: err.to_string(),
        })
}

/// Returns the start address of the first mapped region of the process,
/// which is where its main executable image is loaded.
pub fn base_address(pid: ProcessId) -> Result<u64> {
    mappings(pid)?
        .first()
        .map(|mapped_address_space| mapped_address_space.address.0)
        .ok_or_else(|| Error::MappingUnavailable {
            pid,
            reason: "no mapped regions".into(),
        })
}

/// Address ranges of every mapping of the file mapped at `base`, in address
/// order. Empty if no file mapping starts at `base`.
fn image_mappings(pid: ProcessId, base: u64) -> Result<Vec<(u64, u64)>> {
    let maps = mappings(pid)?;
    let first = match maps.iter().find(|map| map.address.0 == base) {
        Some(first) if first.inode != 0 => first,
        _ => return Ok(vec![]),
    };
    Ok(maps
        .iter()
        .filter(|map| map.address.0 >= base && map.inode == first.inode && map.dev == first.dev)
        .map(|map| map.address)
        .collect())
}

/// An open handle on `/proc/<pid>/mem`.
#[derive(Debug)]
pub struct ProcessMemory {
    pid: ProcessId,
    file: File,
}

impl ProcessMemory {
    pub fn open(pid: ProcessId) -> Result<Self> {
        Self::open_with(pid, OpenOptions::new().read(true).write(true))
    }

    pub fn open_read_only(pid: ProcessId) -> Result<Self> {
        Self::open_with(pid, OpenOptions::new().read(true))
    }

    fn open_with(pid: ProcessId, options: &OpenOptions) -> Result<Self> {
        let file = options
            .open(pid.mem_path())
            .map_err(|source| Error::MemoryAccessDenied { pid, source })?;
        Ok(Self { pid, file })
    }

    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Reads up to `length` bytes starting at `address`.
    ///
    /// The result is shorter than `length` when the mapping ends before
    /// that; it is only an error if not even the first byte is readable.
    pub fn read_at(&self, address: u64, length: usize) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        while bytes.len() < length {
            let start = bytes.len();
            let want = READ_CHUNK.min(length - start);
            bytes.resize(start + want, 0);

            match self.file.read_at(&mut bytes[start..], address + start as u64) {
                Ok(0) => {
                    bytes.truncate(start);
                    break;
                }
                Ok(n) => bytes.truncate(start + n),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => bytes.truncate(start),
                // The kernel refuses to read past the end of a mapping.
                Err(_) if start > 0 => {
                    bytes.truncate(start);
                    break;
                }
                Err(source) => return Err(Error::ReadFault { address, source }),
            }
        }
        Ok(bytes)
    }

    /// Writes `bytes` at `address`, returning how many bytes landed.
    ///
    /// Text pages are writable through this path even though they are
    /// mapped read-only in the process itself.
    pub fn write_at(&self, address: u64, bytes: &[u8]) -> Result<usize> {
        let mut written = 0;
        while written < bytes.len() {
            match self
                .file
                .write_at(&bytes[written..], address + written as u64)
            {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(_) if written > 0 => break,
                Err(source) => return Err(Error::WriteFault { address, source }),
            }
        }
        Ok(written)
    }

    /// Snapshots up to `max_len` bytes of the process starting at `base`.
    pub fn capture(&self, base: u64, max_len: u64) -> Result<AddressSpaceWindow> {
        let length = usize::try_from(max_len).unwrap_or(usize::MAX);
        let bytes = self.read_at(base, length)?;
        Ok(AddressSpaceWindow { base, bytes })
    }

    /// Snapshots up to `max_len` bytes of the executable image loaded at
    /// `base`.
    ///
    /// Unlike `capture` this follows every mapping of the image's file, so
    /// the unmapped pages a loader may leave between segments do not end
    /// the window early. They read as zeros.
    pub fn capture_image(&self, base: u64, max_len: u64) -> Result<AddressSpaceWindow> {
        let spans = image_mappings(self.pid, base)?;
        if spans.is_empty() {
            return self.capture(base, max_len);
        }

        let end = base.saturating_add(max_len);
        let mut bytes = Vec::new();
        for (start, stop) in spans {
            if start >= end {
                break;
            }
            let want = (stop.min(end) - start) as usize;
            let chunk = match self.read_at(start, want) {
                Ok(chunk) => chunk,
                Err(_) if !bytes.is_empty() => break,
                Err(err) => return Err(err),
            };

            bytes.resize((start - base) as usize, 0);
            bytes.extend_from_slice(&chunk);
            if chunk.len() < want {
                break;
            }
        }
        Ok(AddressSpaceWindow { base, bytes })
    }
}

/// A point-in-time copy of `[base, base + len)` of some process.
///
/// Later writes to the process are not reflected here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSpaceWindow {
    base: u64,
    bytes: Vec<u8>,
}

impl AddressSpaceWindow {
    /// Rebuilds a window from a snapshot taken earlier, e.g. one saved to disk.
    pub fn from_snapshot(base: u64, bytes: Vec<u8>) -> Self {
        Self { base, bytes }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The captured bytes for `[address, address + len)`, if all of them
    /// fall inside the window.
    pub fn slice(&self, address: u64, len: usize) -> Option<&[u8]> {
        let start = usize::try_from(address.checked_sub(self.base)?).ok()?;
        self.bytes.get(start..start.checked_add(len)?)
    }
}
