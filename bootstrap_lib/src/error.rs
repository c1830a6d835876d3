use std::io;

use thiserror::Error;

use crate::memory::ProcessId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to deliver {signal} to pid {pid}: {source}")]
    SignalFailed {
        pid: i32,
        signal: &'static str,
        #[source]
        source: nix::Error,
    },

    #[error("failed to wait for pid {pid}: {source}")]
    WaitFailed {
        pid: i32,
        #[source]
        source: io::Error,
    },

    #[error("memory mappings of process {pid} unavailable: {reason}")]
    MappingUnavailable { pid: ProcessId, reason: String },

    #[error("cannot open memory of process {pid}: {source}")]
    MemoryAccessDenied {
        pid: ProcessId,
        #[source]
        source: io::Error,
    },

    #[error("failed to read memory at {address:#x}: {source}")]
    ReadFault {
        address: u64,
        #[source]
        source: io::Error,
    },

    #[error("failed to write memory at {address:#x}: {source}")]
    WriteFault {
        address: u64,
        #[source]
        source: io::Error,
    },

    #[error("short write at {address:#x}: {written} of {expected} bytes")]
    PartialWrite {
        address: u64,
        written: usize,
        expected: usize,
    },

    #[error("malformed image: {0}")]
    MalformedImage(String),

    #[error("image has no {0} section")]
    MissingSection(&'static str),

    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("payload of {payload} bytes does not fit in {target} byte function")]
    PayloadTooLarge { payload: usize, target: usize },
}

impl From<goblin::error::Error> for Error {
    fn from(err: goblin::error::Error) -> Self {
        Self::MalformedImage(err.to_string())
    }
}
