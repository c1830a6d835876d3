use crate::{memory::ProcessMemory, resolve::ResolvedFunction, Error, Result};

/// Bytes to write over the start of a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchSpec {
    target: u64,
    payload: Vec<u8>,
}

impl PatchSpec {
    /// Fails if `payload` would run past the end of `target` into whatever
    /// code follows it. A shorter payload leaves the tail of the original
    /// body in place.
    pub fn new(target: &ResolvedFunction, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > target.length {
            return Err(Error::PayloadTooLarge {
                payload: payload.len(),
                target: target.length,
            });
        }
        Ok(Self {
            target: target.entry,
            payload,
        })
    }

    pub fn target(&self) -> u64 {
        self.target
    }
}

/// Writes the patch, returning the number of bytes written.
pub fn apply(memory: &ProcessMemory, patch: &PatchSpec) -> Result<usize> {
    let written = memory.write_at(patch.target, &patch.payload)?;
    if written < patch.payload.len() {
        return Err(Error::PartialWrite {
            address: patch.target,
            written,
            expected: patch.payload.len(),
        });
    }
    Ok(written)
}
