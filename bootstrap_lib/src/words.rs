use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Bounds-checked reads of fixed-size integers out of a raw table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Words {
    pub big_endian: bool,
    /// Size of an address in bytes, 4 or 8.
    pub ptr_size: usize,
}

impl Words {
    pub fn u32_at(&self, data: &[u8], offset: usize) -> Option<u32> {
        let bytes = data.get(offset..offset.checked_add(4)?)?;
        Some(if self.big_endian {
            BigEndian::read_u32(bytes)
        } else {
            LittleEndian::read_u32(bytes)
        })
    }

    pub fn u64_at(&self, data: &[u8], offset: usize) -> Option<u64> {
        let bytes = data.get(offset..offset.checked_add(8)?)?;
        Some(if self.big_endian {
            BigEndian::read_u64(bytes)
        } else {
            LittleEndian::read_u64(bytes)
        })
    }

    /// Reads an address-sized word.
    pub fn word_at(&self, data: &[u8], offset: usize) -> Option<u64> {
        match self.ptr_size {
            4 => self.u32_at(data, offset).map(u64::from),
            _ => self.u64_at(data, offset),
        }
    }
}

/// The NUL-terminated string starting at `offset`.
pub(crate) fn c_str_at(data: &[u8], offset: usize) -> Option<&str> {
    let tail = data.get(offset..)?;
    let len = tail.iter().position(|&b| b == 0)?;
    std::str::from_utf8(&tail[..len]).ok()
}
