//! Synthetic images for tests: a minimal little-endian ELF64 executable
//! linked at address 0, and Go line tables.

use byteorder::{ByteOrder, LittleEndian};

use crate::memory::AddressSpaceWindow;

const EHDR_SIZE: usize = 64;
const PHDR_SIZE: usize = 56;
const SHDR_SIZE: usize = 64;
const SYM_SIZE: usize = 24;
const TEXT_OFFSET: usize = 0x100;

const DT_NULL: u64 = 0;
const DT_HASH: u64 = 4;
const DT_STRTAB: u64 = 5;
const DT_SYMTAB: u64 = 6;
const DT_STRSZ: u64 = 10;
const DT_GNU_HASH: u64 = 0x6fff_fef5;

fn pad_to(out: &mut Vec<u8>, align: usize) {
    while out.len() % align != 0 {
        out.push(0);
    }
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    let mut buf = [0; 4];
    LittleEndian::write_u32(&mut buf, value);
    out.extend_from_slice(&buf);
}

fn push_u64(out: &mut Vec<u8>, value: u64) {
    let mut buf = [0; 8];
    LittleEndian::write_u64(&mut buf, value);
    out.extend_from_slice(&buf);
}

/// A Go 1.20 style table for functions at `text_start + offset`, the last
/// one ending at `text_start + end`.
pub(crate) fn go118_line_table(text_start: u64, functions: &[(&str, u32)], end: u32) -> Vec<u8> {
    let mut names = vec![];
    let mut name_offsets = vec![];
    for (name, _) in functions {
        name_offsets.push(names.len() as u32);
        names.extend_from_slice(name.as_bytes());
        names.push(0);
    }

    let names_offset = 8 + 8 * 8;
    let funcdata_offset = names_offset + names.len();

    let mut out = vec![0xf1, 0xff, 0xff, 0xff, 0, 0, 1, 8];
    for word in [
        functions.len() as u64,
        0,
        text_start,
        names_offset as u64,
        funcdata_offset as u64,
        funcdata_offset as u64,
        funcdata_offset as u64,
        funcdata_offset as u64,
    ] {
        push_u64(&mut out, word);
    }
    out.extend_from_slice(&names);

    let functab_len = (2 * functions.len() + 1) * 4;
    for (i, (_, entry)) in functions.iter().enumerate() {
        push_u32(&mut out, *entry);
        push_u32(&mut out, (functab_len + 8 * i) as u32);
    }
    push_u32(&mut out, end);
    for ((_, entry), name_offset) in functions.iter().zip(name_offsets) {
        push_u32(&mut out, *entry);
        push_u32(&mut out, name_offset);
    }
    out
}

/// Where the function table of a table built by `go118_line_table` starts.
pub(crate) fn go118_funcdata_offset(table: &[u8]) -> usize {
    LittleEndian::read_u64(&table[8 + 7 * 8..]) as usize
}

/// A Go 1.16 style table in byte order `B`. Addresses are absolute.
pub(crate) fn go116_line_table<B: ByteOrder>(functions: &[(&str, u64)], end: u64) -> Vec<u8> {
    fn word<B: ByteOrder>(out: &mut Vec<u8>, value: u64) {
        let mut buf = [0; 8];
        B::write_u64(&mut buf, value);
        out.extend_from_slice(&buf);
    }
    fn half<B: ByteOrder>(out: &mut Vec<u8>, value: u32) {
        let mut buf = [0; 4];
        B::write_u32(&mut buf, value);
        out.extend_from_slice(&buf);
    }

    let mut names = vec![];
    let mut name_offsets = vec![];
    for (name, _) in functions {
        name_offsets.push(names.len() as u32);
        names.extend_from_slice(name.as_bytes());
        names.push(0);
    }

    let names_offset = 8 + 7 * 8;
    let pcln_offset = (names_offset + names.len()) as u64;

    let mut out = vec![];
    half::<B>(&mut out, 0xffff_fffa);
    out.extend_from_slice(&[0, 0, 1, 8]);
    let header = [
        functions.len() as u64,
        0,
        names_offset as u64,
        pcln_offset,
        pcln_offset,
        pcln_offset,
        pcln_offset,
    ];
    for value in header {
        word::<B>(&mut out, value);
    }
    out.extend_from_slice(&names);

    let functab_len = (2 * functions.len() + 1) * 8;
    for (i, (_, entry)) in functions.iter().enumerate() {
        word::<B>(&mut out, *entry);
        word::<B>(&mut out, (functab_len + 16 * i) as u64);
    }
    word::<B>(&mut out, end);
    for ((_, entry), name_offset) in functions.iter().zip(name_offsets) {
        word::<B>(&mut out, *entry);
        half::<B>(&mut out, name_offset);
        half::<B>(&mut out, 0);
    }
    out
}

/// A Go 1.2 style table, which stores absolute addresses.
pub(crate) fn go12_line_table(functions: &[(&str, u64)], end: u64) -> Vec<u8> {
    let functab_offset = 16;
    let records_offset = functab_offset + (2 * functions.len() + 1) * 8;
    let names_offset = records_offset + functions.len() * 16;

    let mut out = vec![0xfb, 0xff, 0xff, 0xff, 0, 0, 1, 8];
    push_u64(&mut out, functions.len() as u64);
    for (i, (_, entry)) in functions.iter().enumerate() {
        push_u64(&mut out, *entry);
        push_u64(&mut out, (records_offset + 16 * i) as u64);
    }
    push_u64(&mut out, end);

    let mut names = vec![];
    for (name, entry) in functions {
        push_u64(&mut out, *entry);
        push_u32(&mut out, (names_offset + names.len()) as u32);
        push_u32(&mut out, 0);
        names.extend_from_slice(name.as_bytes());
        names.push(0);
    }
    out.extend_from_slice(&names);
    out
}

/// How the dynamic segment tells the size of `.dynsym`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HashStyle {
    #[default]
    Sysv,
    Gnu,
    /// No hash table; only the distance from `.dynsym` to `.dynstr`.
    None,
}

#[derive(Debug, Default)]
pub(crate) struct ElfBuilder {
    functions: Vec<(String, Vec<u8>)>,
    hash_style: HashStyle,
    go_line_table: bool,
    map_section_table: bool,
    dynamic_bias: u64,
}

/// A built image. It is linked at 0, so file offsets and link-time
/// addresses are the same numbers.
#[derive(Debug)]
pub(crate) struct ElfFixture {
    pub bytes: Vec<u8>,
    /// Length of the single loadable segment, which starts at offset 0.
    pub mapped_len: usize,
    /// Link-time entry of each function, in the order they were added.
    pub entries: Vec<u64>,
    pub dynstr_offset: usize,
    /// File offset of the section header table.
    pub section_headers: usize,
}

impl ElfBuilder {
    pub fn new() -> Self {
        Self {
            map_section_table: true,
            ..Self::default()
        }
    }

    pub fn function(mut self, name: &str, code: &[u8]) -> Self {
        self.functions.push((name.into(), code.into()));
        self
    }

    /// Adds a `.gopclntab` naming every function `main.<name>`.
    pub fn go_line_table(mut self) -> Self {
        self.go_line_table = true;
        self
    }

    pub fn hash_style(mut self, hash_style: HashStyle) -> Self {
        self.hash_style = hash_style;
        self
    }

    /// Leaves the section header table outside the loadable segment, the
    /// way most linkers other than Go's place it.
    pub fn unmapped_section_table(mut self) -> Self {
        self.map_section_table = false;
        self
    }

    /// Stores dynamic table pointers already moved by `bias`, as the
    /// dynamic loader leaves them in a running process.
    pub fn relocated_dynamic(mut self, bias: u64) -> Self {
        self.dynamic_bias = bias;
        self
    }

    pub fn build(&self) -> ElfFixture {
        let mut out = vec![0u8; TEXT_OFFSET];

        let text = out.len();
        let mut entries = vec![];
        for (_, code) in &self.functions {
            entries.push(out.len() as u64);
            out.extend_from_slice(code);
            pad_to(&mut out, 16);
        }
        let text_size = out.len() - text;

        let mut dynstr = vec![0u8];
        let mut name_offsets = vec![];
        for (name, _) in &self.functions {
            name_offsets.push(dynstr.len() as u32);
            dynstr.extend_from_slice(name.as_bytes());
            dynstr.push(0);
        }

        pad_to(&mut out, 8);
        let dynsym = out.len();
        out.extend_from_slice(&[0; SYM_SIZE]);
        for (((_, code), entry), name) in self.functions.iter().zip(&entries).zip(&name_offsets) {
            push_u32(&mut out, *name);
            // STB_GLOBAL, STT_FUNC
            out.push(0x12);
            out.push(0);
            out.extend_from_slice(&1u16.to_le_bytes());
            push_u64(&mut out, *entry);
            push_u64(&mut out, code.len() as u64);
        }
        let dynsym_size = out.len() - dynsym;

        let dynstr_offset = out.len();
        out.extend_from_slice(&dynstr);

        pad_to(&mut out, 8);
        let hash = out.len();
        let symbol_count = self.functions.len() as u32 + 1;
        match self.hash_style {
            HashStyle::Sysv => {
                push_u32(&mut out, 1);
                push_u32(&mut out, symbol_count);
                for _ in 0..=symbol_count {
                    push_u32(&mut out, 0);
                }
            }
            HashStyle::Gnu => {
                // One bucket and one bloom word; the chain ends at the last
                // symbol.
                push_u32(&mut out, 1);
                push_u32(&mut out, 1);
                push_u32(&mut out, 1);
                push_u32(&mut out, 0);
                push_u64(&mut out, u64::MAX);
                push_u32(&mut out, u32::from(!self.functions.is_empty()));
                for i in 1..symbol_count {
                    push_u32(&mut out, u32::from(i + 1 == symbol_count));
                }
            }
            HashStyle::None => {}
        }
        let hash_size = out.len() - hash;

        pad_to(&mut out, 8);
        let dynamic = out.len();
        let relocated = |offset: usize| offset as u64 + self.dynamic_bias;
        let mut dynamic_entries = match self.hash_style {
            HashStyle::Sysv => vec![(DT_HASH, relocated(hash))],
            HashStyle::Gnu => vec![(DT_GNU_HASH, relocated(hash))],
            HashStyle::None => vec![],
        };
        dynamic_entries.extend([
            (DT_STRTAB, relocated(dynstr_offset)),
            (DT_SYMTAB, relocated(dynsym)),
            (DT_STRSZ, dynstr.len() as u64),
            (DT_NULL, 0),
        ]);
        for (tag, value) in dynamic_entries {
            push_u64(&mut out, tag);
            push_u64(&mut out, value);
        }
        let dynamic_size = out.len() - dynamic;

        let mut line_table = None;
        if self.go_line_table {
            pad_to(&mut out, 8);
            let names: Vec<String> = self
                .functions
                .iter()
                .map(|(name, _)| format!("main.{}", name))
                .collect();
            let functions: Vec<(&str, u32)> = names
                .iter()
                .zip(&entries)
                .map(|(name, entry)| (name.as_str(), (*entry as usize - text) as u32))
                .collect();
            let table = go118_line_table(text as u64, &functions, text_size as u32);
            line_table = Some((out.len(), table.len()));
            out.extend_from_slice(&table);
        }

        let mut shstrtab = vec![0u8];
        let mut section_name = |name: &str| {
            let offset = shstrtab.len() as u32;
            shstrtab.extend_from_slice(name.as_bytes());
            shstrtab.push(0);
            offset
        };
        // (name, type, flags, offset, size, link, entsize)
        let mut sections = vec![
            (0, 0, 0, 0, 0, 0, 0),
            (section_name(".text"), 1, 0x6, text, text_size, 0, 0),
            (section_name(".dynsym"), 11, 0x2, dynsym, dynsym_size, 3, SYM_SIZE),
            (section_name(".dynstr"), 3, 0x2, dynstr_offset, dynstr.len(), 0, 0),
        ];
        let hash_section = match self.hash_style {
            HashStyle::Sysv => Some((".hash", 5, 4)),
            HashStyle::Gnu => Some((".gnu.hash", 0x6fff_fff6, 0)),
            HashStyle::None => None,
        };
        if let Some((name, kind, entsize)) = hash_section {
            sections.push((section_name(name), kind, 0x2, hash, hash_size, 2, entsize));
        }
        sections.push((section_name(".dynamic"), 6, 0x3, dynamic, dynamic_size, 3, 16));
        if let Some((offset, size)) = line_table {
            sections.push((section_name(".gopclntab"), 1, 0x2, offset, size, 0, 0));
        }
        let shstrtab_name = section_name(".shstrtab");
        let shstrtab_offset = out.len();
        out.extend_from_slice(&shstrtab);
        sections.push((shstrtab_name, 3, 0, shstrtab_offset, shstrtab.len(), 0, 0));

        pad_to(&mut out, 8);
        let shoff = out.len();
        for (name, kind, flags, offset, size, link, entsize) in &sections {
            let addr = if *flags & 0x2 != 0 { *offset as u64 } else { 0 };
            push_u32(&mut out, *name);
            push_u32(&mut out, *kind);
            push_u64(&mut out, *flags);
            push_u64(&mut out, addr);
            push_u64(&mut out, *offset as u64);
            push_u64(&mut out, *size as u64);
            push_u32(&mut out, *link);
            push_u32(&mut out, 0);
            push_u64(&mut out, 8);
            push_u64(&mut out, *entsize as u64);
        }

        let mapped_len = if self.map_section_table {
            out.len()
        } else {
            shoff
        };

        out[..4].copy_from_slice(b"\x7fELF");
        out[4] = 2; // ELFCLASS64
        out[5] = 1; // ELFDATA2LSB
        out[6] = 1;
        LittleEndian::write_u16(&mut out[16..], 3); // ET_DYN
        LittleEndian::write_u16(&mut out[18..], 0x3e);
        LittleEndian::write_u32(&mut out[20..], 1);
        LittleEndian::write_u64(&mut out[24..], text as u64);
        LittleEndian::write_u64(&mut out[32..], EHDR_SIZE as u64);
        LittleEndian::write_u64(&mut out[40..], shoff as u64);
        LittleEndian::write_u16(&mut out[52..], EHDR_SIZE as u16);
        LittleEndian::write_u16(&mut out[54..], PHDR_SIZE as u16);
        LittleEndian::write_u16(&mut out[56..], 2);
        LittleEndian::write_u16(&mut out[58..], SHDR_SIZE as u16);
        LittleEndian::write_u16(&mut out[60..], sections.len() as u16);
        LittleEndian::write_u16(&mut out[62..], sections.len() as u16 - 1);

        // (type, flags, offset, size, align)
        let segments = [
            (1u32, 0x5u32, 0, mapped_len, 0x1000u64),
            (2, 0x6, dynamic, dynamic_size, 8),
        ];
        for (i, (kind, flags, offset, size, align)) in segments.iter().enumerate() {
            let at = EHDR_SIZE + i * PHDR_SIZE;
            let phdr = &mut out[at..at + PHDR_SIZE];
            LittleEndian::write_u32(&mut phdr[0..], *kind);
            LittleEndian::write_u32(&mut phdr[4..], *flags);
            LittleEndian::write_u64(&mut phdr[8..], *offset as u64);
            LittleEndian::write_u64(&mut phdr[16..], *offset as u64);
            LittleEndian::write_u64(&mut phdr[24..], *offset as u64);
            LittleEndian::write_u64(&mut phdr[32..], *size as u64);
            LittleEndian::write_u64(&mut phdr[40..], *size as u64);
            LittleEndian::write_u64(&mut phdr[48..], *align);
        }

        ElfFixture {
            bytes: out,
            mapped_len,
            entries,
            dynstr_offset,
            section_headers: shoff,
        }
    }
}

impl ElfFixture {
    /// The loadable part of the image as it would be captured from a
    /// process that loaded it at `base`.
    pub fn window(&self, base: u64) -> AddressSpaceWindow {
        self.window_of(base, self.mapped_len)
    }

    /// Like `window`, but captured only up to `len` bytes.
    pub fn window_of(&self, base: u64, len: usize) -> AddressSpaceWindow {
        AddressSpaceWindow::from_snapshot(base, self.bytes[..len.min(self.mapped_len)].to_vec())
    }
}
