//! Function symbol tables out of ELF images, read from `.gopclntab`,
//! `.symtab` or `.dynsym`, whichever comes first. When a captured window
//! lacks the section header table, `.dynsym` is found through the dynamic
//! segment instead.

use std::ops::Range;

use goblin::{
    container::Ctx,
    elf::{
        dynamic::{DT_GNU_HASH, DT_HASH, DT_NULL, DT_STRSZ, DT_STRTAB, DT_SYMTAB},
        header::{Header, EI_CLASS, EI_DATA, ELFCLASS64, ELFDATA2MSB},
        program_header::{ProgramHeader, PT_DYNAMIC, PT_LOAD},
        section_header::SectionHeader,
        sym::Symtab,
        Elf,
    },
    strtab::Strtab,
};

use crate::{
    memory::AddressSpaceWindow,
    pclntab,
    symbols::{FunctionSymbol, SymbolTable},
    words::Words,
    Error, Result,
};

const CODE_SECTION: &str = ".text";
const LINE_TABLE_SECTION: &str = ".gopclntab";
const SYMBOL_SECTIONS: [&str; 2] = [".symtab", ".dynsym"];
const PAGE_MASK: u64 = !0xfff;

/// Builds the symbol table of an executable file.
pub fn parse_file(bytes: &[u8]) -> Result<SymbolTable> {
    Image::parse(bytes, Layout::File)?.symbols()
}

/// Builds the symbol table of the image loaded at the start of `window`.
pub fn parse_window(window: &AddressSpaceWindow) -> Result<SymbolTable> {
    let layout = Layout::Memory {
        base: window.base(),
    };
    Image::parse(window.bytes(), layout)?.symbols()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    File,
    /// Bytes as mapped in a process, starting at `base`.
    Memory { base: u64 },
}

struct Section {
    name: String,
    header: SectionHeader,
}

#[derive(Debug, Default)]
struct DynamicTables {
    symtab: Option<u64>,
    strtab: Option<u64>,
    strsz: Option<u64>,
    hash: Option<u64>,
    gnu_hash: Option<u64>,
}

struct Image<'a> {
    bytes: &'a [u8],
    layout: Layout,
    ctx: Ctx,
    words: Words,
    header: Header,
    program_headers: Vec<ProgramHeader>,
    /// Link-time address of the first loaded page.
    link_base: u64,
}

impl<'a> Image<'a> {
    fn parse(bytes: &'a [u8], layout: Layout) -> Result<Self> {
        let header = Elf::parse_header(bytes)?;
        let ctx = Ctx::new(header.container()?, header.endianness()?);
        let words = Words {
            big_endian: header.e_ident[EI_DATA] == ELFDATA2MSB,
            ptr_size: if header.e_ident[EI_CLASS] == ELFCLASS64 {
                8
            } else {
                4
            },
        };
        let program_headers = ProgramHeader::parse(
            bytes,
            header.e_phoff as usize,
            header.e_phnum as usize,
            ctx,
        )?;
        let link_base = program_headers
            .iter()
            .filter(|ph| ph.p_type == PT_LOAD)
            .map(|ph| ph.p_vaddr & PAGE_MASK)
            .min()
            .ok_or_else(|| Error::MalformedImage("no loadable segments".into()))?;

        Ok(Self {
            bytes,
            layout,
            ctx,
            words,
            header,
            program_headers,
            link_base,
        })
    }

    fn bias(&self) -> u64 {
        match self.layout {
            Layout::File => 0,
            Layout::Memory { base } => base.wrapping_sub(self.link_base),
        }
    }

    fn loads(&self) -> impl Iterator<Item = &ProgramHeader> {
        self.program_headers.iter().filter(|ph| ph.p_type == PT_LOAD)
    }

    fn sym_size(&self) -> usize {
        if self.words.ptr_size == 8 {
            24
        } else {
            16
        }
    }

    /// Bytes at a link-time address.
    ///
    /// In a memory window the result is clipped to what was captured and
    /// may be empty.
    fn at_vaddr(&self, vaddr: u64, len: u64) -> Option<&'a [u8]> {
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        match self.layout {
            Layout::File => {
                let ph = self
                    .loads()
                    .find(|ph| ph.p_vaddr <= vaddr && vaddr - ph.p_vaddr < ph.p_filesz)?;
                let offset = ph.p_offset.checked_add(vaddr - ph.p_vaddr)?;
                let start = usize::try_from(offset).ok()?;
                self.bytes.get(start..start.checked_add(len)?)
            }
            Layout::Memory { .. } => {
                let start = usize::try_from(vaddr.checked_sub(self.link_base)?).ok()?;
                let captured = self.bytes.get(start.min(self.bytes.len())..)?;
                Some(&captured[..len.min(captured.len())])
            }
        }
    }

    /// Where the bytes at a file offset start in `bytes`. In a memory window
    /// the offset has to lie in a loaded segment.
    fn position(&self, offset: u64, len: u64) -> Option<usize> {
        match self.layout {
            Layout::File => usize::try_from(offset).ok(),
            Layout::Memory { .. } => {
                let ph = self.loads().find(|ph| {
                    ph.p_offset <= offset
                        && offset.saturating_add(len) <= ph.p_offset.saturating_add(ph.p_filesz)
                })?;
                let vaddr = ph.p_vaddr.checked_add(offset - ph.p_offset)?;
                usize::try_from(vaddr.checked_sub(self.link_base)?).ok()
            }
        }
    }

    /// Bytes at a file offset, clipped like `at_vaddr` in a memory window.
    fn at_offset(&self, offset: u64, len: u64) -> Option<&'a [u8]> {
        let start = self.position(offset, len)?;
        let len = usize::try_from(len).ok()?;
        match self.layout {
            Layout::File => self.bytes.get(start..start.checked_add(len)?),
            Layout::Memory { .. } => {
                let captured = self.bytes.get(start.min(self.bytes.len())..)?;
                Some(&captured[..len.min(captured.len())])
            }
        }
    }

    /// The section header table, or `None` when it is not part of the image
    /// as captured.
    fn sections(&self) -> Result<Option<Vec<Section>>> {
        let count = self.header.e_shnum as usize;
        if count == 0 {
            return Ok(None);
        }

        let table_len = count as u64 * u64::from(self.header.e_shentsize);
        let start = match self.at_offset(self.header.e_shoff, table_len) {
            Some(table) if table.len() as u64 == table_len => {
                self.position(self.header.e_shoff, table_len)
            }
            _ => None,
        };
        // goblin takes a table at position 0 to mean there is none.
        let start = match start {
            Some(start) if start > 0 => start,
            _ => return Ok(None),
        };
        let headers = SectionHeader::parse(self.bytes, start, count, self.ctx)?;

        let names = headers
            .get(self.header.e_shstrndx as usize)
            .and_then(|sh| Some((sh, self.at_offset(sh.sh_offset, sh.sh_size)?)));
        let names = match names {
            Some((sh, names)) if names.len() as u64 == sh.sh_size => names,
            _ => return Ok(None),
        };
        let names = Strtab::parse(names, 0, names.len(), 0)?;

        headers
            .into_iter()
            .map(|header| {
                let name = names.get_at(header.sh_name).ok_or_else(|| {
                    Error::MalformedImage(format!("bad section name offset {}", header.sh_name))
                })?;
                Ok(Section {
                    name: name.to_string(),
                    header,
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    fn section_data(&self, header: &SectionHeader) -> Option<&'a [u8]> {
        self.at_offset(header.sh_offset, header.sh_size)
    }

    fn symbols(&self) -> Result<SymbolTable> {
        let functions = match (self.sections()?, self.layout) {
            (Some(sections), _) => self.section_functions(&sections)?,
            (None, Layout::Memory { .. }) => self.dynamic_functions()?,
            (None, Layout::File) => {
                return Err(Error::MalformedImage(
                    "section header table out of bounds".into(),
                ))
            }
        };

        let bias = self.bias();
        Ok(SymbolTable::new(
            functions.into_iter().map(|f| f.rebased(bias)).collect(),
        ))
    }

    fn section_functions(&self, sections: &[Section]) -> Result<Vec<FunctionSymbol>> {
        let find = |name: &str| sections.iter().find(|section| section.name == name);

        let text = find(CODE_SECTION).ok_or(Error::MissingSection(CODE_SECTION))?;
        let code = address_range(text.header.sh_addr, text.header.sh_size, CODE_SECTION)?;

        if let Some(table) = find(LINE_TABLE_SECTION).and_then(|s| self.section_data(&s.header)) {
            return pclntab::functions(table, code.start);
        }

        for name in SYMBOL_SECTIONS {
            let symtab = match find(name) {
                Some(symtab) => symtab,
                None => continue,
            };
            let strtab = sections
                .get(symtab.header.sh_link as usize)
                .and_then(|strtab| self.section_data(&strtab.header));
            if let (Some(syms), Some(strs)) = (self.section_data(&symtab.header), strtab) {
                return self.symbol_functions(syms, strs, &code);
            }
        }

        Err(Error::MissingSection("symbol metadata"))
    }

    fn symbol_functions(
        &self,
        syms: &[u8],
        strs: &[u8],
        code: &Range<u64>,
    ) -> Result<Vec<FunctionSymbol>> {
        let symtab = Symtab::parse(syms, 0, syms.len() / self.sym_size(), self.ctx)?;
        // A name cut off by the end of a capture is dropped whole.
        let strs = &strs[..strs.iter().rposition(|&b| b == 0).map_or(0, |i| i + 1)];
        let strtab = Strtab::parse(strs, 0, strs.len(), 0)?;

        Ok(symtab
            .iter()
            .filter(|sym| sym.is_function() && code.contains(&sym.st_value))
            .filter_map(|sym| {
                let name = strtab.get_at(sym.st_name)?;
                let end = sym.st_value.checked_add(sym.st_size)?;
                Some(FunctionSymbol::new(demangle(name), sym.st_value, end))
            })
            .collect())
    }

    /// Reads `.dynsym` through the dynamic segment. Only used on memory
    /// windows, where the dynamic segment is always mapped.
    fn dynamic_functions(&self) -> Result<Vec<FunctionSymbol>> {
        let dynamic = self
            .program_headers
            .iter()
            .find(|ph| ph.p_type == PT_DYNAMIC)
            .ok_or_else(|| {
                Error::MalformedImage("no section header table or dynamic segment".into())
            })?;
        let code = self
            .loads()
            .find(|ph| ph.is_executable())
            .ok_or(Error::MissingSection(CODE_SECTION))?;
        let code = address_range(code.p_vaddr, code.p_memsz, "executable segment")?;

        let entries = self
            .at_vaddr(dynamic.p_vaddr, dynamic.p_filesz)
            .unwrap_or_default();
        let tables = self.dynamic_tables(entries);
        let (symtab, strtab) = match (tables.symtab, tables.strtab) {
            (Some(symtab), Some(strtab)) => (symtab, strtab),
            // The window ends before the dynamic segment does.
            _ if (entries.len() as u64) < dynamic.p_filesz => return Ok(vec![]),
            (None, _) => return Err(Error::MissingSection(".dynsym")),
            (_, None) => return Err(Error::MissingSection(".dynstr")),
        };

        let sym_size = self.sym_size() as u64;
        let count = self.symbol_count(&tables, sym_size).unwrap_or(0);
        let syms = self
            .at_vaddr(symtab, count.saturating_mul(sym_size))
            .unwrap_or_default();
        let strs = self
            .at_vaddr(strtab, tables.strsz.unwrap_or(0))
            .unwrap_or_default();
        self.symbol_functions(syms, strs, &code)
    }

    fn dynamic_tables(&self, entries: &[u8]) -> DynamicTables {
        let mut tables = DynamicTables::default();
        for entry in entries.chunks_exact(2 * self.words.ptr_size) {
            let (tag, value) = match (
                self.words.word_at(entry, 0),
                self.words.word_at(entry, self.words.ptr_size),
            ) {
                (Some(tag), Some(value)) => (tag, value),
                _ => break,
            };
            match tag {
                DT_NULL => break,
                DT_SYMTAB => tables.symtab = Some(self.unrelocated(value)),
                DT_STRTAB => tables.strtab = Some(self.unrelocated(value)),
                DT_STRSZ => tables.strsz = Some(value),
                DT_HASH => tables.hash = Some(self.unrelocated(value)),
                DT_GNU_HASH => tables.gnu_hash = Some(self.unrelocated(value)),
                _ => {}
            }
        }
        tables
    }

    /// The dynamic loader may already have moved the address entries of the
    /// dynamic segment to where the image was loaded.
    fn unrelocated(&self, ptr: u64) -> u64 {
        match self.layout {
            Layout::Memory { base } if self.bias() != 0 && ptr >= base => ptr - self.bias(),
            _ => ptr,
        }
    }

    fn symbol_count(&self, tables: &DynamicTables, sym_size: u64) -> Option<u64> {
        if let Some(hash) = tables.hash {
            // nbucket, then nchain, which is the number of symbols.
            let header = self.at_vaddr(hash, 8)?;
            return self.words.u32_at(header, 4).map(u64::from);
        }
        if let Some(gnu_hash) = tables.gnu_hash {
            return self.gnu_hash_count(gnu_hash);
        }
        // The linker puts .dynstr right after .dynsym.
        tables
            .strtab?
            .checked_sub(tables.symtab?)
            .map(|span| span / sym_size)
    }

    /// Walks the chain of the highest-numbered bucket of a GNU hash table
    /// to its end, which is the last symbol.
    fn gnu_hash_count(&self, addr: u64) -> Option<u64> {
        let words = self.words;
        let header = self.at_vaddr(addr, 16)?;
        let nbuckets = u64::from(words.u32_at(header, 0)?);
        let symoffset = words.u32_at(header, 4)?;
        let bloom_size = u64::from(words.u32_at(header, 8)?);

        let buckets_at = bloom_size
            .checked_mul(words.ptr_size as u64)?
            .checked_add(addr.checked_add(16)?)?;
        let buckets = self.at_vaddr(buckets_at, nbuckets * 4)?;
        let last = (0..nbuckets as usize)
            .filter_map(|i| words.u32_at(buckets, i * 4))
            .max()?;
        if last < symoffset {
            return Some(u64::from(symoffset));
        }

        let chains_at = buckets_at.checked_add(nbuckets * 4)?;
        let mut index = last;
        loop {
            let chain_at = chains_at.checked_add(u64::from(index - symoffset) * 4)?;
            let chain = self.at_vaddr(chain_at, 4)?;
            if words.u32_at(chain, 0)? & 1 == 1 {
                return Some(u64::from(index) + 1);
            }
            index = index.checked_add(1)?;
        }
    }
}

fn address_range(start: u64, len: u64, what: &str) -> Result<Range<u64>> {
    let end = start
        .checked_add(len)
        .ok_or_else(|| Error::MalformedImage(format!("{} wraps the address space", what)))?;
    Ok(start..end)
}

fn demangle(name: &str) -> String {
    format!("{:#}", rustc_demangle::demangle(name))
}
