//! Decoder for the function table of the Go runtime's `.gopclntab`.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::{
    symbols::FunctionSymbol,
    words::{c_str_at, Words},
    Error, Result,
};

const GO_1_2_MAGIC: u32 = 0xffff_fffb;
const GO_1_16_MAGIC: u32 = 0xffff_fffa;
const GO_1_18_MAGIC: u32 = 0xffff_fff0;
const GO_1_20_MAGIC: u32 = 0xffff_fff1;

const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Version {
    Go12,
    Go116,
    /// Go 1.18 and later, where code addresses are 32-bit offsets from the
    /// start of the text section.
    Go118,
}

fn detect(header: &[u8]) -> Result<(Version, Words)> {
    let version_of = |magic| match magic {
        GO_1_2_MAGIC => Some(Version::Go12),
        GO_1_16_MAGIC => Some(Version::Go116),
        GO_1_18_MAGIC | GO_1_20_MAGIC => Some(Version::Go118),
        _ => None,
    };
    let (version, big_endian) = match version_of(LittleEndian::read_u32(header)) {
        Some(version) => (version, false),
        None => match version_of(BigEndian::read_u32(header)) {
            Some(version) => (version, true),
            None => return Err(Error::MalformedImage("unknown line table magic".into())),
        },
    };

    let (pad, quantum, ptr_size) = (&header[4..6], header[6], header[7]);
    if pad != [0, 0] || !matches!(quantum, 1 | 2 | 4) || !matches!(ptr_size, 4 | 8) {
        return Err(Error::MalformedImage("bad line table header".into()));
    }

    Ok((
        version,
        Words {
            big_endian,
            ptr_size: ptr_size as usize,
        },
    ))
}

/// Lists every function in the table. Addresses are link-time addresses;
/// `text_start` is where the text section was linked.
///
/// A table cut short, as happens with a truncated memory capture, yields
/// the functions that were fully captured.
pub(crate) fn functions(data: &[u8], text_start: u64) -> Result<Vec<FunctionSymbol>> {
    let header = match data.get(..HEADER_LEN) {
        Some(header) => header,
        None => return Ok(vec![]),
    };
    let (version, words) = detect(header)?;
    let ptr = words.ptr_size;

    let header_word = |index: usize| words.word_at(data, HEADER_LEN + index * ptr);
    let region = |index: usize| {
        header_word(index).and_then(|offset| data.get(usize::try_from(offset).ok()?..))
    };

    let layout = match version {
        Version::Go12 => header_word(0).zip(data.get(HEADER_LEN + ptr..)).map(
            |(nfunc, functab)| (nfunc, functab, data, data),
        ),
        Version::Go116 => header_word(0)
            .zip(region(2))
            .zip(region(6))
            .map(|((nfunc, names), funcdata)| (nfunc, funcdata, funcdata, names)),
        Version::Go118 => header_word(0)
            .zip(region(3))
            .zip(region(7))
            .map(|((nfunc, names), funcdata)| (nfunc, funcdata, funcdata, names)),
    };
    let (nfunc, functab, funcdata, names) = match layout {
        Some(layout) => layout,
        None => return Ok(vec![]),
    };

    let field = if version == Version::Go118 { 4 } else { ptr };
    let read_field = |index: usize| match field {
        4 => words.u32_at(functab, index * 4).map(u64::from),
        _ => words.word_at(functab, index * ptr),
    };
    let to_pc = |raw: u64| match version {
        Version::Go118 => text_start.wrapping_add(raw),
        _ => raw,
    };
    // Offset of the name field inside a function's metadata record.
    let name_field = field;

    let mut out = vec![];
    for i in 0..nfunc as usize {
        let entry = read_field(2 * i);
        let funcoff = read_field(2 * i + 1);
        let end = read_field(2 * i + 2);
        let (entry, funcoff, end) = match (entry, funcoff, end) {
            (Some(entry), Some(funcoff), Some(end)) => (entry, funcoff, end),
            _ => break,
        };

        let name = usize::try_from(funcoff)
            .ok()
            .and_then(|funcoff| words.u32_at(funcdata, funcoff.checked_add(name_field)?))
            .and_then(|name_off| c_str_at(names, name_off as usize));
        if let Some(name) = name {
            out.push(FunctionSymbol::new(name, to_pc(entry), to_pc(end)));
        }
    }
    Ok(out)
}
